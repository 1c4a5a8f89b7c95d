use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::core::crm::{CrmChannel, SenderProfile};
use crate::core::handoff::{IdentityPrefixes, KeywordMatcher};

/// Per-call behaviour, shared by every call the server runs.
#[derive(Debug, Clone)]
pub struct CallSettings {
    /// Spoken and relayed when the call starts. Empty disables it.
    pub greeting: String,
    pub transfer_announcement: String,
    pub transfer_initiated_message: String,
    pub transfer_failed_message: String,
    pub keywords: KeywordMatcher,
    pub prefixes: IdentityPrefixes,
    /// 0 means unlimited
    pub max_transfer_attempts: u32,
    /// Wait between a human agent joining and the voice agent going silent
    pub handoff_delay: Duration,
    pub sip_trunk_id: Option<String>,
    pub transfer_extension: String,
    pub human_agent_name: String,
    pub participant_metadata: String,
    pub play_dialtone: bool,
    pub customer_id_override: Option<String>,
    pub crm_channel: CrmChannel,
    pub relay_capacity: usize,
    pub inbox_capacity: usize,
}

impl CallSettings {
    pub fn from_config(config: &ServerConfig) -> Result<Self, regex::Error> {
        let crm = &config.crm;
        let handoff = &config.handoff;

        Ok(Self {
            greeting: config.realtime.greeting.clone(),
            transfer_announcement: handoff.transfer_announcement.clone(),
            transfer_initiated_message: handoff.transfer_initiated_message.clone(),
            transfer_failed_message: handoff.transfer_failed_message.clone(),
            keywords: KeywordMatcher::new(&handoff.transfer_keywords)?,
            prefixes: handoff.identity_prefixes(),
            max_transfer_attempts: handoff.max_transfer_attempts,
            handoff_delay: Duration::from_millis(handoff.handoff_delay_ms),
            sip_trunk_id: handoff.sip_trunk_id.clone(),
            transfer_extension: handoff.transfer_extension.clone(),
            human_agent_name: handoff.human_agent_name.clone(),
            participant_metadata: handoff.participant_metadata.clone(),
            play_dialtone: handoff.play_dialtone,
            customer_id_override: handoff.customer_id_override.clone(),
            crm_channel: CrmChannel {
                service_identifier: crm.service_identifier.clone(),
                channel_type_code: crm.channel_type_code.clone(),
                bot: SenderProfile::new(&crm.bot_id, &crm.bot_name),
                connector: SenderProfile::new(&crm.connector_id, &crm.connector_name),
                agent: SenderProfile::new(&crm.agent_id, &crm.agent_name),
            },
            relay_capacity: crm.queue_capacity,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        })
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

pub const DEFAULT_INBOX_CAPACITY: usize = 256;

impl Default for CallSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default()).expect("default call settings are valid")
    }
}

use super::env::apply_env;
use super::yaml::YamlConfig;
use super::{AuthApiSecret, ServerConfig};

macro_rules! take {
    ($target:expr, $value:expr) => {
        if let Some(value) = $value {
            $target = value;
        }
    };
}

macro_rules! take_option {
    ($target:expr, $value:expr) => {
        if let Some(value) = $value {
            $target = Some(value);
        }
    };
}

/// Build the final configuration: defaults, then environment, then YAML.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();
    apply_env(&mut config)?;

    if let Some(yaml) = yaml {
        apply_yaml(&mut config, yaml);
    }

    Ok(config)
}

fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) {
    if let Some(server) = yaml.server {
        take!(config.host, server.host);
        take!(config.port, server.port);
    }

    if let Some(livekit) = yaml.livekit {
        take!(config.livekit.url, livekit.url);
        take_option!(config.livekit.api_url, livekit.api_url);
        take_option!(config.livekit.api_key, livekit.api_key);
        take_option!(config.livekit.api_secret, livekit.api_secret);
        take!(config.livekit.agent_identity, livekit.agent_identity);
        take!(config.livekit.agent_name, livekit.agent_name);
    }

    if let Some(providers) = yaml.providers {
        take_option!(config.realtime.openai_api_key, providers.openai_api_key);
        take_option!(config.realtime.elevenlabs_api_key, providers.elevenlabs_api_key);
        take_option!(config.realtime.elevenlabs_agent_id, providers.elevenlabs_agent_id);
    }

    if let Some(realtime) = yaml.realtime {
        take!(config.realtime.provider, realtime.provider);
        take_option!(config.realtime.model, realtime.model);
        take_option!(config.realtime.voice, realtime.voice);
        take!(config.realtime.temperature, realtime.temperature);
        take!(config.realtime.instructions, realtime.instructions);
        take!(config.realtime.greeting, realtime.greeting);
        take_option!(config.realtime.endpoint, realtime.endpoint);
    }

    if let Some(crm) = yaml.crm {
        let target = &mut config.crm;
        take_option!(target.endpoint, crm.endpoint);
        take!(target.service_identifier, crm.service_identifier);
        take!(target.channel_type_code, crm.channel_type_code);
        take!(target.bot_id, crm.bot_id);
        take!(target.bot_name, crm.bot_name);
        take!(target.connector_id, crm.connector_id);
        take!(target.connector_name, crm.connector_name);
        take!(target.agent_id, crm.agent_id);
        take!(target.agent_name, crm.agent_name);
        take!(target.max_attempts, crm.max_attempts);
        take!(target.retry_delay_ms, crm.retry_delay_ms);
        take!(target.timeout_seconds, crm.timeout_seconds);
        take!(target.queue_capacity, crm.queue_capacity);
    }

    if let Some(handoff) = yaml.handoff {
        let target = &mut config.handoff;
        take_option!(target.sip_trunk_id, handoff.sip_trunk_id);
        take!(target.transfer_extension, handoff.transfer_extension);
        take!(target.human_agent_name, handoff.human_agent_name);
        take!(target.human_agent_identity_prefix, handoff.human_agent_identity_prefix);
        take!(target.customer_identity_prefix, handoff.customer_identity_prefix);
        take!(target.transfer_keywords, handoff.transfer_keywords);
        take!(target.max_transfer_attempts, handoff.max_transfer_attempts);
        take!(target.handoff_delay_ms, handoff.handoff_delay_ms);
        take!(target.play_dialtone, handoff.play_dialtone);
        take!(target.participant_metadata, handoff.participant_metadata);
        take!(target.transfer_announcement, handoff.transfer_announcement);
        take!(target.transfer_initiated_message, handoff.transfer_initiated_message);
        take!(target.transfer_failed_message, handoff.transfer_failed_message);
        take_option!(target.customer_id_override, handoff.customer_id_override);
        take!(target.auto_dispatch, handoff.auto_dispatch);
    }

    if let Some(auth) = yaml.auth {
        take!(config.auth_required, auth.required);
        if !auth.api_secrets.is_empty() {
            config.auth_api_secrets = auth
                .api_secrets
                .into_iter()
                .map(|entry| AuthApiSecret {
                    id: entry.id,
                    secret: entry.secret,
                })
                .collect();
        } else if let Some(secret) = auth.api_secret {
            config.auth_api_secrets = vec![AuthApiSecret {
                id: "default".to_string(),
                secret,
            }];
        }
    }

    if let Some(security) = yaml.security {
        take_option!(config.cors_allowed_origins, security.cors_allowed_origins);
        take!(
            config.rate_limit_requests_per_second,
            security.rate_limit_requests_per_second
        );
        take!(config.rate_limit_burst_size, security.rate_limit_burst_size);
    }
}

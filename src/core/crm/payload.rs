//! CRM message envelope.
//!
//! ```json
//! {
//!   "id": "<call id>",
//!   "header": {
//!     "channelData": {
//!       "channelCustomerIdentifier": "<customer id>",
//!       "serviceIdentifier": "682200",
//!       "channelTypeCode": "CX_VOICE"
//!     },
//!     "sender": {"id": "...", "type": "BOT", "senderName": "Voice Bot", "additionalDetail": null},
//!     "language": {},
//!     "timestamp": "1718000000000"
//!   },
//!   "body": {"type": "PLAIN", "markdownText": "..."}
//! }
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Who said the relayed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SenderKind {
    /// The voice agent
    Bot,
    /// The caller, as seen through the voice channel connector
    Connector,
    /// A human agent after handoff
    Agent,
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderKind::Bot => write!(f, "BOT"),
            SenderKind::Connector => write!(f, "CONNECTOR"),
            SenderKind::Agent => write!(f, "AGENT"),
        }
    }
}

/// Sender identity registered on the CRM side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub id: String,
    pub name: String,
}

impl SenderProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Channel identity and sender profiles used to stamp every message of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmChannel {
    pub service_identifier: String,
    pub channel_type_code: String,
    pub bot: SenderProfile,
    pub connector: SenderProfile,
    pub agent: SenderProfile,
}

impl CrmChannel {
    pub fn profile(&self, kind: SenderKind) -> &SenderProfile {
        match kind {
            SenderKind::Bot => &self.bot,
            SenderKind::Connector => &self.connector,
            SenderKind::Agent => &self.agent,
        }
    }

    /// Build a message stamped with the current time.
    pub fn message(
        &self,
        call_id: &str,
        customer_id: &str,
        kind: SenderKind,
        text: &str,
    ) -> CrmMessage {
        CrmMessage::new(self, call_id, customer_id, kind, text, now_millis())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmMessage {
    pub id: String,
    pub header: MessageHeader,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    pub channel_data: ChannelData,
    pub sender: Sender,
    #[serde(default)]
    pub language: serde_json::Map<String, serde_json::Value>,
    /// Unix milliseconds as a decimal string
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelData {
    pub channel_customer_identifier: String,
    pub service_identifier: String,
    pub channel_type_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SenderKind,
    pub sender_name: String,
    pub additional_detail: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    #[serde(rename = "type")]
    pub body_type: String,
    pub markdown_text: String,
}

impl CrmMessage {
    pub fn new(
        channel: &CrmChannel,
        call_id: &str,
        customer_id: &str,
        kind: SenderKind,
        text: &str,
        timestamp_ms: u128,
    ) -> Self {
        let profile = channel.profile(kind);
        Self {
            id: call_id.to_string(),
            header: MessageHeader {
                channel_data: ChannelData {
                    channel_customer_identifier: customer_id.to_string(),
                    service_identifier: channel.service_identifier.clone(),
                    channel_type_code: channel.channel_type_code.clone(),
                },
                sender: Sender {
                    id: profile.id.clone(),
                    kind,
                    sender_name: profile.name.clone(),
                    additional_detail: None,
                },
                language: serde_json::Map::new(),
                timestamp: timestamp_ms.to_string(),
            },
            body: MessageBody {
                body_type: "PLAIN".to_string(),
                markdown_text: text.to_string(),
            },
        }
    }

    pub fn sender_kind(&self) -> SenderKind {
        self.header.sender.kind
    }

    pub fn text(&self) -> &str {
        &self.body.markdown_text
    }
}

pub fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> CrmChannel {
        CrmChannel {
            service_identifier: "682200".into(),
            channel_type_code: "CX_VOICE".into(),
            bot: SenderProfile::new("6540b0fc90b3913194d45525", "Voice Bot"),
            connector: SenderProfile::new("460df46c-adf9-11ed-afa1-0242ac120002", "WEB_CONNECTOR"),
            agent: SenderProfile::new("agent_live_transfer", "Live Agent"),
        }
    }

    #[test]
    fn test_message_wire_shape() {
        let msg = CrmMessage::new(
            &channel(),
            "room-42",
            "923001234567",
            SenderKind::Bot,
            "Hello",
            1_718_000_000_000,
        );
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "id": "room-42",
                "header": {
                    "channelData": {
                        "channelCustomerIdentifier": "923001234567",
                        "serviceIdentifier": "682200",
                        "channelTypeCode": "CX_VOICE"
                    },
                    "sender": {
                        "id": "6540b0fc90b3913194d45525",
                        "type": "BOT",
                        "senderName": "Voice Bot",
                        "additionalDetail": null
                    },
                    "language": {},
                    "timestamp": "1718000000000"
                },
                "body": {"type": "PLAIN", "markdownText": "Hello"}
            })
        );
    }

    #[test]
    fn test_sender_profiles_by_kind() {
        let channel = channel();
        let connector = CrmMessage::new(&channel, "c", "u", SenderKind::Connector, "hi", 1);
        assert_eq!(connector.header.sender.sender_name, "WEB_CONNECTOR");
        assert_eq!(connector.sender_kind(), SenderKind::Connector);

        let agent = CrmMessage::new(&channel, "c", "u", SenderKind::Agent, "hi", 1);
        assert_eq!(agent.header.sender.id, "agent_live_transfer");
    }

    #[test]
    fn test_message_uses_current_time() {
        let before = now_millis();
        let msg = channel().message("c", "u", SenderKind::Bot, "x");
        let stamped: u128 = msg.header.timestamp.parse().unwrap();
        assert!(stamped >= before);
    }
}

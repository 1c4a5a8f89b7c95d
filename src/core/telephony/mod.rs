//! Telephony control for a call room: dialing a human agent in over SIP and
//! removing participants when the call ends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("telephony request failed: {0}")]
    Request(String),

    #[error("telephony service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("participant {identity} not found in room {room}")]
    ParticipantNotFound { room: String, identity: String },

    #[error("telephony not configured: {0}")]
    NotConfigured(String),
}

pub type TelephonyResult<T> = Result<T, TelephonyError>;

/// Request to bring a SIP extension into an existing room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipDialRequest {
    pub room_name: String,
    pub sip_trunk_id: String,
    /// Extension or number to call
    pub sip_call_to: String,
    pub participant_identity: String,
    pub participant_name: String,
    /// JSON string attached to the new participant
    pub participant_metadata: String,
    pub play_dialtone: bool,
}

/// The SIP participant created by a dial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipDialResult {
    pub participant_id: String,
    pub participant_identity: String,
    pub sip_call_id: String,
}

/// Room-side operations the call actor needs.
#[async_trait]
pub trait CallControl: Send + Sync {
    async fn dial_human_agent(&self, request: &SipDialRequest) -> TelephonyResult<SipDialResult>;

    async fn remove_participant(&self, room: &str, identity: &str) -> TelephonyResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelephonyError::Service {
            code: "not_found".into(),
            message: "trunk not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "telephony service error not_found: trunk not found"
        );
    }
}

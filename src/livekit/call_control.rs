//! [`CallControl`] over the LiveKit server APIs.

use async_trait::async_trait;
use livekit_api::services::room::RoomClient;
use livekit_api::services::sip::{CreateSIPParticipantOptions, SIPClient};
use livekit_api::services::{ServiceError, TwirpError, TwirpErrorCode};
use livekit_protocol::SipParticipantInfo;
use tracing::debug;

use super::token::TokenFactory;
use crate::core::telephony::{
    CallControl, SipDialRequest, SipDialResult, TelephonyError, TelephonyResult,
};

impl From<SipParticipantInfo> for SipDialResult {
    fn from(info: SipParticipantInfo) -> Self {
        Self {
            participant_id: info.participant_id,
            participant_identity: info.participant_identity,
            sip_call_id: info.sip_call_id,
        }
    }
}

fn dial_options(request: &SipDialRequest) -> CreateSIPParticipantOptions {
    CreateSIPParticipantOptions {
        participant_identity: request.participant_identity.clone(),
        participant_name: Some(request.participant_name.clone()),
        participant_metadata: Some(request.participant_metadata.clone()),
        play_dialtone: Some(request.play_dialtone),
        ..Default::default()
    }
}

fn service_error(err: ServiceError) -> TelephonyError {
    match err {
        ServiceError::Twirp(TwirpError::Twirp(TwirpErrorCode { code, msg })) => {
            TelephonyError::Service { code, message: msg }
        }
        ServiceError::AccessToken(e) => TelephonyError::NotConfigured(e.to_string()),
        other => TelephonyError::Request(other.to_string()),
    }
}

pub struct LiveKitCallControl {
    tokens: TokenFactory,
    rooms: RoomClient,
    sip: SIPClient,
}

impl LiveKitCallControl {
    pub fn new(http_url: impl Into<String>, tokens: TokenFactory) -> Self {
        let http_url = http_url.into().trim_end_matches('/').to_string();
        let rooms = RoomClient::with_api_key(&http_url, tokens.api_key(), tokens.api_secret());
        let sip = SIPClient::with_api_key(&http_url, tokens.api_key(), tokens.api_secret());
        Self { tokens, rooms, sip }
    }

    pub fn tokens(&self) -> &TokenFactory {
        &self.tokens
    }
}

#[async_trait]
impl CallControl for LiveKitCallControl {
    async fn dial_human_agent(&self, request: &SipDialRequest) -> TelephonyResult<SipDialResult> {
        if request.sip_trunk_id.is_empty() {
            return Err(TelephonyError::NotConfigured(
                "SIP trunk id is empty".to_string(),
            ));
        }

        debug!(
            room = %request.room_name,
            trunk = %request.sip_trunk_id,
            call_to = %request.sip_call_to,
            "Creating SIP participant"
        );

        self.sip
            .create_sip_participant(
                request.sip_trunk_id.clone(),
                request.sip_call_to.clone(),
                request.room_name.clone(),
                dial_options(request),
            )
            .await
            .map(SipDialResult::from)
            .map_err(service_error)
    }

    async fn remove_participant(&self, room: &str, identity: &str) -> TelephonyResult<()> {
        self.rooms
            .remove_participant(room, identity)
            .await
            .map_err(|e| match service_error(e) {
                TelephonyError::Service { code, .. } if code == TwirpErrorCode::NOT_FOUND => {
                    TelephonyError::ParticipantNotFound {
                        room: room.to_string(),
                        identity: identity.to_string(),
                    }
                }
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use wiremock::matchers::{header, header_exists, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> SipDialRequest {
        SipDialRequest {
            room_name: "call-1".to_string(),
            sip_trunk_id: "ST_W7jqvDFA2VgG".to_string(),
            sip_call_to: "99900".to_string(),
            participant_identity: "human-agent-1234".to_string(),
            participant_name: "Human Agent".to_string(),
            participant_metadata: r#"{"reason": "customer_request"}"#.to_string(),
            play_dialtone: false,
        }
    }

    fn control(server: &MockServer) -> LiveKitCallControl {
        LiveKitCallControl::new(
            server.uri(),
            TokenFactory::new("key", "a-long-enough-secret-for-signing"),
        )
    }

    fn twirp_error(status: u16, code: &str, msg: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(serde_json::json!({
            "code": code,
            "msg": msg
        }))
    }

    #[test]
    fn test_dial_options_carry_participant_fields() {
        let options = dial_options(&request());
        assert_eq!(options.participant_identity, "human-agent-1234");
        assert_eq!(options.participant_name.as_deref(), Some("Human Agent"));
        assert_eq!(
            options.participant_metadata.as_deref(),
            Some(r#"{"reason": "customer_request"}"#)
        );
        assert_eq!(options.play_dialtone, Some(false));
    }

    #[tokio::test]
    async fn test_dial_success() {
        let server = MockServer::start().await;
        let info = SipParticipantInfo {
            participant_id: "PA_1".to_string(),
            participant_identity: "human-agent-1234".to_string(),
            room_name: "call-1".to_string(),
            sip_call_id: "SCL_1".to_string(),
        };
        Mock::given(method("POST"))
            .and(header("content-type", "application/protobuf"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(info.encode_to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let result = control(&server).dial_human_agent(&request()).await.unwrap();
        assert_eq!(result.participant_id, "PA_1");
        assert_eq!(result.participant_identity, "human-agent-1234");
        assert_eq!(result.sip_call_id, "SCL_1");
    }

    #[tokio::test]
    async fn test_dial_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(twirp_error(404, "not_found", "trunk not found"))
            .mount(&server)
            .await;

        let err = control(&server)
            .dial_human_agent(&request())
            .await
            .unwrap_err();
        match err {
            TelephonyError::Service { code, message } => {
                assert_eq!(code, "not_found");
                assert_eq!(message, "trunk not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dial_without_trunk_is_rejected_locally() {
        let server = MockServer::start().await;
        let mut request = request();
        request.sip_trunk_id.clear();

        let err = control(&server).dial_human_agent(&request).await.unwrap_err();
        assert!(matches!(err, TelephonyError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_remove_missing_participant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(twirp_error(404, "not_found", "participant not found"))
            .mount(&server)
            .await;

        let err = control(&server)
            .remove_participant("call-1", "sip_12345")
            .await
            .unwrap_err();
        match err {
            TelephonyError::ParticipantNotFound { room, identity } => {
                assert_eq!(room, "call-1");
                assert_eq!(identity, "sip_12345");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remove_other_failures_keep_their_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(twirp_error(403, "permission_denied", "no room admin grant"))
            .mount(&server)
            .await;

        let err = control(&server)
            .remove_participant("call-1", "sip_12345")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TelephonyError::Service { ref code, .. } if code == "permission_denied"
        ));
    }
}

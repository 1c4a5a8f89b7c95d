//! ElevenLabs Conversational AI WebSocket messages.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

/// Messages sent to the ConvAI socket.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Base64 PCM16 16kHz caller audio. This message carries no `type` field.
    UserAudioChunk { user_audio_chunk: String },
    Typed(TypedClientMessage),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedClientMessage {
    /// Per-conversation overrides sent right after connecting
    ConversationInitiationClientData {
        conversation_config_override: ConversationConfigOverride,
    },
    Pong {
        event_id: u64,
    },
    /// Background context the agent should take into account
    ContextualUpdate {
        text: String,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationConfigOverride {
    pub agent: AgentOverride,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptOverride>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptOverride {
    pub prompt: String,
}

impl ClientMessage {
    pub fn audio(data: &[u8]) -> Self {
        ClientMessage::UserAudioChunk {
            user_audio_chunk: BASE64_STANDARD.encode(data),
        }
    }

    pub fn pong(event_id: u64) -> Self {
        ClientMessage::Typed(TypedClientMessage::Pong { event_id })
    }

    pub fn contextual_update(text: impl Into<String>) -> Self {
        ClientMessage::Typed(TypedClientMessage::ContextualUpdate { text: text.into() })
    }

    pub fn initiation(first_message: Option<String>, prompt: Option<String>) -> Self {
        ClientMessage::Typed(TypedClientMessage::ConversationInitiationClientData {
            conversation_config_override: ConversationConfigOverride {
                agent: AgentOverride {
                    first_message,
                    prompt: prompt.map(|prompt| PromptOverride { prompt }),
                },
            },
        })
    }
}

/// Events received from the ConvAI socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadata,
    },
    UserTranscript {
        user_transcription_event: UserTranscription,
    },
    AgentResponse {
        agent_response_event: AgentResponse,
    },
    Audio {
        audio_event: AudioEvent,
    },
    Interruption {
        #[serde(default)]
        interruption_event: Option<serde_json::Value>,
    },
    Ping {
        ping_event: PingEvent,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitiationMetadata {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserTranscription {
    pub user_transcript: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentResponse {
    pub agent_response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioEvent {
    pub audio_base_64: String,
    #[serde(default)]
    pub event_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingEvent {
    pub event_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_chunk_has_no_type_field() {
        let json = serde_json::to_value(ClientMessage::audio(&[1, 2, 3])).unwrap();
        assert_eq!(json, serde_json::json!({"user_audio_chunk": "AQID"}));
    }

    #[test]
    fn test_pong_shape() {
        let json = serde_json::to_value(ClientMessage::pong(7)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "pong", "event_id": 7}));
    }

    #[test]
    fn test_initiation_override_shape() {
        let msg = ClientMessage::initiation(Some("Hello".into()), None);
        let json = serde_json::to_value(msg).unwrap();
        assert_eq!(json["type"], "conversation_initiation_client_data");
        assert_eq!(
            json["conversation_config_override"]["agent"]["first_message"],
            "Hello"
        );
        assert!(json["conversation_config_override"]["agent"].get("prompt").is_none());
    }

    #[test]
    fn test_parse_user_transcript() {
        let raw = r#"{"type":"user_transcript","user_transcription_event":{"user_transcript":"get me a person"}}"#;
        match serde_json::from_str::<ServerMessage>(raw).unwrap() {
            ServerMessage::UserTranscript {
                user_transcription_event,
            } => assert_eq!(user_transcription_event.user_transcript, "get me a person"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_ping_and_unknown() {
        let ping = r#"{"type":"ping","ping_event":{"event_id":42,"ping_ms":null}}"#;
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(ping).unwrap(),
            ServerMessage::Ping { ping_event } if ping_event.event_id == 42
        ));

        let other = r#"{"type":"vad_score","vad_score_event":{"vad_score":0.9}}"#;
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(other).unwrap(),
            ServerMessage::Unknown
        ));
    }
}

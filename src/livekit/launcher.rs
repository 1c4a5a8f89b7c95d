//! Dispatching the voice agent into a room.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use super::agent::RoomAgent;
use super::call_control::LiveKitCallControl;
use super::token::TokenFactory;
use crate::config::{RealtimeSettings, ServerConfig};
use crate::core::call::{CallHandle, CallRegistry, CallSettings, ReserveError};
use crate::core::crm::{CrmClient, NoopSink, RetryPolicy, TranscriptSink};
use crate::core::realtime::{RealtimeConfig, RealtimeError, RealtimeProvider};

/// Caller-side transcription model for OpenAI sessions.
const INPUT_TRANSCRIPTION_MODEL: &str = "whisper-1";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("agent is already joining room {0}")]
    Pending(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("room error: {0}")]
    Room(String),

    #[error("speech model error: {0}")]
    Realtime(#[from] RealtimeError),
}

/// Result of a dispatch request.
#[derive(Debug, Clone)]
pub enum Launch {
    /// The agent joined and a new call started
    Started(CallHandle),
    /// A call already runs in the room
    Existing(CallHandle),
}

impl Launch {
    pub fn handle(&self) -> &CallHandle {
        match self {
            Launch::Started(handle) | Launch::Existing(handle) => handle,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Launch::Started(_))
    }
}

/// Starts calls. The HTTP layer only sees this trait.
#[async_trait]
pub trait CallLauncher: Send + Sync {
    async fn launch(&self, room_name: &str) -> Result<Launch, LaunchError>;
}

/// Build the speech model configuration from server settings.
pub fn realtime_config(settings: &RealtimeSettings) -> Result<RealtimeConfig, RealtimeError> {
    let api_key = settings
        .api_key()
        .map_err(RealtimeError::InvalidConfiguration)?;
    let provider = RealtimeProvider::parse(&settings.provider).ok_or_else(|| {
        RealtimeError::InvalidConfiguration(format!(
            "Unsupported realtime provider: {}",
            settings.provider
        ))
    })?;

    let model = match provider {
        RealtimeProvider::ElevenLabs => settings.elevenlabs_agent_id.clone().ok_or_else(|| {
            RealtimeError::InvalidConfiguration("ElevenLabs agent id not configured".to_string())
        })?,
        RealtimeProvider::OpenAI => settings.model.clone().unwrap_or_default(),
    };

    Ok(RealtimeConfig {
        api_key,
        provider: settings.provider.clone(),
        model,
        voice: settings.voice.clone(),
        instructions: Some(settings.instructions.clone()),
        greeting: Some(settings.greeting.clone()),
        temperature: Some(settings.temperature),
        input_transcription_model: Some(INPUT_TRANSCRIPTION_MODEL.to_string()),
        endpoint: settings.endpoint.clone(),
        ..Default::default()
    })
}

/// Joins LiveKit rooms as the voice agent.
pub struct LiveKitLauncher {
    agent: RoomAgent,
    registry: CallRegistry,
}

impl LiveKitLauncher {
    /// Returns `None` when the server has no LiveKit credentials.
    pub fn new(
        config: &ServerConfig,
        registry: CallRegistry,
    ) -> Result<Option<Self>, Box<dyn std::error::Error>> {
        let Some(tokens) = TokenFactory::from_config(&config.livekit) else {
            return Ok(None);
        };
        let control = Arc::new(LiveKitCallControl::new(config.livekit.http_url(), tokens));

        let sink: Arc<dyn TranscriptSink> = match &config.crm.endpoint {
            Some(endpoint) => Arc::new(
                CrmClient::new(endpoint.clone())
                    .with_timeout(Duration::from_secs(config.crm.timeout_seconds))
                    .with_retry(RetryPolicy {
                        max_attempts: config.crm.max_attempts,
                        delay: Duration::from_millis(config.crm.retry_delay_ms),
                    }),
            ),
            None => {
                warn!("CRM endpoint not configured, transcripts will not be relayed");
                Arc::new(NoopSink)
            }
        };

        let agent = RoomAgent {
            url: config.livekit.url.clone(),
            identity: config.livekit.agent_identity.clone(),
            name: config.livekit.agent_name.clone(),
            realtime: config.realtime.clone(),
            settings: CallSettings::from_config(config)?.shared(),
            control,
            sink,
        };

        Ok(Some(Self { agent, registry }))
    }
}

#[async_trait]
impl CallLauncher for LiveKitLauncher {
    async fn launch(&self, room_name: &str) -> Result<Launch, LaunchError> {
        let reservation = match self.registry.reserve(room_name) {
            Ok(reservation) => reservation,
            Err(ReserveError::Active(handle)) => return Ok(Launch::Existing(handle)),
            Err(ReserveError::Pending) => {
                return Err(LaunchError::Pending(room_name.to_string()));
            }
        };

        let handle = self.agent.join(reservation.call_id()).await?;
        reservation.activate(handle.clone());
        Ok(Launch::Started(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai_settings() -> RealtimeSettings {
        RealtimeSettings {
            openai_api_key: Some("sk-test".to_string()),
            voice: Some("alloy".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_realtime_config_openai() {
        let config = realtime_config(&openai_settings()).unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.voice.as_deref(), Some("alloy"));
        assert_eq!(
            config.input_transcription_model.as_deref(),
            Some(INPUT_TRANSCRIPTION_MODEL)
        );
        assert_eq!(
            config.greeting.as_deref(),
            Some(crate::config::DEFAULT_GREETING)
        );
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_realtime_config_carries_endpoint_override() {
        let settings = RealtimeSettings {
            endpoint: Some("ws://127.0.0.1:9000/v1/realtime".to_string()),
            ..openai_settings()
        };
        let config = realtime_config(&settings).unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("ws://127.0.0.1:9000/v1/realtime"));
    }

    #[test]
    fn test_realtime_config_elevenlabs_uses_agent_id() {
        let settings = RealtimeSettings {
            provider: "elevenlabs".to_string(),
            elevenlabs_api_key: Some("xi-test".to_string()),
            elevenlabs_agent_id: Some("agent_42".to_string()),
            ..Default::default()
        };
        let config = realtime_config(&settings).unwrap();
        assert_eq!(config.model, "agent_42");
        assert_eq!(config.api_key, "xi-test");
    }

    #[test]
    fn test_realtime_config_missing_agent_id() {
        let settings = RealtimeSettings {
            provider: "elevenlabs".to_string(),
            elevenlabs_api_key: Some("xi-test".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            realtime_config(&settings),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_realtime_config_missing_key() {
        let result = realtime_config(&RealtimeSettings::default());
        assert!(matches!(result, Err(RealtimeError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_launcher_requires_credentials() {
        let config = ServerConfig::default();
        let launcher = LiveKitLauncher::new(&config, CallRegistry::new()).unwrap();
        assert!(launcher.is_none());
    }
}

//! Base traits and types for hosted speech-to-speech providers.
//!
//! A provider holds one bidirectional session per call: caller audio goes in,
//! synthesized agent audio and transcripts of both sides come out.
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian mono. The sample rate is provider specific
//! and reported by [`BaseRealtime::sample_rate`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Error event reported by the provider itself
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Not connected")]
    NotConnected,

    /// The provider has no equivalent for the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Configuration Types
// =============================================================================

/// Configuration for automatic reconnection behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectionConfig {
    /// Enable automatic reconnection on connection loss.
    pub enabled: bool,

    /// Maximum number of reconnection attempts before giving up.
    /// Set to 0 for unlimited attempts.
    pub max_attempts: u32,

    /// Initial delay between reconnection attempts (milliseconds).
    pub initial_delay_ms: u64,

    /// Maximum delay between reconnection attempts (milliseconds).
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f32,

    /// Add up to 25% jitter to each delay.
    pub jitter: bool,
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Delay in milliseconds before the given (1-based) attempt.
    pub fn calculate_delay(&self, attempt: u32) -> u64 {
        let base_delay = self.initial_delay_ms as f64;
        let multiplier = self.backoff_multiplier as f64;

        let delay = base_delay * multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = delay.min(self.max_delay_ms as f64);

        if self.jitter {
            let jitter = rand_jitter(delay * 0.25);
            (delay + jitter).max(0.0) as u64
        } else {
            delay as u64
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempt < self.max_attempts)
    }
}

/// Pseudo-random value in `-range..=range` from a clock-seeded LCG.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;
    let seed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let random = ((seed.wrapping_mul(1103515245).wrapping_add(12345)) % (1 << 31)) as f64;
    let normalized = random / (1u64 << 31) as f64;
    (normalized - 0.5) * 2.0 * range
}

/// Settings for one realtime session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub api_key: String,

    /// Provider name (e.g., "openai")
    #[serde(default)]
    pub provider: String,

    /// Model for OpenAI, agent id for ElevenLabs
    #[serde(default)]
    pub model: String,

    /// WebSocket URL replacing the provider's default endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub voice: Option<String>,

    /// System instructions for the assistant
    #[serde(default)]
    pub instructions: Option<String>,

    /// Opening line for providers that speak it themselves on connect
    #[serde(default)]
    pub greeting: Option<String>,

    /// Temperature for response generation (0.0 to 2.0)
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Transcription model for the caller side (e.g., "whisper-1")
    #[serde(default)]
    pub input_transcription_model: Option<String>,

    #[serde(default)]
    pub turn_detection: Option<TurnDetectionConfig>,

    /// Response modalities (text, audio, or both)
    #[serde(default)]
    pub modalities: Option<Vec<String>>,

    #[serde(default)]
    pub reconnection: Option<ReconnectionConfig>,
}

/// Configuration for turn detection (VAD).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetectionConfig {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold (0.0 to 1.0)
        #[serde(default)]
        threshold: Option<f32>,
        /// Audio included before detected speech (ms)
        #[serde(default)]
        prefix_padding_ms: Option<u32>,
        /// Silence duration before end of turn (ms)
        #[serde(default)]
        silence_duration_ms: Option<u32>,
        #[serde(default)]
        create_response: Option<bool>,
        #[serde(default)]
        interrupt_response: Option<bool>,
    },
    /// No automatic turn detection; the model only answers on request
    #[serde(rename = "none")]
    None,
}

impl Default for TurnDetectionConfig {
    fn default() -> Self {
        TurnDetectionConfig::ServerVad {
            threshold: Some(0.5),
            prefix_padding_ms: Some(300),
            silence_duration_ms: Some(500),
            create_response: Some(true),
            interrupt_response: Some(true),
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state for realtime providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Transcript produced by the provider for either side of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,
    pub role: TranscriptRole,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// Caller speech
    User,
    /// Agent speech
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Synthesized agent audio.
#[derive(Debug, Clone)]
pub struct RealtimeAudioData {
    /// PCM 16-bit mono little-endian
    pub data: Bytes,
    pub sample_rate: u32,
    pub item_id: Option<String>,
}

/// Callback type for transcript events.
pub type TranscriptCallback =
    Arc<dyn Fn(TranscriptResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for audio output events.
pub type AudioOutputCallback =
    Arc<dyn Fn(RealtimeAudioData) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for error events.
pub type RealtimeErrorCallback =
    Arc<dyn Fn(RealtimeError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Base Trait
// =============================================================================

/// Base trait for hosted speech-to-speech providers.
///
/// ```rust,ignore
/// let mut realtime = create_realtime_provider("openai", config)?;
/// realtime.on_transcript(Arc::new(|t| Box::pin(async move {
///     tracing::info!(role = %t.role, "{}", t.text);
/// })))?;
/// realtime.connect().await?;
/// realtime.say("Welcome, how can I help?").await?;
/// realtime.send_audio(frame_bytes).await?;
/// ```
#[async_trait]
pub trait BaseRealtime: Send + Sync {
    fn new(config: RealtimeConfig) -> RealtimeResult<Self>
    where
        Self: Sized;

    async fn connect(&mut self) -> RealtimeResult<()>;

    async fn disconnect(&mut self) -> RealtimeResult<()>;

    fn is_ready(&self) -> bool;

    fn get_connection_state(&self) -> ConnectionState;

    /// Sample rate expected by `send_audio` and produced by the audio callback.
    fn sample_rate(&self) -> u32;

    // -------------------------------------------------------------------------
    // Audio I/O
    // -------------------------------------------------------------------------

    /// Send caller audio (PCM 16-bit mono little-endian at `sample_rate`).
    async fn send_audio(&mut self, audio_data: Bytes) -> RealtimeResult<()>;

    // -------------------------------------------------------------------------
    // Session Control
    // -------------------------------------------------------------------------

    /// Have the agent speak `text` as literally as the provider allows.
    async fn say(&mut self, text: &str) -> RealtimeResult<()>;

    /// Cancel the response currently being generated, if any.
    async fn cancel_response(&mut self) -> RealtimeResult<()>;

    /// Enable or disable automatic responses to caller turns.
    async fn set_auto_respond(&mut self, enabled: bool) -> RealtimeResult<()>;

    // -------------------------------------------------------------------------
    // Callbacks
    // -------------------------------------------------------------------------

    fn on_transcript(&mut self, callback: TranscriptCallback) -> RealtimeResult<()>;

    fn on_audio(&mut self, callback: AudioOutputCallback) -> RealtimeResult<()>;

    fn on_error(&mut self, callback: RealtimeErrorCallback) -> RealtimeResult<()>;

    fn get_provider_info(&self) -> serde_json::Value;
}

/// Boxed trait object for realtime providers.
pub type BoxedRealtime = Box<dyn BaseRealtime>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::Reconnecting.to_string(), "Reconnecting");
    }

    #[test]
    fn test_default_turn_detection_matches_server_vad() {
        match TurnDetectionConfig::default() {
            TurnDetectionConfig::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
                ..
            } => {
                assert_eq!(threshold, Some(0.5));
                assert_eq!(prefix_padding_ms, Some(300));
                assert_eq!(silence_duration_ms, Some(500));
            }
            TurnDetectionConfig::None => panic!("Expected ServerVad default"),
        }
    }

    #[test]
    fn test_turn_detection_none_serializes_as_tagged() {
        let json = serde_json::to_value(TurnDetectionConfig::None).unwrap();
        assert_eq!(json["type"], "none");
    }

    #[test]
    fn test_reconnection_should_retry() {
        let config = ReconnectionConfig::default();
        assert!(config.should_retry(0));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));

        let unlimited = ReconnectionConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(unlimited.should_retry(u32::MAX));

        assert!(!ReconnectionConfig::disabled().should_retry(0));
    }

    #[test]
    fn test_reconnection_calculate_delay_no_jitter() {
        let config = ReconnectionConfig {
            initial_delay_ms: 500,
            max_delay_ms: 3000,
            backoff_multiplier: 2.0,
            jitter: false,
            ..Default::default()
        };

        assert_eq!(config.calculate_delay(1), 500);
        assert_eq!(config.calculate_delay(2), 1000);
        assert_eq!(config.calculate_delay(3), 2000);
        assert_eq!(config.calculate_delay(4), 3000);
    }

    #[test]
    fn test_reconnection_calculate_delay_with_jitter() {
        let config = ReconnectionConfig {
            initial_delay_ms: 1000,
            jitter: true,
            ..Default::default()
        };
        let delay = config.calculate_delay(1);
        assert!((750..=1250).contains(&delay), "delay {delay} out of range");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(RealtimeError::NotConnected.to_string(), "Not connected");
        let err = RealtimeError::Unsupported("say".into());
        assert!(err.to_string().contains("Unsupported"));
    }
}

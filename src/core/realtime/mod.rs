//! Hosted speech-to-speech providers.
//!
//! # Supported Providers
//!
//! - **OpenAI Realtime API**: full duplex audio with GPT-4o, 24kHz PCM16
//! - **ElevenLabs Conversational AI**: hosted agent by id, 16kHz PCM16
//!
//! Providers implement [`BaseRealtime`] and are created by name through
//! [`create_realtime_provider`].

mod base;
pub mod elevenlabs;
pub mod openai;

pub use base::{
    AudioOutputCallback, BaseRealtime, BoxedRealtime, ConnectionState, RealtimeAudioData,
    RealtimeConfig, RealtimeError, RealtimeErrorCallback, RealtimeResult, ReconnectionConfig,
    TranscriptCallback, TranscriptResult, TranscriptRole, TurnDetectionConfig,
};
pub use elevenlabs::{ELEVENLABS_CONVAI_URL, ELEVENLABS_SAMPLE_RATE, ElevenLabsConvAI};
pub use openai::{OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL, OpenAIRealtime};

/// Supported realtime providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealtimeProvider {
    OpenAI,
    ElevenLabs,
}

impl RealtimeProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(RealtimeProvider::OpenAI),
            "elevenlabs" | "eleven_labs" | "eleven-labs" | "convai" => {
                Some(RealtimeProvider::ElevenLabs)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for RealtimeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RealtimeProvider::OpenAI => write!(f, "openai"),
            RealtimeProvider::ElevenLabs => write!(f, "elevenlabs"),
        }
    }
}

/// Create a realtime provider by name.
///
/// ```rust,ignore
/// let provider = create_realtime_provider("openai", RealtimeConfig {
///     api_key: "sk-...".to_string(),
///     ..Default::default()
/// })?;
/// ```
pub fn create_realtime_provider(
    provider_type: &str,
    config: RealtimeConfig,
) -> RealtimeResult<BoxedRealtime> {
    match RealtimeProvider::parse(provider_type) {
        Some(RealtimeProvider::OpenAI) => Ok(Box::new(OpenAIRealtime::new(config)?)),
        Some(RealtimeProvider::ElevenLabs) => Ok(Box::new(ElevenLabsConvAI::new(config)?)),
        None => Err(RealtimeError::InvalidConfiguration(format!(
            "Unsupported realtime provider: {provider_type}. Supported providers: {}",
            get_supported_realtime_providers().join(", ")
        ))),
    }
}

/// Get list of supported realtime providers.
pub fn get_supported_realtime_providers() -> Vec<&'static str> {
    vec!["openai", "elevenlabs"]
}

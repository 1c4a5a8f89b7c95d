//! The speaking side of the voice agent, as seen by the call actor.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    /// The backing provider has no way to do this
    #[error("voice operation not supported: {0}")]
    Unsupported(String),

    #[error("voice operation failed: {0}")]
    Failed(String),
}

/// Control over the agent's voice in the room.
///
/// `mute` is final: after it the agent never speaks again in this call.
#[async_trait]
pub trait AgentVoice: Send + Sync {
    /// Speak `text` verbatim.
    async fn say(&self, text: &str) -> Result<(), VoiceError>;

    /// Stop the current response and stop taking turns.
    async fn pause(&self) -> Result<(), VoiceError>;

    /// Take turns again after a pause.
    async fn resume(&self) -> Result<(), VoiceError>;

    async fn mute(&self) -> Result<(), VoiceError>;
}

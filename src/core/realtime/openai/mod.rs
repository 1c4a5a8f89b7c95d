//! OpenAI Realtime API provider.
//!
//! Bidirectional audio over WebSocket with server VAD, caller transcription
//! (`whisper-1`) and agent speech transcripts.
//!
//! Audio is PCM 16-bit signed little-endian at 24kHz.

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    DEFAULT_INPUT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL,
    OpenAIRealtimeModel, OpenAIRealtimeVoice, verbatim_instruction,
};
pub use messages::{ClientEvent, ServerEvent, SessionConfig, TurnDetection};

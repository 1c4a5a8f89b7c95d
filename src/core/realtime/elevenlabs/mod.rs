//! ElevenLabs Conversational AI provider.
//!
//! The agent persona lives on the ElevenLabs side and is addressed by agent
//! id (carried in `RealtimeConfig::model`). The greeting and instructions are
//! sent as per-conversation overrides when the socket opens.

mod client;
mod config;
mod messages;

pub use client::ElevenLabsConvAI;
pub use config::{ELEVENLABS_CONVAI_URL, ELEVENLABS_SAMPLE_RATE, conversation_url};
pub use messages::{ClientMessage, ServerMessage};

//! One phone call handled by the voice agent.
//!
//! [`CallSession`] is the per-call actor, [`CallHandle`] the way to talk to
//! it, and [`CallRegistry`] the set of calls the server is running.

mod events;
mod registry;
mod session;
mod settings;
mod voice;

pub use events::{CallEvent, TransferReason, TransferReply};
pub use registry::{CallRegistry, ReserveError, Reservation};
pub use session::{CallDeps, CallError, CallHandle, CallSession, CallSnapshot, CallStart};
pub use settings::{CallSettings, DEFAULT_INBOX_CAPACITY};
pub use voice::{AgentVoice, VoiceError};

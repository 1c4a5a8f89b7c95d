//! LiveKit integration: room membership, agent audio, SIP dialing.

pub mod agent;
pub mod audio;
pub mod call_control;
pub mod launcher;
pub mod token;

pub use call_control::LiveKitCallControl;
pub use launcher::{CallLauncher, Launch, LaunchError, LiveKitLauncher, realtime_config};
pub use token::TokenFactory;

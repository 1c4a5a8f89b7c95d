pub mod call;
pub mod crm;
pub mod handoff;
pub mod realtime;
pub mod telephony;

// Re-export commonly used types for convenience
pub use call::{
    AgentVoice, CallDeps, CallEvent, CallHandle, CallRegistry, CallSession, CallSettings,
    CallSnapshot, CallStart, VoiceError,
};
pub use crm::{CrmClient, CrmError, CrmMessage, NoopSink, TranscriptRelay, TranscriptSink};
pub use handoff::{HandoffMachine, HandoffState, KeywordMatcher, TransferRejection};
pub use realtime::{
    BaseRealtime, BoxedRealtime, RealtimeConfig, RealtimeError, RealtimeProvider, RealtimeResult,
    create_realtime_provider, get_supported_realtime_providers,
};
pub use telephony::{CallControl, SipDialRequest, SipDialResult, TelephonyError};

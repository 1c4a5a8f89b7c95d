//! Transcript relay to the customer-support CRM.
//!
//! Every finalized utterance of a call (caller, voice agent, or human agent
//! after handoff) is posted to one ingestion endpoint as a [`CrmMessage`].

mod client;
mod payload;
mod relay;

pub use client::{CrmClient, CrmError, NoopSink, RetryPolicy, TranscriptSink};
pub use payload::{
    ChannelData, CrmChannel, CrmMessage, MessageBody, MessageHeader, Sender, SenderKind,
    SenderProfile, now_millis,
};
pub use relay::{DEFAULT_RELAY_CAPACITY, RelayCounters, TranscriptRelay};

//! Handoff from the voice agent to a human agent.

mod identity;
mod keywords;
mod machine;

pub use identity::{
    IdentityPrefixes, ParticipantRole, UNKNOWN_CUSTOMER, customer_id_from_identity,
    human_agent_identity, resolve_customer_id,
};
pub use keywords::{DEFAULT_TRANSFER_KEYWORDS, KeywordMatcher};
pub use machine::{
    HandoffError, HandoffMachine, HandoffResult, HandoffState, HumanJoinOutcome,
    TransferRejection,
};

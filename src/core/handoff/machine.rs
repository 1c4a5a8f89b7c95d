//! Transfer state machine for one call.
//!
//! ```text
//! Listening ──request──► TransferRequested ──begin_dial──► Dialing ──ok──► Bridged
//!     ▲                                                       │              │
//!     └───────────────────────── dial_failed ─────────────────┘              │
//!                                                                            ▼
//!  (Listening | TransferRequested | Dialing | Bridged) ──human_joined──► AiMuted
//!  (any) ──terminate──► Terminated
//! ```
//!
//! The machine is plain data. It is owned by the call actor, which is the
//! only writer, so every transition is applied in event order.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandoffState {
    /// The voice agent is talking with the caller
    Listening,
    /// A transfer was accepted and announced
    TransferRequested,
    /// The SIP dial request is in flight
    Dialing,
    /// The human agent's SIP leg exists in the room
    Bridged,
    /// A human agent is present and the voice agent is silenced
    AiMuted,
    /// The call ended
    Terminated,
}

impl HandoffState {
    /// The voice agent still owns the conversation.
    pub fn ai_active(self) -> bool {
        !matches!(self, HandoffState::AiMuted | HandoffState::Terminated)
    }

    pub fn is_terminal(self) -> bool {
        self == HandoffState::Terminated
    }
}

impl fmt::Display for HandoffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HandoffState::Listening => "LISTENING",
            HandoffState::TransferRequested => "TRANSFER_REQUESTED",
            HandoffState::Dialing => "DIALING",
            HandoffState::Bridged => "BRIDGED",
            HandoffState::AiMuted => "AI_MUTED",
            HandoffState::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

/// Why a transfer request was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransferRejection {
    #[error("a transfer is already in progress ({0})")]
    AlreadyInProgress(HandoffState),
    #[error("transfer attempts exhausted after {0} tries")]
    AttemptsExhausted(u32),
    #[error("call has ended")]
    Terminated,
    #[error("no SIP trunk is configured for transfers")]
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("transfer rejected: {0}")]
    Rejected(#[from] TransferRejection),
    #[error("invalid transition {event} from {from}")]
    InvalidTransition { from: HandoffState, event: &'static str },
}

pub type HandoffResult<T> = Result<T, HandoffError>;

/// Outcome of a human agent joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanJoinOutcome {
    /// The voice agent must now be muted
    MuteAi,
    /// Already muted or ended; nothing to do
    NoChange,
}

#[derive(Debug, Clone)]
pub struct HandoffMachine {
    state: HandoffState,
    attempts: u32,
    max_attempts: u32,
}

impl HandoffMachine {
    /// `max_attempts` of 0 means unlimited retries after failed dials.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: HandoffState::Listening,
            attempts: 0,
            max_attempts,
        }
    }

    pub fn state(&self) -> HandoffState {
        self.state
    }

    /// Number of dials started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn request_transfer(&mut self) -> HandoffResult<()> {
        match self.state {
            HandoffState::Listening => {
                if self.max_attempts > 0 && self.attempts >= self.max_attempts {
                    return Err(TransferRejection::AttemptsExhausted(self.attempts).into());
                }
                self.state = HandoffState::TransferRequested;
                Ok(())
            }
            HandoffState::Terminated => Err(TransferRejection::Terminated.into()),
            other => Err(TransferRejection::AlreadyInProgress(other).into()),
        }
    }

    pub fn begin_dial(&mut self) -> HandoffResult<u32> {
        self.expect(HandoffState::TransferRequested, "begin_dial")?;
        self.attempts += 1;
        self.state = HandoffState::Dialing;
        Ok(self.attempts)
    }

    /// Returns false when the result is stale (the human already joined or the call ended).
    pub fn dial_succeeded(&mut self) -> HandoffResult<bool> {
        match self.state {
            HandoffState::Dialing => {
                self.state = HandoffState::Bridged;
                Ok(true)
            }
            HandoffState::AiMuted | HandoffState::Terminated => Ok(false),
            from => Err(HandoffError::InvalidTransition {
                from,
                event: "dial_succeeded",
            }),
        }
    }

    /// Returns false when the failure is stale.
    pub fn dial_failed(&mut self) -> HandoffResult<bool> {
        match self.state {
            HandoffState::Dialing => {
                self.state = HandoffState::Listening;
                Ok(true)
            }
            HandoffState::AiMuted | HandoffState::Terminated => Ok(false),
            from => Err(HandoffError::InvalidTransition {
                from,
                event: "dial_failed",
            }),
        }
    }

    pub fn human_joined(&mut self) -> HumanJoinOutcome {
        match self.state {
            HandoffState::Listening
            | HandoffState::TransferRequested
            | HandoffState::Dialing
            | HandoffState::Bridged => {
                self.state = HandoffState::AiMuted;
                HumanJoinOutcome::MuteAi
            }
            HandoffState::AiMuted | HandoffState::Terminated => HumanJoinOutcome::NoChange,
        }
    }

    /// Returns true on the first call only.
    pub fn terminate(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = HandoffState::Terminated;
        true
    }

    fn expect(&self, wanted: HandoffState, event: &'static str) -> HandoffResult<()> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(HandoffError::InvalidTransition {
                from: self.state,
                event,
            })
        }
    }
}

impl Default for HandoffMachine {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut m = HandoffMachine::new(2);
        assert_eq!(m.state(), HandoffState::Listening);

        m.request_transfer().unwrap();
        assert_eq!(m.begin_dial().unwrap(), 1);
        assert!(m.dial_succeeded().unwrap());
        assert_eq!(m.state(), HandoffState::Bridged);
        assert!(m.state().ai_active());

        assert_eq!(m.human_joined(), HumanJoinOutcome::MuteAi);
        assert_eq!(m.state(), HandoffState::AiMuted);
        assert!(!m.state().ai_active());

        assert!(m.terminate());
        assert!(!m.terminate());
    }

    #[test]
    fn test_second_request_is_rejected_while_in_progress() {
        let mut m = HandoffMachine::default();
        m.request_transfer().unwrap();
        assert_eq!(
            m.request_transfer(),
            Err(HandoffError::Rejected(TransferRejection::AlreadyInProgress(
                HandoffState::TransferRequested
            )))
        );

        m.begin_dial().unwrap();
        assert!(matches!(
            m.request_transfer(),
            Err(HandoffError::Rejected(TransferRejection::AlreadyInProgress(
                HandoffState::Dialing
            )))
        ));
    }

    #[test]
    fn test_failed_dial_allows_retry_until_exhausted() {
        let mut m = HandoffMachine::new(2);

        m.request_transfer().unwrap();
        m.begin_dial().unwrap();
        assert!(m.dial_failed().unwrap());
        assert_eq!(m.state(), HandoffState::Listening);

        m.request_transfer().unwrap();
        assert_eq!(m.begin_dial().unwrap(), 2);
        m.dial_failed().unwrap();

        assert_eq!(
            m.request_transfer(),
            Err(HandoffError::Rejected(TransferRejection::AttemptsExhausted(2)))
        );
    }

    #[test]
    fn test_human_can_join_before_dial_result() {
        let mut m = HandoffMachine::default();
        m.request_transfer().unwrap();
        m.begin_dial().unwrap();

        assert_eq!(m.human_joined(), HumanJoinOutcome::MuteAi);
        assert!(!m.dial_succeeded().unwrap());
        assert_eq!(m.state(), HandoffState::AiMuted);
        assert_eq!(m.human_joined(), HumanJoinOutcome::NoChange);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut m = HandoffMachine::default();
        assert!(matches!(
            m.begin_dial(),
            Err(HandoffError::InvalidTransition { from: HandoffState::Listening, .. })
        ));
        assert!(m.dial_succeeded().is_err());
        assert!(m.dial_failed().is_err());
    }

    #[test]
    fn test_terminated_is_absorbing() {
        let mut m = HandoffMachine::default();
        m.terminate();
        assert_eq!(
            m.request_transfer(),
            Err(HandoffError::Rejected(TransferRejection::Terminated))
        );
        assert_eq!(m.human_joined(), HumanJoinOutcome::NoChange);
        assert_eq!(m.state(), HandoffState::Terminated);
    }

    #[test]
    fn test_state_display_and_serialize() {
        assert_eq!(HandoffState::AiMuted.to_string(), "AI_MUTED");
        assert_eq!(
            serde_json::to_value(HandoffState::TransferRequested).unwrap(),
            "TRANSFER_REQUESTED"
        );
    }
}

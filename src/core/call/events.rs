//! Inputs to the call actor.

use std::fmt;

use tokio::sync::oneshot;

use crate::core::handoff::TransferRejection;

/// Answer to a transfer request: accepted, or the reason it was not.
pub type TransferReply = oneshot::Sender<Result<(), TransferRejection>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferReason {
    /// The caller said a transfer keyword
    Keyword(String),
    /// Requested through the control API
    Manual,
}

impl fmt::Display for TransferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferReason::Keyword(keyword) => write!(f, "keyword '{keyword}'"),
            TransferReason::Manual => f.write_str("manual request"),
        }
    }
}

/// Something that happened in the room, the speech model, or the control API.
#[derive(Debug)]
pub enum CallEvent {
    ParticipantConnected {
        identity: String,
    },
    ParticipantDisconnected {
        identity: String,
    },
    /// A remote audio track was subscribed
    TrackSubscribed {
        identity: String,
    },
    /// Caller speech as transcribed by the speech model
    CallerTranscript {
        text: String,
        is_final: bool,
    },
    /// Speech of the voice agent itself
    BotTranscript {
        text: String,
        is_final: bool,
    },
    /// Room-level transcription of a participant
    RoomTranscript {
        identity: String,
        text: String,
        is_final: bool,
    },
    TransferRequested {
        reason: TransferReason,
        reply: Option<TransferReply>,
    },
    Hangup {
        reason: String,
    },
    RoomClosed,
}

impl CallEvent {
    pub fn caller(text: impl Into<String>) -> Self {
        CallEvent::CallerTranscript {
            text: text.into(),
            is_final: true,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        CallEvent::BotTranscript {
            text: text.into(),
            is_final: true,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            CallEvent::ParticipantConnected { .. } => "participant_connected",
            CallEvent::ParticipantDisconnected { .. } => "participant_disconnected",
            CallEvent::TrackSubscribed { .. } => "track_subscribed",
            CallEvent::CallerTranscript { .. } => "caller_transcript",
            CallEvent::BotTranscript { .. } => "bot_transcript",
            CallEvent::RoomTranscript { .. } => "room_transcript",
            CallEvent::TransferRequested { .. } => "transfer_requested",
            CallEvent::Hangup { .. } => "hangup",
            CallEvent::RoomClosed => "room_closed",
        }
    }
}

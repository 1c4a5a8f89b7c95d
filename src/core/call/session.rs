//! The call actor.
//!
//! One task per call owns every piece of call state. Room callbacks, the
//! speech model, spawned dials and the control API only send messages into
//! its inbox, so transitions are applied one at a time in arrival order.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::{CallEvent, TransferReason, TransferReply};
use super::settings::CallSettings;
use super::voice::{AgentVoice, VoiceError};
use crate::core::crm::{RelayCounters, SenderKind, TranscriptRelay, TranscriptSink, now_millis};
use crate::core::handoff::{
    HandoffError, HandoffMachine, HandoffState, HumanJoinOutcome, ParticipantRole,
    TransferRejection, UNKNOWN_CUSTOMER, customer_id_from_identity, human_agent_identity,
    resolve_customer_id,
};
use crate::core::telephony::{
    CallControl, SipDialRequest, SipDialResult, TelephonyError, TelephonyResult,
};

/// Scripted lines waiting for their transcript to come back from the model.
const MAX_PENDING_ECHOES: usize = 4;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("call {0} has ended")]
    Closed(String),

    #[error(transparent)]
    Rejected(#[from] TransferRejection),
}

/// Read-only view of a call, republished after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSnapshot {
    pub call_id: String,
    pub session_id: String,
    pub customer_id: String,
    pub customer_identity: Option<String>,
    pub human_agent_identity: Option<String>,
    pub state: HandoffState,
    pub ai_active: bool,
    pub transfer_attempts: u32,
    pub relay: RelayCounters,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub finished: bool,
}

/// What is known about the room when the agent joins.
#[derive(Debug, Clone, Default)]
pub struct CallStart {
    pub room_metadata: String,
    /// Identities of the remote participants already present
    pub participants: Vec<String>,
}

/// Collaborators of a call.
#[derive(Clone)]
pub struct CallDeps {
    pub voice: Arc<dyn AgentVoice>,
    pub control: Arc<dyn CallControl>,
    pub sink: Arc<dyn TranscriptSink>,
}

enum Inbox {
    Event(CallEvent),
    DialFinished {
        attempt: u32,
        result: TelephonyResult<SipDialResult>,
    },
    MuteDue,
}

/// Cloneable handle to a running call.
#[derive(Clone)]
pub struct CallHandle {
    call_id: Arc<str>,
    session_id: Uuid,
    tx: mpsc::Sender<Inbox>,
    snapshot: watch::Receiver<CallSnapshot>,
    cancel: CancellationToken,
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("call_id", &self.call_id)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl CallHandle {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub async fn send(&self, event: CallEvent) -> Result<(), CallError> {
        self.tx
            .send(Inbox::Event(event))
            .await
            .map_err(|_| CallError::Closed(self.call_id.to_string()))
    }

    /// Ask for a transfer and wait until the call accepts or rejects it.
    pub async fn request_transfer(&self, reason: TransferReason) -> Result<(), CallError> {
        let (reply, answer) = oneshot::channel();
        self.send(CallEvent::TransferRequested {
            reason,
            reply: Some(reply),
        })
        .await?;
        answer
            .await
            .map_err(|_| CallError::Closed(self.call_id.to_string()))?
            .map_err(CallError::from)
    }

    pub async fn hangup(&self, reason: impl Into<String>) -> Result<(), CallError> {
        self.send(CallEvent::Hangup {
            reason: reason.into(),
        })
        .await
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.snapshot.borrow().finished
    }

    /// Resolves once teardown has completed.
    pub async fn wait_terminated(&self) {
        let mut rx = self.snapshot.clone();
        // An error means the actor is gone, which is also the end of the call
        let _ = rx.wait_for(|snapshot| snapshot.finished).await;
    }

    /// Cancelled when the call ends. Room-side tasks stop on it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct CallSession {
    call_id: String,
    session_id: Uuid,
    customer_id: String,
    customer_identity: Option<String>,
    human_agent_identity: Option<String>,
    /// Identity given to the SIP leg of a successful dial
    dialed_identity: Option<String>,
    /// Remote participants currently in the room
    participants: BTreeSet<String>,
    settings: Arc<CallSettings>,
    machine: HandoffMachine,
    ai_active: bool,
    pending_echoes: VecDeque<String>,
    voice: Arc<dyn AgentVoice>,
    control: Arc<dyn CallControl>,
    relay: TranscriptRelay,
    started_at_ms: u64,
    ended_at_ms: Option<u64>,
    inbox: mpsc::WeakSender<Inbox>,
    snapshot_tx: watch::Sender<CallSnapshot>,
    cancel: CancellationToken,
}

impl CallSession {
    /// Start the actor for `call_id` (the room name).
    pub fn spawn(
        call_id: impl Into<String>,
        start: CallStart,
        settings: Arc<CallSettings>,
        deps: CallDeps,
    ) -> CallHandle {
        let call_id = call_id.into();
        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(settings.inbox_capacity.max(1));

        let customer_id = resolve_customer_id(
            settings.customer_id_override.as_deref(),
            start.participants.iter().map(String::as_str),
            &start.room_metadata,
            &settings.prefixes,
        );
        let relay = TranscriptRelay::spawn(deps.sink, settings.relay_capacity);
        let machine = HandoffMachine::new(settings.max_transfer_attempts);
        let started_at_ms = now_millis() as u64;

        let initial = CallSnapshot {
            call_id: call_id.clone(),
            session_id: session_id.to_string(),
            customer_id: customer_id.clone(),
            customer_identity: None,
            human_agent_identity: None,
            state: machine.state(),
            ai_active: true,
            transfer_attempts: 0,
            relay: relay.counters(),
            started_at_ms,
            ended_at_ms: None,
            finished: false,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let session = CallSession {
            call_id: call_id.clone(),
            session_id,
            customer_id,
            customer_identity: None,
            human_agent_identity: None,
            dialed_identity: None,
            participants: BTreeSet::new(),
            settings,
            machine,
            ai_active: true,
            pending_echoes: VecDeque::new(),
            voice: deps.voice,
            control: deps.control,
            relay,
            started_at_ms,
            ended_at_ms: None,
            inbox: tx.downgrade(),
            snapshot_tx,
            cancel: cancel.clone(),
        };

        tokio::spawn(session.run(rx, start.participants));

        CallHandle {
            call_id: Arc::from(call_id.as_str()),
            session_id,
            tx,
            snapshot: snapshot_rx,
            cancel,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Inbox>, present: Vec<String>) {
        info!(
            call_id = %self.call_id,
            session_id = %self.session_id,
            customer_id = %self.customer_id,
            "Call started"
        );

        for identity in present {
            self.on_participant_connected(identity);
        }
        self.greet().await;
        self.publish();

        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => None,
                message = rx.recv() => message,
            };

            let Some(message) = message else {
                self.teardown("call cancelled").await;
                break;
            };

            if self.handle(message).await.is_break() {
                break;
            }
            self.publish();
        }

        debug!(call_id = %self.call_id, "Call actor stopped");
    }

    async fn handle(&mut self, message: Inbox) -> ControlFlow<()> {
        match message {
            Inbox::Event(event) => return self.on_event(event).await,
            Inbox::DialFinished { attempt, result } => self.on_dial_finished(attempt, result).await,
            Inbox::MuteDue => self.mute_ai().await,
        }
        ControlFlow::Continue(())
    }

    async fn on_event(&mut self, event: CallEvent) -> ControlFlow<()> {
        debug!(call_id = %self.call_id, event = event.kind(), state = %self.machine.state(), "Call event");

        match event {
            CallEvent::ParticipantConnected { identity }
            | CallEvent::TrackSubscribed { identity } => self.on_participant_connected(identity),
            CallEvent::ParticipantDisconnected { identity } => {
                self.participants.remove(&identity);
                let reason = match self.role(&identity) {
                    ParticipantRole::Customer => "customer disconnected",
                    ParticipantRole::HumanAgent => "human agent disconnected",
                    ParticipantRole::Other => return ControlFlow::Continue(()),
                };
                info!(call_id = %self.call_id, identity = %identity, "{}", reason);
                self.teardown(reason).await;
                return ControlFlow::Break(());
            }
            CallEvent::CallerTranscript { text, is_final } => {
                self.on_caller_transcript(text, is_final).await
            }
            CallEvent::BotTranscript { text, is_final } => self.on_bot_transcript(text, is_final),
            CallEvent::RoomTranscript {
                identity,
                text,
                is_final,
            } => self.on_room_transcript(&identity, text, is_final),
            CallEvent::TransferRequested { reason, reply } => {
                self.start_transfer(reason, reply).await
            }
            CallEvent::Hangup { reason } => {
                self.teardown(&reason).await;
                return ControlFlow::Break(());
            }
            CallEvent::RoomClosed => {
                self.teardown("room closed").await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn greet(&mut self) {
        let greeting = self.settings.greeting.clone();
        if greeting.trim().is_empty() {
            return;
        }
        self.speak(&greeting).await;
    }

    fn on_participant_connected(&mut self, identity: String) {
        match self.role(&identity) {
            ParticipantRole::Customer => {
                if self.customer_identity.is_none() {
                    self.customer_identity = Some(identity.clone());
                }
                if self.customer_id == UNKNOWN_CUSTOMER {
                    let id = customer_id_from_identity(&identity, &self.settings.prefixes);
                    if !id.is_empty() {
                        info!(call_id = %self.call_id, customer_id = %id, "Customer identified");
                        self.customer_id = id.to_string();
                    }
                }
                self.participants.insert(identity);
            }
            ParticipantRole::HumanAgent => {
                if self.participants.insert(identity.clone()) {
                    info!(call_id = %self.call_id, identity = %identity, "Human agent joined");
                }
                self.human_agent_identity = Some(identity);
                if self.machine.human_joined() == HumanJoinOutcome::MuteAi {
                    self.schedule_mute();
                }
            }
            ParticipantRole::Other => {
                debug!(call_id = %self.call_id, identity = %identity, "Ignoring participant");
            }
        }
    }

    async fn on_caller_transcript(&mut self, text: String, is_final: bool) {
        let Some(text) = final_text(text, is_final) else {
            return;
        };
        if !self.ai_active {
            return;
        }

        self.record(SenderKind::Connector, &text);

        if self.machine.state() != HandoffState::Listening {
            return;
        }
        let keyword = self.settings.keywords.find(&text).map(str::to_string);
        if let Some(keyword) = keyword {
            self.start_transfer(TransferReason::Keyword(keyword), None)
                .await;
        }
    }

    fn on_bot_transcript(&mut self, text: String, is_final: bool) {
        let Some(text) = final_text(text, is_final) else {
            return;
        };
        if !self.ai_active {
            return;
        }

        let spoken = normalize(&text);
        if let Some(index) = self
            .pending_echoes
            .iter()
            .position(|expected| *expected == spoken)
        {
            self.pending_echoes.remove(index);
            debug!(call_id = %self.call_id, "Scripted line already recorded");
            return;
        }

        self.record(SenderKind::Bot, &text);
    }

    fn on_room_transcript(&mut self, identity: &str, text: String, is_final: bool) {
        let Some(text) = final_text(text, is_final) else {
            return;
        };

        match self.role(identity) {
            ParticipantRole::HumanAgent => self.record(SenderKind::Agent, &text),
            // While the model listens, its own transcript covers the caller
            ParticipantRole::Customer if !self.model_listening() => {
                self.record(SenderKind::Connector, &text)
            }
            _ => {}
        }
    }

    async fn start_transfer(&mut self, reason: TransferReason, reply: Option<TransferReply>) {
        let outcome = if self.settings.sip_trunk_id.is_none() {
            Err(TransferRejection::NotConfigured)
        } else {
            match self.machine.request_transfer() {
                Ok(()) => Ok(()),
                Err(HandoffError::Rejected(rejection)) => Err(rejection),
                Err(e) => {
                    warn!(call_id = %self.call_id, error = %e, "Unexpected transfer state");
                    Err(TransferRejection::AlreadyInProgress(self.machine.state()))
                }
            }
        };

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
        if let Err(rejection) = outcome {
            info!(
                call_id = %self.call_id,
                reason = %reason,
                rejection = %rejection,
                "Transfer not started"
            );
            return;
        }

        info!(
            call_id = %self.call_id,
            customer_id = %self.customer_id,
            reason = %reason,
            "Transfer requested"
        );
        self.publish();

        // Stop the model first so it cannot talk over the announcement
        if let Err(e) = self.voice.pause().await {
            warn!(call_id = %self.call_id, error = %e, "Failed to pause voice agent");
        }
        let announcement = self.settings.transfer_announcement.clone();
        self.speak(&announcement).await;

        let attempt = match self.machine.begin_dial() {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!(call_id = %self.call_id, error = %e, "Cannot start dial");
                return;
            }
        };
        self.publish();

        let request = self.dial_request();
        info!(
            call_id = %self.call_id,
            attempt,
            identity = %request.participant_identity,
            call_to = %request.sip_call_to,
            "Dialing human agent"
        );

        let control = self.control.clone();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let result = control.dial_human_agent(&request).await;
            if let Some(tx) = inbox.upgrade() {
                let _ = tx.send(Inbox::DialFinished { attempt, result }).await;
            }
        });
    }

    async fn on_dial_finished(&mut self, attempt: u32, result: TelephonyResult<SipDialResult>) {
        if attempt != self.machine.attempts() {
            debug!(call_id = %self.call_id, attempt, "Ignoring result of an older dial");
            return;
        }

        match result {
            Ok(dialed) => match self.machine.dial_succeeded() {
                Ok(true) => {
                    info!(
                        call_id = %self.call_id,
                        attempt,
                        identity = %dialed.participant_identity,
                        sip_call_id = %dialed.sip_call_id,
                        "Human agent dialed"
                    );
                    self.dialed_identity = Some(if dialed.participant_identity.is_empty() {
                        human_agent_identity(&self.customer_id, &self.settings.prefixes)
                    } else {
                        dialed.participant_identity
                    });
                    let message = self.settings.transfer_initiated_message.clone();
                    self.record(SenderKind::Bot, &message);
                }
                Ok(false) => debug!(call_id = %self.call_id, "Dial finished after handoff"),
                Err(e) => warn!(call_id = %self.call_id, error = %e, "Unexpected dial result"),
            },
            Err(err) => match self.machine.dial_failed() {
                Ok(true) => {
                    warn!(call_id = %self.call_id, attempt, error = %err, "Transfer dial failed");
                    let message = self.settings.transfer_failed_message.clone();
                    self.speak(&message).await;
                    if let Err(e) = self.voice.resume().await {
                        warn!(call_id = %self.call_id, error = %e, "Failed to resume voice agent");
                    }
                }
                Ok(false) => debug!(call_id = %self.call_id, "Dial failed after handoff"),
                Err(e) => warn!(call_id = %self.call_id, error = %e, "Unexpected dial result"),
            },
        }
    }

    fn schedule_mute(&self) {
        let delay = self.settings.handoff_delay;
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = inbox.upgrade() {
                let _ = tx.send(Inbox::MuteDue).await;
            }
        });
    }

    async fn mute_ai(&mut self) {
        if !self.ai_active || self.machine.state().is_terminal() {
            return;
        }
        self.ai_active = false;
        self.pending_echoes.clear();
        if let Err(e) = self.voice.mute().await {
            warn!(call_id = %self.call_id, error = %e, "Failed to mute voice agent");
        }
        info!(call_id = %self.call_id, "Voice agent muted, human agent has the call");
    }

    async fn teardown(&mut self, reason: &str) {
        if !self.machine.terminate() {
            return;
        }
        info!(call_id = %self.call_id, reason = %reason, "Ending call");

        if self.ai_active {
            self.ai_active = false;
            if let Err(e) = self.voice.mute().await {
                warn!(call_id = %self.call_id, error = %e, "Failed to mute voice agent");
            }
        }

        let mut remaining: BTreeSet<String> = std::mem::take(&mut self.participants)
            .into_iter()
            .filter(|identity| self.role(identity) != ParticipantRole::Other)
            .collect();
        // A dialed SIP leg can still be ringing without having joined
        if let Some(dialed) = self.dialed_identity.take()
            && self.human_agent_identity.as_deref() != Some(dialed.as_str())
        {
            remaining.insert(dialed);
        }

        for identity in remaining {
            match self.control.remove_participant(&self.call_id, &identity).await {
                Ok(()) => info!(call_id = %self.call_id, identity = %identity, "Removed participant"),
                Err(TelephonyError::ParticipantNotFound { .. }) => {
                    debug!(call_id = %self.call_id, identity = %identity, "Participant already gone")
                }
                Err(e) => warn!(
                    call_id = %self.call_id,
                    identity = %identity,
                    error = %e,
                    "Failed to remove participant"
                ),
            }
        }

        self.relay.close().await;
        self.ended_at_ms = Some(now_millis() as u64);
        self.cancel.cancel();
        self.publish();

        let counters = self.relay.counters();
        info!(
            call_id = %self.call_id,
            delivered = counters.delivered,
            failed = counters.failed,
            dropped = counters.dropped,
            "Call ended"
        );
    }

    /// Say a scripted line and relay it once the voice has taken it.
    async fn speak(&mut self, text: &str) {
        match self.voice.say(text).await {
            Ok(()) => {
                self.record(SenderKind::Bot, text);
                self.expect_echo(text);
            }
            // Whatever the model says instead arrives as its own transcript
            Err(VoiceError::Unsupported(reason)) => {
                debug!(call_id = %self.call_id, reason = %reason, "Voice cannot speak verbatim");
            }
            Err(e) => warn!(call_id = %self.call_id, error = %e, "Failed to speak"),
        }
    }

    fn expect_echo(&mut self, text: &str) {
        if self.pending_echoes.len() == MAX_PENDING_ECHOES {
            self.pending_echoes.pop_front();
        }
        self.pending_echoes.push_back(normalize(text));
    }

    fn record(&self, kind: SenderKind, text: &str) {
        let message = self
            .settings
            .crm_channel
            .message(&self.call_id, &self.customer_id, kind, text);
        self.relay.submit(message);
    }

    fn dial_request(&self) -> SipDialRequest {
        SipDialRequest {
            room_name: self.call_id.clone(),
            sip_trunk_id: self.settings.sip_trunk_id.clone().unwrap_or_default(),
            sip_call_to: self.settings.transfer_extension.clone(),
            participant_identity: human_agent_identity(&self.customer_id, &self.settings.prefixes),
            participant_name: self.settings.human_agent_name.clone(),
            participant_metadata: self.settings.participant_metadata.clone(),
            play_dialtone: self.settings.play_dialtone,
        }
    }

    fn role(&self, identity: &str) -> ParticipantRole {
        ParticipantRole::classify(identity, &self.settings.prefixes)
    }

    /// The speech model is hearing and answering the caller.
    fn model_listening(&self) -> bool {
        self.ai_active && self.machine.state() == HandoffState::Listening
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(CallSnapshot {
            call_id: self.call_id.clone(),
            session_id: self.session_id.to_string(),
            customer_id: self.customer_id.clone(),
            customer_identity: self.customer_identity.clone(),
            human_agent_identity: self.human_agent_identity.clone(),
            state: self.machine.state(),
            ai_active: self.ai_active,
            transfer_attempts: self.machine.attempts(),
            relay: self.relay.counters(),
            started_at_ms: self.started_at_ms,
            ended_at_ms: self.ended_at_ms,
            finished: self.ended_at_ms.is_some(),
        });
    }
}

fn final_text(text: String, is_final: bool) -> Option<String> {
    if !is_final {
        return None;
    }
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Lowercase alphanumerics only, so punctuation and spacing differences in a
/// model transcript still match the scripted text.
fn normalize(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

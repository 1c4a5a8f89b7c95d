//! The voice agent as a participant in a LiveKit room.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use livekit::options::TrackPublishOptions;
use livekit::prelude::*;
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_source::{AudioSourceOptions, RtcAudioSource};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio::{bridge_input, play_output};
use super::call_control::LiveKitCallControl;
use super::launcher::{LaunchError, realtime_config};
use crate::config::RealtimeSettings;
use crate::core::call::{
    AgentVoice, CallDeps, CallEvent, CallHandle, CallSession, CallSettings, CallStart, VoiceError,
};
use crate::core::crm::TranscriptSink;
use crate::core::handoff::{IdentityPrefixes, ParticipantRole};
use crate::core::realtime::{
    BoxedRealtime, RealtimeAudioData, RealtimeError, TranscriptResult, TranscriptRole,
    create_realtime_provider,
};

const AGENT_TRACK_NAME: &str = "agent-voice";

/// Queue of the native audio source, in milliseconds.
const SOURCE_QUEUE_MS: u32 = 200;

fn voice_error(err: RealtimeError) -> VoiceError {
    match err {
        RealtimeError::Unsupported(reason) => VoiceError::Unsupported(reason),
        other => VoiceError::Failed(other.to_string()),
    }
}

/// [`AgentVoice`] backed by a realtime speech model and a published room track.
pub struct RealtimeVoice {
    provider: Arc<Mutex<BoxedRealtime>>,
    /// Closed once muted; audio in both directions is dropped
    gate: Arc<AtomicBool>,
    track: Mutex<Option<(LocalParticipant, TrackSid)>>,
}

impl RealtimeVoice {
    pub fn new(
        provider: Arc<Mutex<BoxedRealtime>>,
        gate: Arc<AtomicBool>,
        participant: LocalParticipant,
        track_sid: TrackSid,
    ) -> Self {
        Self {
            provider,
            gate,
            track: Mutex::new(Some((participant, track_sid))),
        }
    }
}

#[async_trait]
impl AgentVoice for RealtimeVoice {
    async fn say(&self, text: &str) -> Result<(), VoiceError> {
        self.provider.lock().await.say(text).await.map_err(voice_error)
    }

    async fn pause(&self) -> Result<(), VoiceError> {
        let mut provider = self.provider.lock().await;
        match provider.cancel_response().await {
            Ok(()) | Err(RealtimeError::Unsupported(_)) => {}
            Err(e) => debug!("Nothing to cancel: {}", e),
        }
        provider.set_auto_respond(false).await.map_err(voice_error)
    }

    async fn resume(&self) -> Result<(), VoiceError> {
        self.provider
            .lock()
            .await
            .set_auto_respond(true)
            .await
            .map_err(voice_error)
    }

    async fn mute(&self) -> Result<(), VoiceError> {
        self.gate.store(false, Ordering::SeqCst);

        let mut result = Ok(());
        if let Some((participant, sid)) = self.track.lock().await.take()
            && let Err(e) = participant.unpublish_track(&sid).await
        {
            result = Err(VoiceError::Failed(format!("unpublish agent track: {e}")));
        }

        if let Err(e) = self.provider.lock().await.disconnect().await {
            result = Err(voice_error(e));
        }
        result
    }
}

/// Route speech model callbacks to the call and the room.
pub fn wire_provider(
    provider: &mut BoxedRealtime,
    events: mpsc::UnboundedSender<CallEvent>,
    audio: mpsc::UnboundedSender<Bytes>,
) -> Result<(), RealtimeError> {
    provider.on_transcript(Arc::new(move |transcript: TranscriptResult| {
        let events = events.clone();
        Box::pin(async move {
            let event = match transcript.role {
                TranscriptRole::User => CallEvent::CallerTranscript {
                    text: transcript.text,
                    is_final: transcript.is_final,
                },
                TranscriptRole::Assistant => CallEvent::BotTranscript {
                    text: transcript.text,
                    is_final: transcript.is_final,
                },
            };
            let _ = events.send(event);
        })
    }))?;

    provider.on_audio(Arc::new(move |chunk: RealtimeAudioData| {
        let audio = audio.clone();
        Box::pin(async move {
            let _ = audio.send(chunk.data);
        })
    }))?;

    provider.on_error(Arc::new(|err: RealtimeError| {
        Box::pin(async move {
            warn!("Speech model error: {}", err);
        })
    }))?;

    Ok(())
}

/// Publish the agent's audio track. Returns the source to push audio into.
pub async fn publish_agent_track(
    room: &Room,
    sample_rate: u32,
) -> Result<(NativeAudioSource, TrackSid), RoomError> {
    let source = NativeAudioSource::new(
        AudioSourceOptions::default(),
        sample_rate,
        1,
        SOURCE_QUEUE_MS,
    );
    let track = LocalAudioTrack::create_audio_track(
        AGENT_TRACK_NAME,
        RtcAudioSource::Native(source.clone()),
    );
    let publication = room
        .local_participant()
        .publish_track(
            LocalTrack::Audio(track),
            TrackPublishOptions {
                source: TrackSource::Microphone,
                ..Default::default()
            },
        )
        .await?;
    Ok((source, publication.sid()))
}

/// Everything the room event loop needs besides the room itself.
struct RoomLoop {
    call_id: String,
    events: mpsc::UnboundedSender<CallEvent>,
    provider: Arc<Mutex<BoxedRealtime>>,
    gate: Arc<AtomicBool>,
    sample_rate: u32,
    prefixes: IdentityPrefixes,
    cancel: CancellationToken,
}

impl RoomLoop {
    /// Translate room events into call events until the call ends, then leave.
    async fn run(self, room: Room, mut room_events: mpsc::UnboundedReceiver<RoomEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = room_events.recv() => event,
            };
            let Some(event) = event else {
                let _ = self.events.send(CallEvent::RoomClosed);
                break;
            };
            if !self.on_room_event(event) {
                break;
            }
        }

        self.gate.store(false, Ordering::SeqCst);
        if let Err(e) = room.close().await {
            debug!(call_id = %self.call_id, "Room close: {}", e);
        }
        info!(call_id = %self.call_id, "Agent left room");
    }

    /// Returns false once the room is gone.
    fn on_room_event(&self, event: RoomEvent) -> bool {
        match event {
            RoomEvent::ParticipantConnected(participant) => {
                self.forward(CallEvent::ParticipantConnected {
                    identity: participant.identity().as_str().to_string(),
                });
            }
            RoomEvent::ParticipantDisconnected(participant) => {
                self.forward(CallEvent::ParticipantDisconnected {
                    identity: participant.identity().as_str().to_string(),
                });
            }
            RoomEvent::TrackSubscribed {
                track, participant, ..
            } => {
                let identity = participant.identity().as_str().to_string();
                if let RemoteTrack::Audio(audio_track) = track
                    && ParticipantRole::classify(&identity, &self.prefixes)
                        == ParticipantRole::Customer
                {
                    debug!(call_id = %self.call_id, identity = %identity, "Bridging caller audio");
                    tokio::spawn(bridge_input(
                        audio_track,
                        self.provider.clone(),
                        self.gate.clone(),
                        self.sample_rate,
                        self.cancel.child_token(),
                    ));
                }
                self.forward(CallEvent::TrackSubscribed { identity });
            }
            RoomEvent::TranscriptionReceived {
                participant: Some(participant),
                segments,
                ..
            } => {
                let identity = participant.identity().as_str().to_string();
                for segment in segments.into_iter().filter(|s| s.r#final) {
                    self.forward(CallEvent::RoomTranscript {
                        identity: identity.clone(),
                        text: segment.text,
                        is_final: true,
                    });
                }
            }
            RoomEvent::Disconnected { reason } => {
                info!(call_id = %self.call_id, reason = ?reason, "Disconnected from room");
                self.forward(CallEvent::RoomClosed);
                return false;
            }
            _ => {}
        }
        true
    }

    fn forward(&self, event: CallEvent) {
        if self.events.send(event).is_err() {
            debug!(call_id = %self.call_id, "Call already ended, dropping room event");
        }
    }
}

/// Forward queued events to the call actor in order.
async fn forward_events(mut events: mpsc::UnboundedReceiver<CallEvent>, handle: CallHandle) {
    let cancel = handle.cancellation_token();
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        if handle.send(event).await.is_err() {
            break;
        }
    }
}

/// Joins rooms as the voice agent and starts a call for each.
pub struct RoomAgent {
    pub url: String,
    pub identity: String,
    pub name: String,
    pub realtime: RealtimeSettings,
    pub settings: Arc<CallSettings>,
    pub control: Arc<LiveKitCallControl>,
    pub sink: Arc<dyn TranscriptSink>,
}

impl RoomAgent {
    /// Connect to `room_name`, bring up the speech model and start the call.
    ///
    /// The room is left again once the call terminates.
    pub async fn join(&self, room_name: &str) -> Result<CallHandle, LaunchError> {
        let token = self
            .control
            .tokens()
            .agent_token(room_name, &self.identity, &self.name)
            .map_err(|e| LaunchError::Token(e.to_string()))?;

        let mut provider = create_realtime_provider(
            &self.realtime.provider,
            realtime_config(&self.realtime)?,
        )?;
        let sample_rate = provider.sample_rate();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        wire_provider(&mut provider, event_tx.clone(), audio_tx)?;

        let (room, room_events) = Room::connect(&self.url, &token, RoomOptions::default())
            .await
            .map_err(|e| LaunchError::Room(e.to_string()))?;
        info!(room = %room_name, identity = %self.identity, "Agent joined room");

        if let Err(e) = provider.connect().await {
            let _ = room.close().await;
            return Err(e.into());
        }
        let provider = Arc::new(Mutex::new(provider));

        let (source, track_sid) = match publish_agent_track(&room, sample_rate).await {
            Ok(published) => published,
            Err(e) => {
                let _ = provider.lock().await.disconnect().await;
                let _ = room.close().await;
                return Err(LaunchError::Room(e.to_string()));
            }
        };

        let gate = Arc::new(AtomicBool::new(true));
        let voice = Arc::new(RealtimeVoice::new(
            provider.clone(),
            gate.clone(),
            room.local_participant(),
            track_sid,
        ));

        let start = CallStart {
            room_metadata: room.metadata(),
            participants: room
                .remote_participants()
                .keys()
                .map(|identity| identity.as_str().to_string())
                .collect(),
        };
        let handle = CallSession::spawn(
            room_name,
            start,
            self.settings.clone(),
            CallDeps {
                voice,
                control: self.control.clone(),
                sink: self.sink.clone(),
            },
        );

        let cancel = handle.cancellation_token();
        tokio::spawn(forward_events(event_rx, handle.clone()));
        tokio::spawn(play_output(
            source,
            audio_rx,
            gate.clone(),
            sample_rate,
            cancel.clone(),
        ));

        let room_loop = RoomLoop {
            call_id: room_name.to_string(),
            events: event_tx,
            provider,
            gate,
            sample_rate,
            prefixes: self.settings.prefixes.clone(),
            cancel,
        };
        tokio::spawn(room_loop.run(room, room_events));

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_error_mapping() {
        assert!(matches!(
            voice_error(RealtimeError::Unsupported("no".into())),
            VoiceError::Unsupported(_)
        ));
        assert!(matches!(
            voice_error(RealtimeError::NotConnected),
            VoiceError::Failed(_)
        ));
    }
}

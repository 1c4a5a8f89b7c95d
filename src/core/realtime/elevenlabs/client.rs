//! ElevenLabs Conversational AI client.
//!
//! - Endpoint: `wss://api.elevenlabs.io/v1/convai/conversation?agent_id=<id>`
//! - Auth: `xi-api-key` header
//! - Audio: PCM 16-bit, 16kHz, mono, base64 in JSON frames
//!
//! ConvAI has no verbatim speech request and no turn-detection toggle.
//! `say` is unsupported (the greeting goes out as `first_message`), and
//! disabling auto-respond stops forwarding caller audio instead. Pausing and
//! resuming each send a `contextual_update` so the agent knows whether to
//! stay quiet.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::prelude::*;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use super::config::{ELEVENLABS_CONVAI_URL, ELEVENLABS_SAMPLE_RATE, conversation_url};
use super::messages::{ClientMessage, ServerMessage};
use crate::core::realtime::base::{
    AudioOutputCallback, BaseRealtime, ConnectionState, RealtimeAudioData, RealtimeConfig,
    RealtimeError, RealtimeErrorCallback, RealtimeResult, TranscriptCallback, TranscriptResult,
    TranscriptRole,
};

const WS_CHANNEL_CAPACITY: usize = 256;

const PAUSE_CONTEXT: &str =
    "The caller is being transferred to a human agent. Do not say anything else.";
const RESUME_CONTEXT: &str =
    "The transfer to a human agent failed. Continue helping the caller as before.";

pub struct ElevenLabsConvAI {
    config: RealtimeConfig,
    agent_id: String,
    state: Arc<RwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    conversation_id: Arc<RwLock<Option<String>>>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>,
    transcript_callback: Arc<Mutex<Option<TranscriptCallback>>>,
    audio_callback: Arc<Mutex<Option<AudioOutputCallback>>>,
    error_callback: Arc<Mutex<Option<RealtimeErrorCallback>>>,
    connection_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Caller audio is forwarded only while set
    forward_audio: Arc<AtomicBool>,
}

impl ElevenLabsConvAI {
    pub async fn conversation_id(&self) -> Option<String> {
        self.conversation_id.read().await.clone()
    }

    async fn send_message(&self, message: ClientMessage) -> RealtimeResult<()> {
        match self.ws_sender.lock().await.as_ref() {
            Some(sender) => sender
                .send(message)
                .await
                .map_err(|e| RealtimeError::WebSocketError(e.to_string())),
            None => Err(RealtimeError::NotConnected),
        }
    }

    /// Dispatch one server message. Returns a reply to send, if any.
    async fn handle_server_message(
        message: ServerMessage,
        transcript_cb: &Arc<Mutex<Option<TranscriptCallback>>>,
        audio_cb: &Arc<Mutex<Option<AudioOutputCallback>>>,
        conversation_id: &Arc<RwLock<Option<String>>>,
    ) -> Option<ClientMessage> {
        match message {
            ServerMessage::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: meta,
            } => {
                tracing::info!(
                    conversation_id = %meta.conversation_id,
                    output_format = ?meta.agent_output_audio_format,
                    "ElevenLabs conversation started"
                );
                *conversation_id.write().await = Some(meta.conversation_id);
                None
            }
            ServerMessage::UserTranscript {
                user_transcription_event,
            } => {
                if let Some(cb) = transcript_cb.lock().await.as_ref() {
                    cb(TranscriptResult {
                        text: user_transcription_event.user_transcript,
                        role: TranscriptRole::User,
                        is_final: true,
                        item_id: None,
                    })
                    .await;
                }
                None
            }
            ServerMessage::AgentResponse {
                agent_response_event,
            } => {
                if let Some(cb) = transcript_cb.lock().await.as_ref() {
                    cb(TranscriptResult {
                        text: agent_response_event.agent_response,
                        role: TranscriptRole::Assistant,
                        is_final: true,
                        item_id: None,
                    })
                    .await;
                }
                None
            }
            ServerMessage::Audio { audio_event } => {
                if let Some(cb) = audio_cb.lock().await.as_ref() {
                    match BASE64_STANDARD.decode(&audio_event.audio_base_64) {
                        Ok(bytes) => {
                            cb(RealtimeAudioData {
                                data: Bytes::from(bytes),
                                sample_rate: ELEVENLABS_SAMPLE_RATE,
                                item_id: audio_event.event_id.map(|id| id.to_string()),
                            })
                            .await;
                        }
                        Err(e) => tracing::error!("Failed to decode ElevenLabs audio: {}", e),
                    }
                }
                None
            }
            ServerMessage::Interruption { .. } => {
                tracing::debug!("ElevenLabs agent interrupted by caller");
                None
            }
            ServerMessage::Ping { ping_event } => Some(ClientMessage::pong(ping_event.event_id)),
            ServerMessage::Unknown => None,
        }
    }
}

#[async_trait]
impl BaseRealtime for ElevenLabsConvAI {
    fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }
        if config.model.trim().is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "ElevenLabs agent id is required".to_string(),
            ));
        }

        Ok(Self {
            agent_id: config.model.trim().to_string(),
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            conversation_id: Arc::new(RwLock::new(None)),
            ws_sender: Arc::new(Mutex::new(None)),
            transcript_callback: Arc::new(Mutex::new(None)),
            audio_callback: Arc::new(Mutex::new(None)),
            error_callback: Arc::new(Mutex::new(None)),
            connection_handle: Arc::new(Mutex::new(None)),
            forward_audio: Arc::new(AtomicBool::new(true)),
        })
    }

    async fn connect(&mut self) -> RealtimeResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        *self.state.write().await = ConnectionState::Connecting;

        let endpoint = self
            .config
            .endpoint
            .as_deref()
            .unwrap_or(ELEVENLABS_CONVAI_URL);
        let mut request = conversation_url(endpoint, &self.agent_id)
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        let api_key = HeaderValue::from_str(&self.config.api_key)
            .map_err(|e| RealtimeError::AuthenticationFailed(e.to_string()))?;
        request.headers_mut().insert("xi-api-key", api_key);

        let (ws_stream, _) = match tokio_tungstenite::connect_async(request).await {
            Ok(ok) => ok,
            Err(e) => {
                *self.state.write().await = ConnectionState::Failed;
                return Err(RealtimeError::ConnectionFailed(e.to_string()));
            }
        };
        tracing::info!(agent_id = %self.agent_id, "Connected to ElevenLabs ConvAI");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientMessage>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);

        let transcript_cb = self.transcript_callback.clone();
        let audio_cb = self.audio_callback.clone();
        let error_cb = self.error_callback.clone();
        let conversation_id = self.conversation_id.clone();
        let connected = self.connected.clone();
        let state = self.state.clone();
        let ws_sender = self.ws_sender.clone();

        self.connected.store(true, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Connected;

        let handle = tokio::spawn(async move {
            let mut unexpected_close = false;
            loop {
                tokio::select! {
                    Some(message) = rx.recv() => {
                        let json = match serde_json::to_string(&message) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize ConvAI message: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("Failed to send ConvAI message: {}", e);
                            unexpected_close = true;
                            break;
                        }
                    }

                    msg = ws_stream.next() => {
                        let Some(msg) = msg else {
                            tracing::info!("ConvAI stream ended");
                            unexpected_close = true;
                            break;
                        };
                        match msg {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(message) => {
                                        let reply = Self::handle_server_message(
                                            message,
                                            &transcript_cb,
                                            &audio_cb,
                                            &conversation_id,
                                        ).await;
                                        if let Some(reply) = reply
                                            && let Ok(json) = serde_json::to_string(&reply)
                                            && let Err(e) = ws_sink.send(Message::Text(json.into())).await
                                        {
                                            tracing::warn!("Failed to answer ConvAI ping: {}", e);
                                        }
                                    }
                                    Err(e) => tracing::warn!("Failed to parse ConvAI event: {}", e),
                                }
                            }
                            Ok(Message::Close(frame)) => {
                                tracing::info!(?frame, "ConvAI socket closed by server");
                                unexpected_close = true;
                                break;
                            }
                            Ok(Message::Ping(data)) => {
                                let _ = ws_sink.send(Message::Pong(data)).await;
                            }
                            Err(e) => {
                                tracing::error!("ConvAI WebSocket error: {}", e);
                                unexpected_close = true;
                                break;
                            }
                            _ => {}
                        }
                    }

                    else => break,
                }
            }

            connected.store(false, Ordering::SeqCst);
            *ws_sender.lock().await = None;
            if unexpected_close {
                *state.write().await = ConnectionState::Failed;
                if let Some(cb) = error_cb.lock().await.as_ref() {
                    cb(RealtimeError::ConnectionFailed(
                        "ElevenLabs conversation ended".to_string(),
                    ))
                    .await;
                }
            } else {
                *state.write().await = ConnectionState::Disconnected;
            }
        });
        *self.connection_handle.lock().await = Some(handle);

        self.send_message(ClientMessage::initiation(
            self.config.greeting.clone(),
            self.config.instructions.clone(),
        ))
        .await
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        *self.ws_sender.lock().await = None;
        if let Some(handle) = self.connection_handle.lock().await.take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Disconnected;
        tracing::info!(agent_id = %self.agent_id, "Disconnected from ElevenLabs ConvAI");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        self.state
            .try_read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Connecting)
    }

    fn sample_rate(&self) -> u32 {
        ELEVENLABS_SAMPLE_RATE
    }

    async fn send_audio(&mut self, audio_data: Bytes) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }
        if !self.forward_audio.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.send_message(ClientMessage::audio(&audio_data)).await
    }

    async fn say(&mut self, _text: &str) -> RealtimeResult<()> {
        Err(RealtimeError::Unsupported(
            "ElevenLabs ConvAI cannot speak verbatim text".to_string(),
        ))
    }

    async fn cancel_response(&mut self) -> RealtimeResult<()> {
        Err(RealtimeError::Unsupported(
            "ElevenLabs ConvAI has no response cancellation".to_string(),
        ))
    }

    async fn set_auto_respond(&mut self, enabled: bool) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }
        let context = if enabled { RESUME_CONTEXT } else { PAUSE_CONTEXT };
        // Tell the agent before caller audio flows again
        self.send_message(ClientMessage::contextual_update(context)).await?;
        self.forward_audio.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    fn on_transcript(&mut self, callback: TranscriptCallback) -> RealtimeResult<()> {
        if let Ok(mut guard) = self.transcript_callback.try_lock() {
            *guard = Some(callback);
        } else {
            let slot = self.transcript_callback.clone();
            tokio::spawn(async move {
                *slot.lock().await = Some(callback);
            });
        }
        Ok(())
    }

    fn on_audio(&mut self, callback: AudioOutputCallback) -> RealtimeResult<()> {
        if let Ok(mut guard) = self.audio_callback.try_lock() {
            *guard = Some(callback);
        } else {
            let slot = self.audio_callback.clone();
            tokio::spawn(async move {
                *slot.lock().await = Some(callback);
            });
        }
        Ok(())
    }

    fn on_error(&mut self, callback: RealtimeErrorCallback) -> RealtimeResult<()> {
        if let Ok(mut guard) = self.error_callback.try_lock() {
            *guard = Some(callback);
        } else {
            let slot = self.error_callback.clone();
            tokio::spawn(async move {
                *slot.lock().await = Some(callback);
            });
        }
        Ok(())
    }

    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "elevenlabs",
            "api_type": "WebSocket ConvAI",
            "endpoint": self.config.endpoint.as_deref().unwrap_or(ELEVENLABS_CONVAI_URL),
            "agent_id": self.agent_id,
            "sample_rate": ELEVENLABS_SAMPLE_RATE,
            "features": {
                "verbatim_speech": false,
                "turn_detection_toggle": false,
                "caller_transcription": true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::elevenlabs::messages::{PingEvent, UserTranscription};

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            api_key: "xi-test".to_string(),
            model: "agent_abc".to_string(),
            greeting: Some("Welcome".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_say_is_unsupported() {
        let mut client = ElevenLabsConvAI::new(config()).unwrap();
        assert!(matches!(
            client.say("hello").await,
            Err(RealtimeError::Unsupported(_))
        ));
    }

    fn contextual_text(message: ClientMessage) -> String {
        let json = serde_json::to_value(message).unwrap();
        assert_eq!(json["type"], "contextual_update");
        json["text"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_pause_then_resume_updates_agent_context() {
        let mut client = ElevenLabsConvAI::new(config()).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        *client.ws_sender.lock().await = Some(tx);
        client.connected.store(true, Ordering::SeqCst);

        client.set_auto_respond(false).await.unwrap();
        assert_eq!(contextual_text(rx.recv().await.unwrap()), PAUSE_CONTEXT);

        // Caller audio is held back while paused
        client.send_audio(Bytes::from_static(&[0, 1])).await.unwrap();
        assert!(rx.try_recv().is_err());

        client.set_auto_respond(true).await.unwrap();
        assert_eq!(contextual_text(rx.recv().await.unwrap()), RESUME_CONTEXT);

        client.send_audio(Bytes::from_static(&[0, 1])).await.unwrap();
        let json = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["user_audio_chunk"], "AAE=");
    }

    #[tokio::test]
    async fn test_set_auto_respond_requires_connection() {
        let mut client = ElevenLabsConvAI::new(config()).unwrap();
        assert!(matches!(
            client.set_auto_respond(false).await,
            Err(RealtimeError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_ping_produces_pong() {
        let transcript_cb = Arc::new(Mutex::new(None));
        let audio_cb = Arc::new(Mutex::new(None));
        let conversation_id = Arc::new(RwLock::new(None));

        let reply = ElevenLabsConvAI::handle_server_message(
            ServerMessage::Ping {
                ping_event: PingEvent { event_id: 9 },
            },
            &transcript_cb,
            &audio_cb,
            &conversation_id,
        )
        .await;

        let json = serde_json::to_value(reply.unwrap()).unwrap();
        assert_eq!(json["type"], "pong");
        assert_eq!(json["event_id"], 9);
    }

    #[tokio::test]
    async fn test_user_transcript_is_final_user_role() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cb: TranscriptCallback = Arc::new(move |t: TranscriptResult| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(t);
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        });
        let transcript_cb = Arc::new(Mutex::new(Some(cb)));
        let audio_cb = Arc::new(Mutex::new(None));
        let conversation_id = Arc::new(RwLock::new(None));

        let reply = ElevenLabsConvAI::handle_server_message(
            ServerMessage::UserTranscript {
                user_transcription_event: UserTranscription {
                    user_transcript: "representative please".into(),
                },
            },
            &transcript_cb,
            &audio_cb,
            &conversation_id,
        )
        .await;
        assert!(reply.is_none());

        let t = rx.recv().await.unwrap();
        assert_eq!(t.role, TranscriptRole::User);
        assert!(t.is_final);
        assert_eq!(t.text, "representative please");
    }
}

//! OpenAI Realtime API client.
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Audio: PCM 16-bit, 24kHz, mono, little-endian, base64 encoded
//!
//! The call agent drives one session per call. Caller turns are detected by
//! server VAD; pausing the agent during a handoff swaps turn detection to
//! `none` so the model stops answering while the socket stays open.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{self, HeaderValue, header};

use super::config::{
    DEFAULT_INPUT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL,
    OpenAIRealtimeModel, OpenAIRealtimeVoice, realtime_url, verbatim_instruction,
};
use super::messages::{
    ClientEvent, InputAudioTranscription, ResponseConfig, ServerEvent, SessionConfig,
    TurnDetection,
};
use crate::core::realtime::base::{
    AudioOutputCallback, BaseRealtime, ConnectionState, RealtimeAudioData, RealtimeConfig,
    RealtimeError, RealtimeErrorCallback, RealtimeResult, ReconnectionConfig, TranscriptCallback,
    TranscriptResult, TranscriptRole, TurnDetectionConfig,
};

/// Channel capacity for WebSocket message sending.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Registered callbacks, shared with the connection task.
#[derive(Clone, Default)]
struct Callbacks {
    transcript: Arc<Mutex<Option<TranscriptCallback>>>,
    audio: Arc<Mutex<Option<AudioOutputCallback>>>,
    error: Arc<Mutex<Option<RealtimeErrorCallback>>>,
}

impl Callbacks {
    async fn emit_error(&self, err: RealtimeError) {
        if let Some(cb) = self.error.lock().await.as_ref() {
            cb(err).await;
        }
    }
}

/// Register a callback without blocking when the slot is briefly held.
fn register<T: Send + 'static>(slot: &Arc<Mutex<Option<T>>>, callback: T) {
    if let Ok(mut guard) = slot.try_lock() {
        *guard = Some(callback);
    } else {
        let slot = slot.clone();
        tokio::spawn(async move {
            *slot.lock().await = Some(callback);
        });
    }
}

/// OpenAI Realtime API client.
///
/// All mutable state sits behind `Arc` so the spawned WebSocket task and the
/// owning struct see the same view. Lost connections are retried with
/// exponential backoff and the last session settings are re-sent.
pub struct OpenAIRealtime {
    config: RealtimeConfig,
    model: OpenAIRealtimeModel,
    voice: OpenAIRealtimeVoice,
    state: Arc<RwLock<ConnectionState>>,
    connected: Arc<AtomicBool>,
    session_id: Arc<RwLock<Option<String>>>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientEvent>>>>,
    callbacks: Callbacks,
    connection_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    reconnection_config: ReconnectionConfig,
    /// Set by `disconnect` to suppress reconnection
    intentional_disconnect: Arc<AtomicBool>,
    /// Session settings restored after a reconnect
    last_session_config: Arc<RwLock<Option<SessionConfig>>>,
}

impl OpenAIRealtime {
    pub fn model(&self) -> OpenAIRealtimeModel {
        self.model
    }

    pub fn voice(&self) -> OpenAIRealtimeVoice {
        self.voice
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    /// Handshake request; host and key headers come from the URL.
    fn build_request(url: &str, api_key: &str) -> RealtimeResult<http::Request<()>> {
        let mut request = url
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(format!("Invalid URL {url}: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| RealtimeError::AuthenticationFailed(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert("openai-beta", HeaderValue::from_static("realtime=v1"));
        headers.insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static("realtime"),
        );
        Ok(request)
    }

    fn configured_turn_detection(&self) -> TurnDetection {
        match self.config.turn_detection.clone().unwrap_or_default() {
            TurnDetectionConfig::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
                create_response,
                interrupt_response,
            } => TurnDetection::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
                create_response,
                interrupt_response,
            },
            TurnDetectionConfig::None => TurnDetection::None,
        }
    }

    /// Build the initial session configuration.
    fn build_session_config(&self) -> SessionConfig {
        SessionConfig {
            modalities: Some(
                self.config
                    .modalities
                    .clone()
                    .unwrap_or_else(|| vec!["text".to_string(), "audio".to_string()]),
            ),
            instructions: self.config.instructions.clone(),
            voice: Some(self.voice.as_str().to_string()),
            input_audio_format: Some("pcm16".to_string()),
            output_audio_format: Some("pcm16".to_string()),
            input_audio_transcription: Some(InputAudioTranscription {
                model: self
                    .config
                    .input_transcription_model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INPUT_TRANSCRIPTION_MODEL.to_string()),
            }),
            turn_detection: Some(self.configured_turn_detection()),
            temperature: self.config.temperature,
        }
    }

    async fn handle_server_event(
        event: ServerEvent,
        callbacks: &Callbacks,
        session_id: &Arc<RwLock<Option<String>>>,
    ) {
        match event {
            ServerEvent::SessionCreated { session } => {
                tracing::info!(session_id = %session.id, "OpenAI Realtime session created");
                *session_id.write().await = Some(session.id);
            }

            ServerEvent::SessionUpdated { session } => {
                tracing::debug!(
                    session_id = %session.id,
                    turn_detection = ?session.turn_detection,
                    "OpenAI Realtime session updated"
                );
            }

            ServerEvent::Error { error } => {
                // Cancelling with no response in flight is routine during handoff
                if error.code.as_deref() == Some("response_cancel_not_active") {
                    tracing::debug!("No active response to cancel");
                    return;
                }
                tracing::error!(
                    error_type = %error.error_type,
                    "OpenAI Realtime error: {}",
                    error.message
                );
                callbacks
                    .emit_error(RealtimeError::ProviderError(format!(
                        "{}: {}",
                        error.error_type, error.message
                    )))
                    .await;
            }

            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                tracing::trace!("Speech started at {}ms", audio_start_ms);
            }

            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                tracing::trace!("Speech stopped at {}ms", audio_end_ms);
            }

            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => {
                tracing::debug!("Caller transcript: {}", transcript);
                if let Some(cb) = callbacks.transcript.lock().await.as_ref() {
                    cb(TranscriptResult {
                        text: transcript,
                        role: TranscriptRole::User,
                        is_final: true,
                        item_id: Some(item_id),
                    })
                    .await;
                }
            }

            ServerEvent::TranscriptionFailed { item_id, error } => {
                tracing::warn!(item_id = %item_id, "Caller transcription failed: {}", error.message);
            }

            ServerEvent::AudioTranscriptDelta { item_id, delta } => {
                if let Some(cb) = callbacks.transcript.lock().await.as_ref() {
                    cb(TranscriptResult {
                        text: delta,
                        role: TranscriptRole::Assistant,
                        is_final: false,
                        item_id: Some(item_id),
                    })
                    .await;
                }
            }

            ServerEvent::AudioTranscriptDone {
                item_id,
                transcript,
            } => {
                tracing::debug!("Agent transcript: {}", transcript);
                if let Some(cb) = callbacks.transcript.lock().await.as_ref() {
                    cb(TranscriptResult {
                        text: transcript,
                        role: TranscriptRole::Assistant,
                        is_final: true,
                        item_id: Some(item_id),
                    })
                    .await;
                }
            }

            ServerEvent::AudioDelta { item_id, delta } => {
                if let Some(cb) = callbacks.audio.lock().await.as_ref() {
                    match ServerEvent::decode_audio(&delta) {
                        Some(audio_bytes) => {
                            cb(RealtimeAudioData {
                                data: Bytes::from(audio_bytes),
                                sample_rate: OPENAI_REALTIME_SAMPLE_RATE,
                                item_id: Some(item_id),
                            })
                            .await;
                        }
                        None => tracing::error!("Failed to decode audio delta"),
                    }
                }
            }

            ServerEvent::ResponseCreated { response } => {
                tracing::trace!(response_id = %response.id, "Response created");
            }

            ServerEvent::ResponseDone { response } => {
                tracing::debug!(
                    response_id = %response.id,
                    status = ?response.status,
                    "Response done"
                );
            }

            ServerEvent::Unknown => {
                tracing::trace!("Unhandled server event");
            }
        }
    }

    /// Send an event to the WebSocket task.
    async fn send_event(&self, event: ClientEvent) -> RealtimeResult<()> {
        if let Some(sender) = self.ws_sender.lock().await.as_ref() {
            sender
                .send(event)
                .await
                .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
        } else {
            Err(RealtimeError::NotConnected)
        }
    }

    async fn send_session_update(&self, session: SessionConfig) -> RealtimeResult<()> {
        *self.last_session_config.write().await = Some(session.clone());
        self.send_event(ClientEvent::SessionUpdate { session }).await
    }
}

#[async_trait]
impl BaseRealtime for OpenAIRealtime {
    fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let model = OpenAIRealtimeModel::from_str_or_default(&config.model);
        let voice = config
            .voice
            .as_deref()
            .map(OpenAIRealtimeVoice::from_str_or_default)
            .unwrap_or_default();
        let reconnection_config = config.reconnection.clone().unwrap_or_default();

        Ok(Self {
            config,
            model,
            voice,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connected: Arc::new(AtomicBool::new(false)),
            session_id: Arc::new(RwLock::new(None)),
            ws_sender: Arc::new(Mutex::new(None)),
            callbacks: Callbacks::default(),
            connection_handle: Arc::new(Mutex::new(None)),
            reconnection_config,
            intentional_disconnect: Arc::new(AtomicBool::new(false)),
            last_session_config: Arc::new(RwLock::new(None)),
        })
    }

    async fn connect(&mut self) -> RealtimeResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.intentional_disconnect.store(false, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Connecting;

        let endpoint = self
            .config
            .endpoint
            .as_deref()
            .unwrap_or(OPENAI_REALTIME_URL);
        let url = realtime_url(endpoint, self.model);
        let request = match Self::build_request(&url, &self.config.api_key) {
            Ok(request) => request,
            Err(e) => {
                *self.state.write().await = ConnectionState::Failed;
                return Err(e);
            }
        };

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(ok) => ok,
            Err(e) => {
                *self.state.write().await = ConnectionState::Failed;
                return Err(RealtimeError::ConnectionFailed(e.to_string()));
            }
        };

        tracing::info!(model = %self.model, "Connected to OpenAI Realtime API");

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);

        let callbacks = self.callbacks.clone();
        let session_id = self.session_id.clone();
        let state = self.state.clone();
        let ws_sender = self.ws_sender.clone();
        let connected = self.connected.clone();
        let reconnection_config = self.reconnection_config.clone();
        let intentional_disconnect = self.intentional_disconnect.clone();
        let api_key = self.config.api_key.clone();
        let last_session_config = self.last_session_config.clone();

        self.connected.store(true, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Connected;

        let handle = tokio::spawn(async move {
            let mut ws_sink = ws_sink;
            let mut ws_stream = ws_stream;
            let mut reconnect_attempt: u32 = 0;

            'outer: loop {
                loop {
                    tokio::select! {
                        Some(event) = rx.recv() => {
                            let json = match serde_json::to_string(&event) {
                                Ok(j) => j,
                                Err(e) => {
                                    tracing::error!("Failed to serialize event: {}", e);
                                    continue;
                                }
                            };
                            if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                                tracing::error!("Failed to send WebSocket message: {}", e);
                                break;
                            }
                        }

                        msg = ws_stream.next() => {
                            let Some(msg) = msg else {
                                tracing::info!("WebSocket stream ended");
                                break;
                            };
                            match msg {
                                Ok(Message::Text(text)) => {
                                    reconnect_attempt = 0;
                                    match serde_json::from_str::<ServerEvent>(&text) {
                                        Ok(event) => {
                                            Self::handle_server_event(event, &callbacks, &session_id).await;
                                        }
                                        Err(e) => {
                                            tracing::warn!("Failed to parse server event: {} - {}", e, text);
                                        }
                                    }
                                }
                                Ok(Message::Close(_)) => {
                                    tracing::info!("WebSocket closed by server");
                                    break;
                                }
                                Ok(Message::Ping(data)) => {
                                    if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                        tracing::error!("Failed to send pong: {}", e);
                                    }
                                }
                                Err(e) => {
                                    tracing::error!("WebSocket error: {}", e);
                                    break;
                                }
                                _ => {}
                            }
                        }

                        else => break,
                    }
                }

                connected.store(false, Ordering::SeqCst);

                if intentional_disconnect.load(Ordering::SeqCst) {
                    *state.write().await = ConnectionState::Disconnected;
                    break 'outer;
                }

                if !reconnection_config.should_retry(reconnect_attempt) {
                    tracing::warn!(
                        max_attempts = reconnection_config.max_attempts,
                        "Realtime connection lost and reconnection exhausted"
                    );
                    callbacks
                        .emit_error(RealtimeError::ConnectionFailed(format!(
                            "Connection lost after {reconnect_attempt} reconnection attempts"
                        )))
                        .await;
                    *state.write().await = ConnectionState::Failed;
                    break 'outer;
                }

                reconnect_attempt += 1;
                *state.write().await = ConnectionState::Reconnecting;

                let delay_ms = reconnection_config.calculate_delay(reconnect_attempt);
                tracing::info!(
                    attempt = reconnect_attempt,
                    delay_ms,
                    "Reconnecting to OpenAI Realtime API"
                );
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;

                if intentional_disconnect.load(Ordering::SeqCst) {
                    *state.write().await = ConnectionState::Disconnected;
                    break 'outer;
                }

                let request = match Self::build_request(&url, &api_key) {
                    Ok(req) => req,
                    Err(e) => {
                        tracing::error!("Failed to build reconnection request: {}", e);
                        continue;
                    }
                };

                match tokio_tungstenite::connect_async(request).await {
                    Ok((new_ws_stream, _)) => {
                        tracing::info!("Reconnected to OpenAI Realtime API");
                        let (new_sink, new_stream) = new_ws_stream.split();
                        ws_sink = new_sink;
                        ws_stream = new_stream;

                        connected.store(true, Ordering::SeqCst);
                        *state.write().await = ConnectionState::Connected;
                        *session_id.write().await = None;

                        if let Some(saved) = last_session_config.read().await.clone() {
                            let event = ClientEvent::SessionUpdate { session: saved };
                            if let Ok(json) = serde_json::to_string(&event)
                                && let Err(e) = ws_sink.send(Message::Text(json.into())).await
                            {
                                tracing::error!("Failed to restore session after reconnection: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(attempt = reconnect_attempt, "Reconnection failed: {}", e);
                        continue;
                    }
                }
            }

            *ws_sender.lock().await = None;
            tracing::info!("OpenAI Realtime connection task ended");
        });

        *self.connection_handle.lock().await = Some(handle);

        let session_config = self.build_session_config();
        self.send_session_update(session_config).await
    }

    async fn disconnect(&mut self) -> RealtimeResult<()> {
        self.intentional_disconnect.store(true, Ordering::SeqCst);
        *self.ws_sender.lock().await = None;

        if let Some(handle) = self.connection_handle.lock().await.take() {
            handle.abort();
        }

        self.connected.store(false, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Disconnected;
        *self.session_id.write().await = None;

        tracing::info!("Disconnected from OpenAI Realtime API");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_connection_state(&self) -> ConnectionState {
        self.state
            .try_read()
            .map(|s| *s)
            .unwrap_or(if self.is_ready() {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            })
    }

    fn sample_rate(&self) -> u32 {
        OPENAI_REALTIME_SAMPLE_RATE
    }

    async fn send_audio(&mut self, audio_data: Bytes) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::audio_append(&audio_data)).await
    }

    async fn say(&mut self, text: &str) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::ResponseCreate {
            response: Some(ResponseConfig {
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                instructions: Some(verbatim_instruction(text)),
            }),
        })
        .await
    }

    async fn cancel_response(&mut self) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }
        self.send_event(ClientEvent::ResponseCancel).await
    }

    async fn set_auto_respond(&mut self, enabled: bool) -> RealtimeResult<()> {
        if !self.is_ready() {
            return Err(RealtimeError::NotConnected);
        }

        let turn_detection = if enabled {
            self.configured_turn_detection()
        } else {
            TurnDetection::None
        };

        {
            let mut saved = self.last_session_config.write().await;
            if let Some(session) = saved.as_mut() {
                session.turn_detection = Some(turn_detection.clone());
            }
        }

        self.send_event(ClientEvent::turn_detection_update(turn_detection))
            .await?;
        if !enabled {
            // Drop whatever caller audio was buffered for the next turn
            self.send_event(ClientEvent::InputAudioBufferClear).await?;
        }
        Ok(())
    }

    fn on_transcript(&mut self, callback: TranscriptCallback) -> RealtimeResult<()> {
        register(&self.callbacks.transcript, callback);
        Ok(())
    }

    fn on_audio(&mut self, callback: AudioOutputCallback) -> RealtimeResult<()> {
        register(&self.callbacks.audio, callback);
        Ok(())
    }

    fn on_error(&mut self, callback: RealtimeErrorCallback) -> RealtimeResult<()> {
        register(&self.callbacks.error, callback);
        Ok(())
    }

    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "openai",
            "api_type": "WebSocket Realtime",
            "endpoint": self.config.endpoint.as_deref().unwrap_or(OPENAI_REALTIME_URL),
            "model": self.model.as_str(),
            "voice": self.voice.as_str(),
            "sample_rate": OPENAI_REALTIME_SAMPLE_RATE,
            "features": {
                "verbatim_speech": true,
                "turn_detection_toggle": true,
                "caller_transcription": true
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    fn config() -> RealtimeConfig {
        RealtimeConfig {
            api_key: "sk-test".to_string(),
            model: "gpt-4o-realtime-preview-2024-12-17".to_string(),
            voice: Some("alloy".to_string()),
            instructions: Some("Be brief".to_string()),
            temperature: Some(0.8),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = OpenAIRealtime::new(RealtimeConfig::default());
        assert!(matches!(result, Err(RealtimeError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_session_config_defaults() {
        let client = OpenAIRealtime::new(config()).unwrap();
        let session = client.build_session_config();

        assert_eq!(session.voice.as_deref(), Some("alloy"));
        assert_eq!(session.temperature, Some(0.8));
        assert_eq!(session.modalities, Some(vec!["text".into(), "audio".into()]));
        assert_eq!(
            session.input_audio_transcription.map(|t| t.model),
            Some("whisper-1".to_string())
        );
        match session.turn_detection {
            Some(TurnDetection::ServerVad {
                threshold,
                silence_duration_ms,
                ..
            }) => {
                assert_eq!(threshold, Some(0.5));
                assert_eq!(silence_duration_ms, Some(500));
            }
            other => panic!("unexpected turn detection {other:?}"),
        }
    }

    #[test]
    fn test_not_ready_before_connect() {
        let client = OpenAIRealtime::new(config()).unwrap();
        assert!(!client.is_ready());
        assert_eq!(client.get_connection_state(), ConnectionState::Disconnected);
        assert_eq!(client.sample_rate(), 24000);
    }

    #[tokio::test]
    async fn test_controls_require_connection() {
        let mut client = OpenAIRealtime::new(config()).unwrap();
        assert!(matches!(client.say("hi").await, Err(RealtimeError::NotConnected)));
        assert!(matches!(
            client.set_auto_respond(false).await,
            Err(RealtimeError::NotConnected)
        ));
        assert!(matches!(
            client.send_audio(Bytes::from_static(&[0, 0])).await,
            Err(RealtimeError::NotConnected)
        ));
    }

    /// Accept one socket, agreeing to the `realtime` subprotocol.
    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_hdr_async(stream, |_: &Request, mut response: Response| {
            response.headers_mut().insert(
                header::SEC_WEBSOCKET_PROTOCOL,
                HeaderValue::from_static("realtime"),
            );
            Ok::<_, ErrorResponse>(response)
        })
        .await
        .unwrap()
    }

    async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> serde_json::Value {
        loop {
            if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_reconnect_restores_paused_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = OpenAIRealtime::new(RealtimeConfig {
            endpoint: Some(format!("ws://{addr}/v1/realtime")),
            reconnection: Some(ReconnectionConfig {
                initial_delay_ms: 10,
                jitter: false,
                ..Default::default()
            }),
            ..config()
        })
        .unwrap();

        let (connected, mut first) = tokio::join!(client.connect(), accept(&listener));
        connected.unwrap();
        let initial = next_json(&mut first).await;
        assert_eq!(initial["type"], "session.update");
        assert_eq!(initial["session"]["turn_detection"]["type"], "server_vad");

        client.set_auto_respond(false).await.unwrap();
        let paused = next_json(&mut first).await;
        assert_eq!(paused["session"]["turn_detection"]["type"], "none");

        // Server goes away mid-transfer
        first.close(None).await.unwrap();
        drop(first);

        let mut second = tokio::time::timeout(std::time::Duration::from_secs(5), accept(&listener))
            .await
            .expect("client did not reconnect");
        let restored = next_json(&mut second).await;
        assert_eq!(restored["type"], "session.update");
        assert_eq!(restored["session"]["turn_detection"]["type"], "none");
        assert_eq!(restored["session"]["instructions"], "Be brief");
        assert_eq!(restored["session"]["voice"], "alloy");

        client.disconnect().await.unwrap();
    }

    #[test]
    fn test_build_request_takes_host_from_url() {
        let request =
            OpenAIRealtime::build_request("ws://127.0.0.1:9000/v1/realtime?model=m", "sk-test")
                .unwrap();
        let headers = request.headers();
        assert_eq!(headers[header::HOST], "127.0.0.1:9000");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer sk-test");
        assert_eq!(headers[header::SEC_WEBSOCKET_PROTOCOL], "realtime");
        assert_eq!(headers["openai-beta"], "realtime=v1");
    }

    #[tokio::test]
    async fn test_transcript_callback_receives_caller_text() {
        let callbacks = Callbacks::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        register(
            &callbacks.transcript,
            Arc::new(move |t: TranscriptResult| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(t);
                }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
            }) as TranscriptCallback,
        );
        let session_id = Arc::new(RwLock::new(None));

        let event = ServerEvent::TranscriptionCompleted {
            item_id: "item_1".into(),
            transcript: "connect me to an agent".into(),
        };
        OpenAIRealtime::handle_server_event(event, &callbacks, &session_id).await;

        let transcript = rx.recv().await.unwrap();
        assert_eq!(transcript.role, TranscriptRole::User);
        assert!(transcript.is_final);
        assert_eq!(transcript.text, "connect me to an agent");
    }
}

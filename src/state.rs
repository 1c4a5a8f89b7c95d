use std::sync::Arc;

use livekit_api::access_token::TokenVerifier;
use livekit_api::webhooks::WebhookReceiver;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::call::CallRegistry;
use crate::livekit::{CallLauncher, LiveKitLauncher};

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    /// Live calls by room name
    pub calls: CallRegistry,
    /// Absent when LiveKit credentials are not configured
    pub launcher: Option<Arc<dyn CallLauncher>>,
    /// Verifies signed LiveKit webhook deliveries
    pub webhooks: Option<WebhookReceiver>,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let calls = CallRegistry::new();
        let launcher: Option<Arc<dyn CallLauncher>> =
            match LiveKitLauncher::new(&config, calls.clone()) {
                Ok(Some(launcher)) => {
                    info!(url = %config.livekit.url, "LiveKit call launcher ready");
                    Some(Arc::new(launcher))
                }
                Ok(None) => {
                    warn!("LiveKit credentials not configured, calls cannot be dispatched");
                    None
                }
                Err(e) => {
                    warn!("Failed to initialize LiveKit launcher: {}", e);
                    None
                }
            };

        Self::with_launcher(config, calls, launcher)
    }

    /// Build state around an existing registry and launcher.
    pub fn with_launcher(
        config: ServerConfig,
        calls: CallRegistry,
        launcher: Option<Arc<dyn CallLauncher>>,
    ) -> Arc<Self> {
        let webhooks = match (&config.livekit.api_key, &config.livekit.api_secret) {
            (Some(key), Some(secret)) => Some(WebhookReceiver::new(TokenVerifier::with_api_key(
                key, secret,
            ))),
            _ => None,
        };

        Arc::new(Self {
            config,
            calls,
            launcher,
            webhooks,
        })
    }
}

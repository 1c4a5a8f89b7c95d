//! Access tokens for the agent participant.

use std::time::Duration;

use livekit_api::access_token::{AccessToken, AccessTokenError, VideoGrants};
use zeroize::Zeroize;

use crate::config::LiveKitConfig;

/// Lifetime of tokens minted for a single call.
const TOKEN_TTL: Duration = Duration::from_secs(6 * 60 * 60);

pub struct TokenFactory {
    api_key: String,
    api_secret: String,
}

impl TokenFactory {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// `None` when the API key or secret is missing.
    pub fn from_config(config: &LiveKitConfig) -> Option<Self> {
        match (config.api_key.as_deref(), config.api_secret.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(Self::new(key, secret))
            }
            _ => None,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Join token for the voice agent: it publishes audio and hears everyone.
    pub fn agent_token(
        &self,
        room_name: &str,
        identity: &str,
        name: &str,
    ) -> Result<String, AccessTokenError> {
        AccessToken::with_api_key(&self.api_key, &self.api_secret)
            .with_identity(identity)
            .with_name(name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(TOKEN_TTL)
            .to_jwt()
    }
}

impl Drop for TokenFactory {
    fn drop(&mut self) {
        self.api_secret.zeroize();
    }
}

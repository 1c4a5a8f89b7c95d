//! Configuration module for the callbridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use callbridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use subtle::ConstantTimeEq;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub const DEFAULT_GREETING: &str = "Welcome to Expertflow Support, let me know how I can help you?";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful voice AI assistant.";

/// API secret authentication entry with a client identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthApiSecret {
    pub id: String,
    pub secret: String,
}

/// LiveKit server connection and agent participant settings
#[derive(Debug, Clone, PartialEq)]
pub struct LiveKitConfig {
    /// WebSocket URL the agent joins rooms through
    pub url: String,
    /// HTTP(S) base for server APIs. Derived from `url` when unset.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub agent_identity: String,
    pub agent_name: String,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7880".to_string(),
            api_url: None,
            api_key: None,
            api_secret: None,
            agent_identity: "voice-agent".to_string(),
            agent_name: "Voice Bot".to_string(),
        }
    }
}

impl LiveKitConfig {
    /// HTTP base URL for Twirp and room service calls
    pub fn http_url(&self) -> String {
        if let Some(url) = self.api_url.as_deref().filter(|u| !u.is_empty()) {
            return url.trim_end_matches('/').to_string();
        }
        let url = self.url.trim_end_matches('/');
        if let Some(rest) = url.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = url.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            url.to_string()
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some() && self.api_secret.is_some()
    }
}

/// Realtime speech model selection and prompt
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    /// "openai" or "elevenlabs"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_agent_id: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub temperature: f32,
    pub instructions: String,
    pub greeting: String,
    /// WebSocket URL replacing the provider's default endpoint
    pub endpoint: Option<String>,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            openai_api_key: None,
            elevenlabs_api_key: None,
            elevenlabs_agent_id: None,
            model: None,
            voice: None,
            temperature: 0.8,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            endpoint: None,
        }
    }
}

impl RealtimeSettings {
    /// API key for the selected provider
    pub fn api_key(&self) -> Result<String, String> {
        match self.provider.to_lowercase().as_str() {
            "openai" => self
                .openai_api_key
                .clone()
                .ok_or_else(|| "OpenAI API key not configured in server environment".to_string()),
            "elevenlabs" | "eleven_labs" | "eleven-labs" | "convai" => {
                self.elevenlabs_api_key.clone().ok_or_else(|| {
                    "ElevenLabs API key not configured in server environment".to_string()
                })
            }
            other => Err(format!("Unsupported realtime provider: {other}")),
        }
    }
}

/// CRM ingestion endpoint and sender identities
#[derive(Debug, Clone, PartialEq)]
pub struct CrmConfig {
    /// Relay is disabled when unset
    pub endpoint: Option<String>,
    pub service_identifier: String,
    pub channel_type_code: String,
    pub bot_id: String,
    pub bot_name: String,
    pub connector_id: String,
    pub connector_name: String,
    pub agent_id: String,
    pub agent_name: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
    pub queue_capacity: usize,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_identifier: "682200".to_string(),
            channel_type_code: "CX_VOICE".to_string(),
            bot_id: "6540b0fc90b3913194d45525".to_string(),
            bot_name: "Voice Bot".to_string(),
            connector_id: "460df46c-adf9-11ed-afa1-0242ac120002".to_string(),
            connector_name: "WEB_CONNECTOR".to_string(),
            agent_id: "agent_live_transfer".to_string(),
            agent_name: "Live Agent".to_string(),
            max_attempts: 3,
            retry_delay_ms: 1000,
            timeout_seconds: 10,
            queue_capacity: 64,
        }
    }
}

/// Transfer to a human agent
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffConfig {
    /// Transfers are refused while unset
    pub sip_trunk_id: Option<String>,
    pub transfer_extension: String,
    pub human_agent_name: String,
    pub human_agent_identity_prefix: String,
    pub customer_identity_prefix: String,
    pub transfer_keywords: Vec<String>,
    /// 0 means unlimited
    pub max_transfer_attempts: u32,
    pub handoff_delay_ms: u64,
    pub play_dialtone: bool,
    /// JSON attached to the human agent participant
    pub participant_metadata: String,
    pub transfer_announcement: String,
    pub transfer_initiated_message: String,
    pub transfer_failed_message: String,
    /// Fixed customer id, for test rooms
    pub customer_id_override: Option<String>,
    /// Join rooms automatically when a caller appears (webhook)
    pub auto_dispatch: bool,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            sip_trunk_id: None,
            transfer_extension: "99900".to_string(),
            human_agent_name: "Human Agent".to_string(),
            human_agent_identity_prefix: "human-agent".to_string(),
            customer_identity_prefix: "sip_".to_string(),
            transfer_keywords: crate::core::handoff::DEFAULT_TRANSFER_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            max_transfer_attempts: 3,
            handoff_delay_ms: 500,
            play_dialtone: false,
            participant_metadata: r#"{"reason": "customer_request"}"#.to_string(),
            transfer_announcement: "Connecting you to live agent...".to_string(),
            transfer_initiated_message: "Transfer initiated".to_string(),
            transfer_failed_message: "Transfer failed.".to_string(),
            customer_id_override: None,
            auto_dispatch: true,
        }
    }
}

impl HandoffConfig {
    pub fn identity_prefixes(&self) -> crate::core::handoff::IdentityPrefixes {
        crate::core::handoff::IdentityPrefixes {
            customer: self.customer_identity_prefix.clone(),
            human_agent: self.human_agent_identity_prefix.clone(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    pub livekit: LiveKitConfig,
    pub realtime: RealtimeSettings,
    pub crm: CrmConfig,
    pub handoff: HandoffConfig,

    // Authentication
    pub auth_required: bool,
    pub auth_api_secrets: Vec<AuthApiSecret>,

    // Security
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Default: 10
    pub rate_limit_burst_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            livekit: LiveKitConfig::default(),
            realtime: RealtimeSettings::default(),
            crm: CrmConfig::default(),
            handoff: HandoffConfig::default(),
            auth_required: false,
            auth_api_secrets: Vec::new(),
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
        }
    }
}

/// Zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.livekit.api_key {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.livekit.api_secret {
            secret.zeroize();
        }
        if let Some(ref mut key) = self.realtime.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.realtime.elevenlabs_api_key {
            key.zeroize();
        }
        for secret in &mut self.auth_api_secrets {
            secret.secret.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded into the environment by main before this runs
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_auth_api_secrets(&self.auth_api_secrets)?;
        validation::validate_auth_required(self.auth_required, &self.auth_api_secrets)?;
        validation::validate_realtime(&self.realtime)?;
        validation::validate_crm(&self.crm)?;
        validation::validate_handoff(&self.handoff)?;
        Ok(())
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if API secret authentication is configured
    pub fn has_api_secret_auth(&self) -> bool {
        !self.auth_api_secrets.is_empty()
    }

    /// Find the API secret identifier that matches a bearer token
    ///
    /// Comparison is constant-time per entry.
    pub fn find_api_secret_id(&self, token: &str) -> Option<&str> {
        self.auth_api_secrets
            .iter()
            .find(|entry| bool::from(entry.secret.as_bytes().ct_eq(token.as_bytes())))
            .map(|entry| entry.id.as_str())
    }
}

pub(crate) fn parse_auth_api_secrets_json(
    json_str: &str,
) -> Result<Vec<AuthApiSecret>, Box<dyn std::error::Error>> {
    #[derive(serde::Deserialize)]
    struct AuthApiSecretJson {
        id: String,
        secret: String,
    }

    let secrets: Vec<AuthApiSecretJson> = serde_json::from_str(json_str)
        .map_err(|e| format!("Invalid AUTH_API_SECRETS_JSON format: {e}"))?;

    Ok(secrets
        .into_iter()
        .map(|entry| AuthApiSecret {
            id: entry.id,
            secret: entry.secret,
        })
        .collect())
}

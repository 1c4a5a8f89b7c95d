use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///
/// livekit:
///   url: "wss://livekit.example.com"
///   api_key: "your-api-key"
///   api_secret: "your-api-secret"
///   agent_identity: "voice-agent"
///
/// providers:
///   openai_api_key: "sk-..."
///   elevenlabs_api_key: "xi-..."
///
/// realtime:
///   provider: "openai"
///   model: "gpt-4o-realtime-preview-2024-12-17"
///   voice: "alloy"
///   greeting: "Welcome to Expertflow Support, let me know how I can help you?"
///
/// crm:
///   endpoint: "https://crm.example.com/ccm/message/receive"
///   max_attempts: 3
///   retry_delay_ms: 1000
///
/// handoff:
///   sip_trunk_id: "ST_W7jqvDFA2VgG"
///   transfer_extension: "99900"
///   transfer_keywords: ["transfer", "human", "live agent"]
///
/// auth:
///   required: true
///   api_secrets:
///     - id: "ops"
///       secret: "your-api-secret"
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 60
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub livekit: Option<LiveKitYaml>,
    pub providers: Option<ProvidersYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub crm: Option<CrmYaml>,
    pub handoff: Option<HandoffYaml>,
    pub auth: Option<AuthYaml>,
    pub security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LiveKitYaml {
    pub url: Option<String>,
    /// HTTP(S) base for the server API; derived from `url` when absent
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub agent_identity: Option<String>,
    pub agent_name: Option<String>,
}

/// Provider API keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub openai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    /// ElevenLabs Conversational AI agent id
    pub elevenlabs_agent_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub temperature: Option<f32>,
    pub instructions: Option<String>,
    pub greeting: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CrmYaml {
    pub endpoint: Option<String>,
    pub service_identifier: Option<String>,
    pub channel_type_code: Option<String>,
    pub bot_id: Option<String>,
    pub bot_name: Option<String>,
    pub connector_id: Option<String>,
    pub connector_name: Option<String>,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HandoffYaml {
    pub sip_trunk_id: Option<String>,
    pub transfer_extension: Option<String>,
    pub human_agent_name: Option<String>,
    pub human_agent_identity_prefix: Option<String>,
    pub customer_identity_prefix: Option<String>,
    /// Replaces the default keyword list when present
    pub transfer_keywords: Option<Vec<String>>,
    pub max_transfer_attempts: Option<u32>,
    pub handoff_delay_ms: Option<u64>,
    pub play_dialtone: Option<bool>,
    pub participant_metadata: Option<String>,
    pub transfer_announcement: Option<String>,
    pub transfer_initiated_message: Option<String>,
    pub transfer_failed_message: Option<String>,
    pub customer_id_override: Option<String>,
    pub auto_dispatch: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub required: Option<bool>,
    /// Preferred multi-secret form. If non-empty, it takes precedence over api_secret.
    #[serde(default)]
    pub api_secrets: Vec<AuthApiSecretYaml>,
    /// Legacy single-secret alias. Ignored when api_secrets is non-empty.
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthApiSecretYaml {
    pub id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

livekit:
  url: "wss://lk.example.com"
  api_key: "lk-key"
  api_secret: "lk-secret"
  agent_identity: "voice-bot"

providers:
  openai_api_key: "sk-test"
  elevenlabs_agent_id: "agent_123"

realtime:
  provider: "elevenlabs"
  temperature: 0.6

crm:
  endpoint: "https://crm.example.com/receive"
  max_attempts: 5
  retry_delay_ms: 250

handoff:
  sip_trunk_id: "ST_1"
  transfer_extension: "1000"
  transfer_keywords: ["supervisor", "real person"]
  max_transfer_attempts: 2

auth:
  required: true
  api_secrets:
    - id: "ops"
      secret: "s3cret"

security:
  cors_allowed_origins: "https://console.example.com"
  rate_limit_requests_per_second: 20
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));

        let livekit = config.livekit.as_ref().unwrap();
        assert_eq!(livekit.agent_identity.as_deref(), Some("voice-bot"));
        assert!(livekit.api_url.is_none());

        let providers = config.providers.as_ref().unwrap();
        assert_eq!(providers.elevenlabs_agent_id.as_deref(), Some("agent_123"));

        let realtime = config.realtime.as_ref().unwrap();
        assert_eq!(realtime.provider.as_deref(), Some("elevenlabs"));
        assert_eq!(realtime.temperature, Some(0.6));

        let crm = config.crm.as_ref().unwrap();
        assert_eq!(crm.max_attempts, Some(5));
        assert_eq!(crm.retry_delay_ms, Some(250));

        let handoff = config.handoff.as_ref().unwrap();
        assert_eq!(
            handoff.transfer_keywords.as_deref(),
            Some(&["supervisor".to_string(), "real person".to_string()][..])
        );
        assert_eq!(handoff.max_transfer_attempts, Some(2));

        let auth = config.auth.as_ref().unwrap();
        assert_eq!(auth.required, Some(true));
        assert_eq!(auth.api_secrets.len(), 1);
        assert_eq!(auth.api_secrets[0].id, "ops");

        let security = config.security.as_ref().unwrap();
        assert_eq!(security.rate_limit_requests_per_second, Some(20));
    }

    #[test]
    fn test_yaml_config_auth_legacy_api_secret() {
        let yaml = r#"
auth:
  api_secret: "legacy-secret"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let auth = config.auth.as_ref().unwrap();
        assert!(auth.api_secrets.is_empty());
        assert_eq!(auth.api_secret.as_deref(), Some("legacy-secret"));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("").unwrap();

        assert!(config.server.is_none());
        assert!(config.livekit.is_none());
        assert!(config.crm.is_none());
        assert!(config.handoff.is_none());
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");
        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}

use super::utils::{env_var, parse_env, parse_env_bool, parse_list};
use super::{AuthApiSecret, ServerConfig, parse_auth_api_secrets_json};

/// Every environment variable the server reads
pub(crate) const ENV_KEYS: &[&str] = &[
    "HOST",
    "PORT",
    "LIVEKIT_URL",
    "LIVEKIT_API_URL",
    "LIVEKIT_API_KEY",
    "LIVEKIT_API_SECRET",
    "LIVEKIT_AGENT_IDENTITY",
    "LIVEKIT_AGENT_NAME",
    "OPENAI_API_KEY",
    "ELEVENLABS_API_KEY",
    "ELEVENLABS_AGENT_ID",
    "REALTIME_PROVIDER",
    "REALTIME_MODEL",
    "REALTIME_VOICE",
    "REALTIME_TEMPERATURE",
    "REALTIME_INSTRUCTIONS",
    "GREETING_MESSAGE",
    "REALTIME_ENDPOINT",
    "CRM_ENDPOINT",
    "CRM_SERVICE_IDENTIFIER",
    "CRM_CHANNEL_TYPE_CODE",
    "CRM_BOT_ID",
    "CRM_BOT_NAME",
    "CRM_CONNECTOR_ID",
    "CRM_CONNECTOR_NAME",
    "CRM_AGENT_ID",
    "CRM_AGENT_NAME",
    "CRM_MAX_ATTEMPTS",
    "CRM_RETRY_DELAY_MS",
    "CRM_TIMEOUT_SECONDS",
    "CRM_QUEUE_CAPACITY",
    "SIP_TRUNK_ID",
    "TRANSFER_EXTENSION",
    "HUMAN_AGENT_NAME",
    "HUMAN_AGENT_IDENTITY_PREFIX",
    "CUSTOMER_IDENTITY_PREFIX",
    "TRANSFER_KEYWORDS",
    "MAX_TRANSFER_ATTEMPTS",
    "HANDOFF_DELAY_MS",
    "PLAY_DIALTONE",
    "HUMAN_AGENT_METADATA",
    "TRANSFER_ANNOUNCEMENT",
    "TRANSFER_INITIATED_MESSAGE",
    "TRANSFER_FAILED_MESSAGE",
    "CUSTOMER_ID_OVERRIDE",
    "AUTO_DISPATCH",
    "AUTH_REQUIRED",
    "AUTH_API_SECRETS_JSON",
    "AUTH_API_SECRET",
    "AUTH_API_SECRET_ID",
    "CORS_ALLOWED_ORIGINS",
    "RATE_LIMIT_REQUESTS_PER_SECOND",
    "RATE_LIMIT_BURST_SIZE",
];

macro_rules! set_string {
    ($target:expr, $name:literal) => {
        if let Some(value) = env_var($name) {
            $target = value;
        }
    };
}

macro_rules! set_option {
    ($target:expr, $name:literal) => {
        if let Some(value) = env_var($name) {
            $target = Some(value);
        }
    };
}

macro_rules! set_parsed {
    ($target:expr, $name:literal) => {
        if let Some(value) = parse_env($name)? {
            $target = value;
        }
    };
}

/// Overlay environment variables on top of `config`
pub(super) fn apply_env(config: &mut ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    set_string!(config.host, "HOST");
    set_parsed!(config.port, "PORT");

    let livekit = &mut config.livekit;
    set_string!(livekit.url, "LIVEKIT_URL");
    set_option!(livekit.api_url, "LIVEKIT_API_URL");
    set_option!(livekit.api_key, "LIVEKIT_API_KEY");
    set_option!(livekit.api_secret, "LIVEKIT_API_SECRET");
    set_string!(livekit.agent_identity, "LIVEKIT_AGENT_IDENTITY");
    set_string!(livekit.agent_name, "LIVEKIT_AGENT_NAME");

    let realtime = &mut config.realtime;
    set_option!(realtime.openai_api_key, "OPENAI_API_KEY");
    set_option!(realtime.elevenlabs_api_key, "ELEVENLABS_API_KEY");
    set_option!(realtime.elevenlabs_agent_id, "ELEVENLABS_AGENT_ID");
    set_string!(realtime.provider, "REALTIME_PROVIDER");
    set_option!(realtime.model, "REALTIME_MODEL");
    set_option!(realtime.voice, "REALTIME_VOICE");
    set_parsed!(realtime.temperature, "REALTIME_TEMPERATURE");
    set_string!(realtime.instructions, "REALTIME_INSTRUCTIONS");
    set_string!(realtime.greeting, "GREETING_MESSAGE");
    set_option!(realtime.endpoint, "REALTIME_ENDPOINT");

    let crm = &mut config.crm;
    set_option!(crm.endpoint, "CRM_ENDPOINT");
    set_string!(crm.service_identifier, "CRM_SERVICE_IDENTIFIER");
    set_string!(crm.channel_type_code, "CRM_CHANNEL_TYPE_CODE");
    set_string!(crm.bot_id, "CRM_BOT_ID");
    set_string!(crm.bot_name, "CRM_BOT_NAME");
    set_string!(crm.connector_id, "CRM_CONNECTOR_ID");
    set_string!(crm.connector_name, "CRM_CONNECTOR_NAME");
    set_string!(crm.agent_id, "CRM_AGENT_ID");
    set_string!(crm.agent_name, "CRM_AGENT_NAME");
    set_parsed!(crm.max_attempts, "CRM_MAX_ATTEMPTS");
    set_parsed!(crm.retry_delay_ms, "CRM_RETRY_DELAY_MS");
    set_parsed!(crm.timeout_seconds, "CRM_TIMEOUT_SECONDS");
    set_parsed!(crm.queue_capacity, "CRM_QUEUE_CAPACITY");

    let handoff = &mut config.handoff;
    set_option!(handoff.sip_trunk_id, "SIP_TRUNK_ID");
    set_string!(handoff.transfer_extension, "TRANSFER_EXTENSION");
    set_string!(handoff.human_agent_name, "HUMAN_AGENT_NAME");
    set_string!(handoff.human_agent_identity_prefix, "HUMAN_AGENT_IDENTITY_PREFIX");
    set_string!(handoff.customer_identity_prefix, "CUSTOMER_IDENTITY_PREFIX");
    if let Some(raw) = env_var("TRANSFER_KEYWORDS") {
        handoff.transfer_keywords = parse_list(&raw);
    }
    set_parsed!(handoff.max_transfer_attempts, "MAX_TRANSFER_ATTEMPTS");
    set_parsed!(handoff.handoff_delay_ms, "HANDOFF_DELAY_MS");
    if let Some(flag) = parse_env_bool("PLAY_DIALTONE")? {
        handoff.play_dialtone = flag;
    }
    set_string!(handoff.participant_metadata, "HUMAN_AGENT_METADATA");
    set_string!(handoff.transfer_announcement, "TRANSFER_ANNOUNCEMENT");
    set_string!(handoff.transfer_initiated_message, "TRANSFER_INITIATED_MESSAGE");
    set_string!(handoff.transfer_failed_message, "TRANSFER_FAILED_MESSAGE");
    set_option!(handoff.customer_id_override, "CUSTOMER_ID_OVERRIDE");
    if let Some(flag) = parse_env_bool("AUTO_DISPATCH")? {
        handoff.auto_dispatch = flag;
    }

    if let Some(flag) = parse_env_bool("AUTH_REQUIRED")? {
        config.auth_required = flag;
    }
    config.auth_api_secrets = load_auth_api_secrets()?;

    set_option!(config.cors_allowed_origins, "CORS_ALLOWED_ORIGINS");
    set_parsed!(config.rate_limit_requests_per_second, "RATE_LIMIT_REQUESTS_PER_SECOND");
    set_parsed!(config.rate_limit_burst_size, "RATE_LIMIT_BURST_SIZE");

    Ok(())
}

/// AUTH_API_SECRETS_JSON wins over the legacy AUTH_API_SECRET pair
fn load_auth_api_secrets() -> Result<Vec<AuthApiSecret>, Box<dyn std::error::Error>> {
    if let Some(json) = env_var("AUTH_API_SECRETS_JSON") {
        return parse_auth_api_secrets_json(&json);
    }
    Ok(env_var("AUTH_API_SECRET")
        .map(|secret| {
            vec![AuthApiSecret {
                id: env_var("AUTH_API_SECRET_ID").unwrap_or_else(|| "default".to_string()),
                secret,
            }]
        })
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            for key in ENV_KEYS {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_legacy_auth_secret() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("AUTH_API_SECRET", "legacy");
        }

        let mut config = ServerConfig::default();
        apply_env(&mut config).unwrap();

        assert_eq!(config.auth_api_secrets.len(), 1);
        assert_eq!(config.auth_api_secrets[0].id, "default");
        assert_eq!(config.find_api_secret_id("legacy"), Some("default"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_auth_secrets_json_wins_over_legacy() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("AUTH_API_SECRET", "legacy");
            std::env::set_var("AUTH_API_SECRETS_JSON", r#"[{"id":"ops","secret":"new"}]"#);
        }

        let mut config = ServerConfig::default();
        apply_env(&mut config).unwrap();

        assert_eq!(config.find_api_secret_id("new"), Some("ops"));
        assert_eq!(config.find_api_secret_id("legacy"), None);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_boolean() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("PLAY_DIALTONE", "sometimes");
        }

        let mut config = ServerConfig::default();
        let err = apply_env(&mut config).unwrap_err();
        assert!(err.to_string().contains("PLAY_DIALTONE"));

        cleanup_env_vars();
    }
}

use super::{AuthApiSecret, CrmConfig, HandoffConfig, RealtimeSettings};
use crate::core::realtime::RealtimeProvider;

/// Validate that each API secret entry has a non-empty id and secret
pub(super) fn validate_auth_api_secrets(
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    for (index, entry) in secrets.iter().enumerate() {
        if entry.id.trim().is_empty() {
            return Err(format!("Auth API secret at index {index} has an empty id").into());
        }
        if entry.secret.trim().is_empty() {
            return Err(format!("Auth API secret '{}' has an empty secret", entry.id).into());
        }
    }
    Ok(())
}

/// Authentication cannot be required without any secret to check against
pub(super) fn validate_auth_required(
    auth_required: bool,
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    if auth_required && secrets.is_empty() {
        return Err(
            "AUTH_REQUIRED is true but no API secrets are configured (AUTH_API_SECRETS_JSON or AUTH_API_SECRET)"
                .into(),
        );
    }
    Ok(())
}

pub(super) fn validate_realtime(
    realtime: &RealtimeSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    RealtimeProvider::parse(&realtime.provider)
        .ok_or_else(|| format!("Unsupported realtime provider: {}", realtime.provider))?;

    if !(0.0..=2.0).contains(&realtime.temperature) {
        return Err(format!(
            "Realtime temperature must be between 0.0 and 2.0, got {}",
            realtime.temperature
        )
        .into());
    }
    if let Some(endpoint) = realtime.endpoint.as_deref() {
        let parsed = url::Url::parse(endpoint)
            .map_err(|e| format!("Invalid realtime endpoint '{endpoint}': {e}"))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(format!(
                "Realtime endpoint must use ws or wss, got '{}'",
                parsed.scheme()
            )
            .into());
        }
    }
    Ok(())
}

pub(super) fn validate_crm(crm: &CrmConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(endpoint) = crm.endpoint.as_deref() {
        let parsed = url::Url::parse(endpoint)
            .map_err(|e| format!("Invalid CRM endpoint '{endpoint}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "CRM endpoint must use http or https, got '{}'",
                parsed.scheme()
            )
            .into());
        }
    }
    if crm.max_attempts == 0 {
        return Err("CRM max_attempts must be at least 1".into());
    }
    if crm.queue_capacity == 0 {
        return Err("CRM queue_capacity must be at least 1".into());
    }
    Ok(())
}

pub(super) fn validate_handoff(handoff: &HandoffConfig) -> Result<(), Box<dyn std::error::Error>> {
    if handoff
        .transfer_keywords
        .iter()
        .all(|keyword| keyword.trim().is_empty())
    {
        return Err("At least one transfer keyword must be configured".into());
    }
    if handoff.sip_trunk_id.is_some() && handoff.transfer_extension.trim().is_empty() {
        return Err("SIP_TRUNK_ID is set but TRANSFER_EXTENSION is empty".into());
    }
    if handoff.human_agent_identity_prefix.trim().is_empty() {
        return Err("Human agent identity prefix cannot be empty".into());
    }
    serde_json::from_str::<serde_json::Value>(&handoff.participant_metadata)
        .map_err(|e| format!("Human agent participant metadata is not valid JSON: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_auth_api_secrets() {
        let ok = vec![AuthApiSecret {
            id: "ops".to_string(),
            secret: "s".to_string(),
        }];
        assert!(validate_auth_api_secrets(&ok).is_ok());

        let empty_secret = vec![AuthApiSecret {
            id: "ops".to_string(),
            secret: " ".to_string(),
        }];
        assert!(validate_auth_api_secrets(&empty_secret).is_err());
    }

    #[test]
    fn test_validate_auth_required_needs_secrets() {
        assert!(validate_auth_required(true, &[]).is_err());
        assert!(validate_auth_required(false, &[]).is_ok());
    }

    #[test]
    fn test_validate_realtime() {
        let mut realtime = RealtimeSettings::default();
        assert!(validate_realtime(&realtime).is_ok());

        realtime.temperature = 3.0;
        assert!(validate_realtime(&realtime).is_err());

        realtime.temperature = 0.8;
        realtime.provider = "nope".to_string();
        assert!(validate_realtime(&realtime).is_err());

        realtime.provider = "openai".to_string();
        realtime.endpoint = Some("ws://127.0.0.1:9000/v1/realtime".to_string());
        assert!(validate_realtime(&realtime).is_ok());
        realtime.endpoint = Some("https://api.openai.com/v1/realtime".to_string());
        assert!(validate_realtime(&realtime).is_err());
    }

    #[test]
    fn test_validate_crm() {
        let mut crm = CrmConfig::default();
        assert!(validate_crm(&crm).is_ok());

        crm.endpoint = Some("https://crm.example.com/receive".to_string());
        assert!(validate_crm(&crm).is_ok());

        crm.endpoint = Some("not a url".to_string());
        assert!(validate_crm(&crm).is_err());

        crm.endpoint = None;
        crm.max_attempts = 0;
        assert!(validate_crm(&crm).unwrap_err().to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validate_handoff() {
        let mut handoff = HandoffConfig::default();
        assert!(validate_handoff(&handoff).is_ok());

        handoff.transfer_keywords = vec![" ".to_string()];
        assert!(validate_handoff(&handoff).is_err());

        handoff = HandoffConfig {
            sip_trunk_id: Some("ST_1".to_string()),
            transfer_extension: String::new(),
            ..Default::default()
        };
        assert!(validate_handoff(&handoff).is_err());

        handoff = HandoffConfig {
            participant_metadata: "{oops".to_string(),
            ..Default::default()
        };
        assert!(validate_handoff(&handoff).is_err());
    }
}

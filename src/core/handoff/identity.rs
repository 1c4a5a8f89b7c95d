//! Participant naming conventions and caller identification.

use serde::Serialize;

/// Customer id used until the caller can be identified.
pub const UNKNOWN_CUSTOMER: &str = "unknown";

/// Identity prefixes that tell participants apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPrefixes {
    /// SIP callers join as `sip_<number>`
    pub customer: String,
    /// Human agents dialed in by a transfer join as `human-agent-<customer>`
    pub human_agent: String,
}

impl Default for IdentityPrefixes {
    fn default() -> Self {
        Self {
            customer: "sip_".to_string(),
            human_agent: "human-agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Customer,
    HumanAgent,
    Other,
}

impl ParticipantRole {
    pub fn classify(identity: &str, prefixes: &IdentityPrefixes) -> Self {
        if identity.starts_with(&prefixes.human_agent) {
            ParticipantRole::HumanAgent
        } else if identity.starts_with(&prefixes.customer) {
            ParticipantRole::Customer
        } else {
            ParticipantRole::Other
        }
    }
}

/// Strip the customer prefix from a caller identity.
pub fn customer_id_from_identity<'a>(identity: &'a str, prefixes: &IdentityPrefixes) -> &'a str {
    identity
        .strip_prefix(prefixes.customer.as_str())
        .unwrap_or(identity)
}

/// Identity used for the human agent dialed in for `customer_id`.
pub fn human_agent_identity(customer_id: &str, prefixes: &IdentityPrefixes) -> String {
    format!("{}-{}", prefixes.human_agent.trim_end_matches('-'), customer_id)
}

/// Resolve the customer id of a call.
///
/// Order: configured override, first caller participant, room metadata,
/// then [`UNKNOWN_CUSTOMER`].
pub fn resolve_customer_id<'a, I>(
    override_id: Option<&str>,
    participants: I,
    room_metadata: &str,
    prefixes: &IdentityPrefixes,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    if let Some(id) = override_id.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }

    if let Some(identity) = participants
        .into_iter()
        .find(|identity| ParticipantRole::classify(identity, prefixes) == ParticipantRole::Customer)
    {
        let id = customer_id_from_identity(identity, prefixes);
        if !id.is_empty() {
            return id.to_string();
        }
    }

    let metadata = room_metadata.trim();
    if metadata.is_empty() {
        UNKNOWN_CUSTOMER.to_string()
    } else {
        metadata.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let p = IdentityPrefixes::default();
        assert_eq!(ParticipantRole::classify("sip_923001234567", &p), ParticipantRole::Customer);
        assert_eq!(
            ParticipantRole::classify("human-agent-923001234567", &p),
            ParticipantRole::HumanAgent
        );
        assert_eq!(ParticipantRole::classify("agent-bot", &p), ParticipantRole::Other);
    }

    #[test]
    fn test_human_prefix_wins_over_customer_prefix() {
        let p = IdentityPrefixes {
            customer: "sip".to_string(),
            human_agent: "sip_human".to_string(),
        };
        assert_eq!(ParticipantRole::classify("sip_human-1", &p), ParticipantRole::HumanAgent);
    }

    #[test]
    fn test_human_agent_identity() {
        let p = IdentityPrefixes::default();
        assert_eq!(human_agent_identity("923001234567", &p), "human-agent-923001234567");
    }

    #[test]
    fn test_resolve_customer_id_order() {
        let p = IdentityPrefixes::default();
        let participants = ["agent", "sip_1234"];

        assert_eq!(resolve_customer_id(Some("test-99"), participants, "meta", &p), "test-99");
        assert_eq!(resolve_customer_id(None, participants, "meta", &p), "1234");
        assert_eq!(resolve_customer_id(Some("  "), ["agent"], " meta ", &p), "meta");
        assert_eq!(resolve_customer_id(None, [], "", &p), UNKNOWN_CUSTOMER);
    }
}

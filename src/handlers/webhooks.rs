//! LiveKit webhook receiver.

use livekit_protocol::WebhookEvent;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::bearer_token;
use crate::core::handoff::{IdentityPrefixes, ParticipantRole};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

const PARTICIPANT_JOINED: &str = "participant_joined";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub event: String,
    /// What the server did with the event
    pub action: &'static str,
}

/// `POST /livekit/webhook`
///
/// Deliveries are signed with the LiveKit API secret: the `Authorization`
/// header carries a JWT whose `sha256` claim covers the raw body.
pub async fn livekit_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> AppResult<(StatusCode, Json<WebhookResponse>)> {
    let receiver = state.webhooks.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("LiveKit credentials are not configured".to_string())
    })?;

    let auth_header = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing webhook signature".to_string()))?;
    // LiveKit sends the raw token; accept the bearer form as well
    let token = bearer_token(auth_header).unwrap_or(auth_header);

    let event = receiver.receive(&body, token).map_err(|e| {
        warn!("Rejected LiveKit webhook: {}", e);
        AppError::Unauthorized("invalid webhook signature".to_string())
    })?;

    debug!(
        event = %event.event,
        room = ?event.room.as_ref().map(|room| room.name.as_str()),
        "LiveKit webhook received"
    );

    if !state.config.handoff.auto_dispatch {
        return Ok(ignored(event.event));
    }
    let prefixes = state.config.handoff.identity_prefixes();
    let Some((room_name, identity)) = caller_joined(&event, &prefixes) else {
        return Ok(ignored(event.event));
    };
    let (room_name, identity) = (room_name.to_string(), identity.to_string());

    let Some(launcher) = state.launcher.as_ref() else {
        warn!(room = %room_name, "Caller joined but the agent cannot be dispatched");
        return Ok(ignored(event.event));
    };

    let launch = launcher.launch(&room_name).await?;
    info!(
        room = %room_name,
        identity = %identity,
        new_call = launch.is_new(),
        "Agent dispatched for caller"
    );

    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            event: event.event,
            action: if launch.is_new() {
                "dispatched"
            } else {
                "already_active"
            },
        }),
    ))
}

/// Room and identity of a caller whose arrival should bring in the agent.
fn caller_joined<'a>(
    event: &'a WebhookEvent,
    prefixes: &IdentityPrefixes,
) -> Option<(&'a str, &'a str)> {
    if event.event != PARTICIPANT_JOINED {
        return None;
    }
    let room = event.room.as_ref()?;
    let participant = event.participant.as_ref()?;
    if room.name.is_empty()
        || ParticipantRole::classify(&participant.identity, prefixes) != ParticipantRole::Customer
    {
        return None;
    }
    Some((room.name.as_str(), participant.identity.as_str()))
}

fn ignored(event: String) -> (StatusCode, Json<WebhookResponse>) {
    (
        StatusCode::OK,
        Json(WebhookResponse {
            event,
            action: "ignored",
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use livekit_protocol::{ParticipantInfo, Room};

    fn joined(room: &str, identity: &str) -> WebhookEvent {
        WebhookEvent {
            event: PARTICIPANT_JOINED.to_string(),
            room: Some(Room {
                name: room.to_string(),
                ..Default::default()
            }),
            participant: Some(ParticipantInfo {
                identity: identity.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_caller_joined() {
        let prefixes = IdentityPrefixes::default();
        let event = joined("call-42", "sip_923001234567");
        assert_eq!(
            caller_joined(&event, &prefixes),
            Some(("call-42", "sip_923001234567"))
        );
    }

    #[test]
    fn test_non_callers_are_ignored() {
        let prefixes = IdentityPrefixes::default();
        assert!(caller_joined(&joined("call-42", "human-agent-1"), &prefixes).is_none());
        assert!(caller_joined(&joined("call-42", "voice-agent"), &prefixes).is_none());
        assert!(caller_joined(&joined("", "sip_1"), &prefixes).is_none());

        let mut left = joined("call-42", "sip_1");
        left.event = "participant_left".to_string();
        assert!(caller_joined(&left, &prefixes).is_none());
    }
}

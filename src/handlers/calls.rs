//! Call control endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::core::call::{CallHandle, CallSnapshot, TransferReason};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub room_name: String,
}

#[derive(Debug, Serialize)]
pub struct CallActionResponse {
    pub call_id: String,
    pub status: &'static str,
}

fn find_call(state: &AppState, call_id: &str) -> AppResult<CallHandle> {
    state
        .calls
        .get(call_id)
        .ok_or_else(|| AppError::NotFound(format!("call {call_id} not found")))
}

/// `POST /calls`: send the agent into a room.
pub async fn dispatch_call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DispatchRequest>,
) -> AppResult<(StatusCode, Json<CallSnapshot>)> {
    let room_name = request.room_name.trim();
    if room_name.is_empty() {
        return Err(AppError::BadRequest("room_name is required".to_string()));
    }

    let launcher = state.launcher.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("LiveKit is not configured".to_string())
    })?;

    let launch = launcher.launch(room_name).await?;
    let status = if launch.is_new() {
        info!(call_id = %room_name, "Call dispatched");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(launch.handle().snapshot())))
}

/// `GET /calls`
pub async fn list_calls(State(state): State<Arc<AppState>>) -> Json<Vec<CallSnapshot>> {
    Json(state.calls.list())
}

/// `GET /calls/{call_id}`
pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<Json<CallSnapshot>> {
    Ok(Json(find_call(&state, &call_id)?.snapshot()))
}

/// `POST /calls/{call_id}/transfer`: hand the caller to a human agent.
pub async fn transfer_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<(StatusCode, Json<CallActionResponse>)> {
    let handle = find_call(&state, &call_id)?;
    handle.request_transfer(TransferReason::Manual).await?;

    info!(call_id = %call_id, "Manual transfer accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(CallActionResponse {
            call_id,
            status: "transfer_requested",
        }),
    ))
}

/// `DELETE /calls/{call_id}`: end the call for everyone.
pub async fn hangup_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> AppResult<(StatusCode, Json<CallActionResponse>)> {
    let handle = find_call(&state, &call_id)?;
    // The actor may already be tearing down; the call ends either way
    if let Err(e) = handle.hangup("hangup requested via API").await {
        tracing::debug!(call_id = %call_id, "Hangup after end: {}", e);
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(CallActionResponse {
            call_id,
            status: "hangup_requested",
        }),
    ))
}


use crate::auth::{Auth, bearer_token};
use crate::errors::auth_error::AuthError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Extract the bearer token from the `Authorization` header
fn extract_token(request: &Request) -> Result<String, AuthError> {
    let Some(auth_header) = request.headers().get("authorization") else {
        return Err(AuthError::MissingAuthHeader);
    };
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    bearer_token(auth_str)
        .map(str::to_string)
        .ok_or(AuthError::InvalidAuthHeader)
}

/// Authentication middleware that validates bearer tokens against the
/// configured API secrets
///
/// When auth is not required, an empty [`Auth`] is inserted so handlers can
/// still extract it. On success the matched secret id is inserted; otherwise
/// the request is rejected with 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !state.config.auth_required {
        tracing::debug!("Authentication disabled, inserting empty Auth context");
        request.extensions_mut().insert(Auth::empty());
        return Ok(next.run(request).await);
    }

    let request_method = request.method().to_string();
    let request_path = request.uri().path().to_string();

    if !state.config.has_api_secret_auth() {
        return Err(AuthError::ConfigError(
            "Authentication required but no API secret configured".to_string(),
        ));
    }

    let token = extract_token(&request)?;

    match state.config.find_api_secret_id(&token) {
        Some(secret_id) => {
            tracing::info!(
                method = %request_method,
                path = %request_path,
                auth_id = %secret_id,
                "API secret authentication successful"
            );
            request.extensions_mut().insert(Auth::new(secret_id));
            Ok(next.run(request).await)
        }
        None => {
            tracing::warn!(
                method = %request_method,
                path = %request_path,
                "API secret authentication failed: token mismatch"
            );
            Err(AuthError::Unauthorized("Invalid API secret".to_string()))
        }
    }
}

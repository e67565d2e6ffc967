use crate::errors::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::HeaderMap;
use log::warn;

const BEARER_PREFIX: &str = "bearer ";

/// Token from an `Authorization: Bearer <token>` header, scheme matched case-insensitively
pub(super) fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(http::header::AUTHORIZATION)
        .ok_or_else(|| {
            warn!("Missing Authorization header");
            ApiError::unauthorized("Missing Authorization header")
        })?
        .to_str()
        .map_err(|e| {
            warn!("Failed to parse Authorization header to string: {}", e);
            ApiError::unauthorized("Invalid Authorization header")
        })?;

    match header.get(..BEARER_PREFIX.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER_PREFIX) => {
            Ok(header[BEARER_PREFIX.len()..].trim())
        }
        _ => {
            warn!("Invalid Authorization header format, missing 'Bearer ' prefix");
            Err(ApiError::unauthorized(
                "Invalid Authorization header format, expected a bearer token",
            ))
        }
    }
}

/// Verifies the access token and exposes its payload to handlers as an extension
pub(super) async fn authentication_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let payload = match bearer_token(request.headers())
        .and_then(|token| state.auth.verify_access(token).map_err(ApiError::from))
    {
        Ok(payload) => payload,
        Err(err) => {
            warn!("Authentication failed: {}", err.message);
            return err.into_response();
        }
    };

    request.extensions_mut().insert(payload);
    next.run(request).await
}

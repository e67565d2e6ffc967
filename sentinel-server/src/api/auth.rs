use super::authn_middleware::bearer_token;
use crate::auth::TokenBundle;
use crate::errors::ApiError;
use crate::openapi::AUTH_TAG;
use crate::session::ClientMeta;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FinalizeRequest {
    /// State returned by `/oauth2/new_url`
    pub state: String,
}

/// Redeem a completed login for tokens
#[utoipa::path(
    post,
    path = "/auth/finalize",
    tag = AUTH_TAG,
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Tokens issued", body = TokenBundle),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Login flow not completed yet"),
        (status = 404, description = "State not exists or expired"),
        (status = 500, description = "Internal server error")
    )
)]
async fn finalize(
    State(state): State<AppState>,
    client: ClientMeta,
    body: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Result<Json<TokenBundle>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let bundle = state.flows.finalize(&body.state, &client).await?;
    Ok(Json(bundle))
}

/// Exchange the refresh token in the Authorization header for a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = AUTH_TAG,
    params(
        ("Authorization" = String, Header, description = "Bearer refresh token"),
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenBundle),
        (status = 401, description = "Invalid, expired, blocked or mismatched refresh token"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
async fn refresh(
    State(state): State<AppState>,
    client: ClientMeta,
    headers: HeaderMap,
) -> Result<Json<TokenBundle>, ApiError> {
    let token = bearer_token(&headers)?;
    let bundle = state.auth.refresh(token, &client).await?;
    Ok(Json(bundle))
}

/// Block the session behind the refresh token in the Authorization header
#[utoipa::path(
    post,
    path = "/auth/revoke",
    tag = AUTH_TAG,
    params(
        ("Authorization" = String, Header, description = "Bearer refresh token"),
    ),
    responses(
        (status = 204, description = "Session blocked"),
        (status = 401, description = "Invalid, expired or already blocked refresh token"),
        (status = 404, description = "Session not found")
    )
)]
async fn revoke(State(state): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    state.auth.revoke(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(finalize))
        .routes(routes!(refresh))
        .routes(routes!(revoke))
}

use crate::auth::TokenBundle;
use crate::errors::ApiError;
use crate::oauth2::CallbackOutcome;
use crate::openapi::OAUTH2_TAG;
use crate::session::ClientMeta;
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NewUrlResponse {
    /// Provider authorization URL to open in the browser
    pub url: String,
    /// Opaque value to redeem at `/auth/finalize` once the login completes
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InviteBotUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    code: String,
    state: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackCompleted {
    pub status: String,
}

/// A completion marker in two-step mode, tokens in direct mode
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum CallbackResponse {
    Issued(TokenBundle),
    Completed(CallbackCompleted),
}

#[utoipa::path(
    get,
    path = "/oauth2/new_url",
    tag = OAUTH2_TAG,
    responses(
        (status = 200, description = "Login flow created", body = NewUrlResponse),
        (status = 500, description = "Internal server error")
    )
)]
async fn new_url(State(state): State<AppState>) -> Result<Json<NewUrlResponse>, ApiError> {
    let flow = state.flows.new_url().await?;
    Ok(Json(NewUrlResponse {
        url: flow.url,
        state: flow.state,
    }))
}

#[utoipa::path(
    get,
    path = "/oauth2/invite_bot_url",
    tag = OAUTH2_TAG,
    responses(
        (status = 200, description = "Bot invite link", body = InviteBotUrlResponse)
    )
)]
async fn invite_bot_url(
    State(state): State<AppState>,
) -> Result<Json<InviteBotUrlResponse>, ApiError> {
    let url = state.flows.invite_bot_url()?;
    Ok(Json(InviteBotUrlResponse { url }))
}

async fn handle_callback(
    state: AppState,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    client: ClientMeta,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;

    match state.flows.callback(&query.code, &query.state, &client).await? {
        CallbackOutcome::Issued(bundle) => {
            Ok(Json(CallbackResponse::Issued(bundle)).into_response())
        }
        CallbackOutcome::Completed { .. } => match &state.config.oauth2.completion_redirect {
            Some(target) => Ok(Redirect::to(target).into_response()),
            None => Ok((
                StatusCode::OK,
                Json(CallbackResponse::Completed(CallbackCompleted {
                    status: "completed".to_string(),
                })),
            )
                .into_response()),
        },
    }
}

/// Provider redirect target
#[utoipa::path(
    get,
    path = "/oauth2/callback",
    tag = OAUTH2_TAG,
    params(CallbackQuery),
    responses(
        (status = 200, description = "Login completed, or tokens in direct mode", body = CallbackResponse),
        (status = 303, description = "Login completed, redirecting to the client"),
        (status = 400, description = "Malformed query, rejected code or flow already used"),
        (status = 404, description = "State not exists or expired"),
        (status = 500, description = "Internal server error")
    )
)]
async fn callback_get(
    State(state): State<AppState>,
    client: ClientMeta,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    handle_callback(state, query, client).await
}

#[utoipa::path(
    post,
    path = "/oauth2/callback",
    tag = OAUTH2_TAG,
    params(CallbackQuery),
    responses(
        (status = 200, description = "Login completed, or tokens in direct mode", body = CallbackResponse),
        (status = 303, description = "Login completed, redirecting to the client"),
        (status = 400, description = "Malformed query, rejected code or flow already used"),
        (status = 404, description = "State not exists or expired"),
        (status = 500, description = "Internal server error")
    )
)]
async fn callback_post(
    State(state): State<AppState>,
    client: ClientMeta,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    handle_callback(state, query, client).await
}

pub(super) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(new_url))
        .routes(routes!(invite_bot_url))
        .routes(routes!(callback_get, callback_post))
}

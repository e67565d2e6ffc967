use crate::errors::ApiError;
use crate::openapi::GUILDS_TAG;
use crate::permissions::{Action, ConfigData, ConfigPermissions, GuildConfigDocument};
use crate::state::AppState;
use crate::store::{Guild, Store};
use crate::token::Payload;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use log::info;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Replacement permission masks and data for a guild config
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateGuildConfig {
    pub permissions: ConfigPermissions,
    #[serde(default)]
    pub data: ConfigData,
}

#[utoipa::path(
    get,
    path = "/guilds/{id}",
    tag = GUILDS_TAG,
    params(("id" = String, Path, description = "Guild Discord id")),
    responses(
        (status = 200, description = "Guild found", body = Guild),
        (status = 401, description = "Missing or invalid access token"),
        (status = 404, description = "Guild not found")
    )
)]
async fn get_guild(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Guild>, ApiError> {
    state
        .store
        .guild(&id)
        .await
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("guild not found"))
}

#[utoipa::path(
    get,
    path = "/guilds/{id}/config",
    tag = GUILDS_TAG,
    params(("id" = String, Path, description = "Guild Discord id")),
    responses(
        (status = 200, description = "Guild config", body = GuildConfigDocument),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "No relationship, not configured or missing read permission")
    )
)]
async fn get_guild_config(
    State(state): State<AppState>,
    Extension(caller): Extension<Payload>,
    Path(id): Path<String>,
) -> Result<Json<GuildConfigDocument>, ApiError> {
    let grant = state
        .permissions
        .authorize(&caller.subject, &id, Action::Read)
        .await?;
    Ok(Json(grant.document))
}

#[utoipa::path(
    post,
    path = "/guilds/{id}/config",
    tag = GUILDS_TAG,
    params(("id" = String, Path, description = "Guild Discord id")),
    request_body = UpdateGuildConfig,
    responses(
        (status = 200, description = "Updated guild config", body = GuildConfigDocument),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Missing or invalid access token"),
        (status = 403, description = "No relationship, not configured or missing edit permission")
    )
)]
async fn update_guild_config(
    State(state): State<AppState>,
    Extension(caller): Extension<Payload>,
    Path(id): Path<String>,
    body: Result<Json<UpdateGuildConfig>, JsonRejection>,
) -> Result<Json<GuildConfigDocument>, ApiError> {
    let Json(update) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let grant = state
        .permissions
        .authorize(&caller.subject, &id, Action::Edit)
        .await?;

    let document = grant.document.overwritten(update.permissions, update.data);
    let record = document.to_record(&id).map_err(ApiError::internal)?;
    state
        .store
        .overwrite_guild_config(&record)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("guild config not found"))?;

    info!("Guild {} config updated by {}", id, caller.subject);
    Ok(Json(document))
}

#[utoipa::path(
    get,
    path = "/guild_configs/presets/{preset}",
    tag = GUILDS_TAG,
    params(("preset" = String, Path, description = "Preset name")),
    responses(
        (status = 200, description = "Preset document", body = GuildConfigDocument),
        (status = 404, description = "Unknown preset")
    )
)]
async fn get_preset(Path(preset): Path<String>) -> Result<Json<GuildConfigDocument>, ApiError> {
    GuildConfigDocument::preset(&preset)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("unknown preset '{preset}'")))
}

pub(super) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_guild))
        .routes(routes!(get_guild_config, update_guild_config))
        .routes(routes!(get_preset))
}

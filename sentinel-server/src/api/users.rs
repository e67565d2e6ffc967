use crate::errors::ApiError;
use crate::openapi::USERS_TAG;
use crate::permissions::{is_granted, Action, AuthzError, GuildConfigDocument};
use crate::state::AppState;
use crate::store::{MemberGuild, Store, User};
use crate::token::Payload;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// A guild the caller belongs to, with what they may do with its config
#[derive(Debug, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct UserGuildResponse {
    pub guild_discord_id: String,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub is_owner: bool,
    pub permissions: i64,
    pub can_read_config: bool,
    pub can_edit_config: bool,
}

impl UserGuildResponse {
    fn from_member(subject: &str, member: MemberGuild) -> Result<Self, AuthzError> {
        let document = member
            .config
            .as_ref()
            .map(GuildConfigDocument::from_value)
            .transpose()?;
        let can = |action| {
            document
                .as_ref()
                .is_some_and(|doc| is_granted(member.permissions, doc.mask(action)))
        };

        Ok(Self {
            can_read_config: can(Action::Read),
            can_edit_config: can(Action::Edit),
            is_owner: member.owner_discord_id.as_deref() == Some(subject),
            guild_discord_id: member.guild_discord_id,
            name: member.name,
            icon: member.icon,
            permissions: member.permissions,
        })
    }
}

async fn member_guilds(
    state: &AppState,
    subject: &str,
) -> Result<Vec<UserGuildResponse>, ApiError> {
    state
        .store
        .member_guilds(subject)
        .await
        .map_err(ApiError::internal)?
        .into_iter()
        .map(|member| UserGuildResponse::from_member(subject, member).map_err(ApiError::from))
        .collect()
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = USERS_TAG,
    responses(
        (status = 200, description = "The caller's profile", body = User),
        (status = 401, description = "Missing or invalid access token"),
        (status = 404, description = "User not found")
    )
)]
async fn get_me(
    State(state): State<AppState>,
    Extension(caller): Extension<Payload>,
) -> Result<Json<User>, ApiError> {
    state
        .store
        .user(&caller.subject)
        .await
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("user not found"))
}

#[utoipa::path(
    get,
    path = "/users/me/guilds",
    tag = USERS_TAG,
    responses(
        (status = 200, description = "Guilds the caller belongs to", body = Vec<UserGuildResponse>),
        (status = 401, description = "Missing or invalid access token")
    )
)]
async fn get_my_guilds(
    State(state): State<AppState>,
    Extension(caller): Extension<Payload>,
) -> Result<Json<Vec<UserGuildResponse>>, ApiError> {
    Ok(Json(member_guilds(&state, &caller.subject).await?))
}

#[utoipa::path(
    get,
    path = "/users/me/guilds/{id}",
    tag = USERS_TAG,
    params(("id" = String, Path, description = "Guild Discord id")),
    responses(
        (status = 200, description = "The caller's membership", body = UserGuildResponse),
        (status = 401, description = "Missing or invalid access token"),
        (status = 404, description = "Caller is not a member of this guild")
    )
)]
async fn get_my_guild(
    State(state): State<AppState>,
    Extension(caller): Extension<Payload>,
    Path(id): Path<String>,
) -> Result<Json<UserGuildResponse>, ApiError> {
    member_guilds(&state, &caller.subject)
        .await?
        .into_iter()
        .find(|guild| guild.guild_discord_id == id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("not a member of this guild"))
}

pub(super) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(get_me))
        .routes(routes!(get_my_guilds))
        .routes(routes!(get_my_guild))
}

//! Rows owned by the relational store

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Local mirror of a federated user profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow, ToSchema)]
pub struct User {
    pub discord_id: String,
    pub username: String,
    pub discriminator: String,
    pub avatar: Option<String>,
    pub verified: bool,
    pub email: Option<String>,
    pub flags: i64,
    pub banner: Option<String>,
    pub accent_color: Option<i64>,
    pub public_flags: i64,
}

/// Local mirror of a guild owned by a synced user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow, ToSchema)]
pub struct Guild {
    pub discord_id: String,
    pub name: String,
    pub icon: Option<String>,
    pub owner_discord_id: String,
}

/// Membership of a user in a guild with the permission bitmask granted there
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow, ToSchema)]
pub struct UserGuild {
    pub user_discord_id: String,
    pub guild_discord_id: String,
    pub permissions: i64,
}

/// Stored configuration document of a guild
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct GuildConfig {
    pub guild_discord_id: String,
    pub preset: String,
    pub document: serde_json::Value,
}

/// A membership joined with whatever the store knows about the guild.
///
/// Guild rows only exist for guilds some synced user owns, so the guild
/// attributes and config are optional.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct MemberGuild {
    pub guild_discord_id: String,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub owner_discord_id: Option<String>,
    pub permissions: i64,
    pub config: Option<serde_json::Value>,
}

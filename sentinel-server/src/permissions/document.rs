//! Versioned guild configuration document

use super::Action;
use crate::store::GuildConfig;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Every permission bit a guild owner is granted
pub const ALL_PERMISSIONS: i64 = 0xfffffffffff;
pub const DEFAULT_PRESET: &str = "default";
pub const DOCUMENT_VERSION: u32 = 1;

/// Bitmasks a member's guild permissions are checked against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(default)]
pub struct ConfigPermissions {
    pub edit: i64,
    pub read: i64,
}

impl Default for ConfigPermissions {
    fn default() -> Self {
        Self {
            edit: 40, // administrator | manage guild
            read: ALL_PERMISSIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(default)]
pub struct ConfigData {
    pub use_config: bool,
}

/// Guild configuration as stored in the `document` column.
///
/// Every field falls back to the default preset when missing, so documents
/// written by older versions keep deserializing after the schema grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(default)]
pub struct GuildConfigDocument {
    pub version: u32,
    pub preset: String,
    pub permissions: ConfigPermissions,
    pub data: ConfigData,
}

impl Default for GuildConfigDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            preset: DEFAULT_PRESET.to_string(),
            permissions: ConfigPermissions::default(),
            data: ConfigData::default(),
        }
    }
}

impl GuildConfigDocument {
    /// Look up a named preset
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            DEFAULT_PRESET => Some(Self::default()),
            _ => None,
        }
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    pub fn mask(&self, action: Action) -> i64 {
        match action {
            Action::Read => self.permissions.read,
            Action::Edit => self.permissions.edit,
        }
    }

    /// Replace the permission masks and data, keeping the preset tag
    pub fn overwritten(&self, permissions: ConfigPermissions, data: ConfigData) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            preset: self.preset.clone(),
            permissions,
            data,
        }
    }

    /// Build the stored row for `guild_discord_id`
    pub fn to_record(&self, guild_discord_id: &str) -> Result<GuildConfig, serde_json::Error> {
        Ok(GuildConfig {
            guild_discord_id: guild_discord_id.to_string(),
            preset: self.preset.clone(),
            document: serde_json::to_value(self)?,
        })
    }
}

//! Bitmask permission evaluation for per-guild configuration access

use crate::errors::ApiError;
use crate::store::{Database, GuildConfig, Store, StoreError, UserGuild};
use log::debug;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod document;

pub use document::{ConfigData, ConfigPermissions, GuildConfigDocument, ALL_PERMISSIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Edit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Edit => write!(f, "edit"),
        }
    }
}

/// Any shared bit authorizes
pub fn is_granted(member_permissions: i64, required_mask: i64) -> bool {
    member_permissions & required_mask != 0
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("no relationship to this guild")]
    NoRelation,
    #[error("guild not configured")]
    NotConfigured,
    #[error("missing permission to {0} this guild's config")]
    Denied(Action),
    #[error("stored guild config is malformed: {0}")]
    InvalidDocument(#[from] serde_json::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NoRelation | AuthzError::NotConfigured | AuthzError::Denied(_) => {
                ApiError::forbidden(err)
            }
            AuthzError::InvalidDocument(_) | AuthzError::Store(_) => ApiError::internal(err),
        }
    }
}

/// Everything read while authorizing, handed to the handler
#[derive(Debug, Clone)]
pub struct Grant {
    pub relation: UserGuild,
    pub config: GuildConfig,
    pub document: GuildConfigDocument,
}

#[derive(Clone)]
pub struct PermissionEvaluator {
    store: Arc<Database>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<Database>) -> Self {
        Self { store }
    }

    /// Check that `subject` may perform `action` on the config of `guild_discord_id`
    pub async fn authorize(
        &self,
        subject: &str,
        guild_discord_id: &str,
        action: Action,
    ) -> Result<Grant, AuthzError> {
        let relation = self
            .store
            .relation(subject, guild_discord_id)
            .await?
            .ok_or(AuthzError::NoRelation)?;
        let config = self
            .store
            .guild_config(guild_discord_id)
            .await?
            .ok_or(AuthzError::NotConfigured)?;
        let document = GuildConfigDocument::from_value(&config.document)?;

        if !is_granted(relation.permissions, document.mask(action)) {
            debug!(
                "Denied {} on guild {} config for {}",
                action, guild_discord_id, subject
            );
            return Err(AuthzError::Denied(action));
        }

        Ok(Grant {
            relation,
            config,
            document,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::{Guild, User};
    use serde_json::json;

    #[test]
    fn test_grant_law() {
        assert!(is_granted(0b0100, 0b0101));
        assert!(!is_granted(0b0010, 0b0101));
        assert!(!is_granted(0, ALL_PERMISSIONS));
        assert!(is_granted(ALL_PERMISSIONS, 40));
    }

    async fn seed(store: &MemoryStore, permissions: i64, document: Option<serde_json::Value>) {
        let mut tx = store.begin().await.unwrap();
        tx.upsert_user(&User {
            discord_id: "owner".into(),
            username: "owner".into(),
            discriminator: "0".into(),
            avatar: None,
            verified: true,
            email: None,
            flags: 0,
            banner: None,
            accent_color: None,
            public_flags: 0,
        })
        .await
        .unwrap();
        tx.upsert_guild(&Guild {
            discord_id: "g".into(),
            name: "guild".into(),
            icon: None,
            owner_discord_id: "owner".into(),
        })
        .await
        .unwrap();
        if let Some(document) = document {
            tx.create_guild_config_if_absent(&GuildConfig {
                guild_discord_id: "g".into(),
                preset: "default".into(),
                document,
            })
            .await
            .unwrap();
        }
        tx.upsert_user_guild(&UserGuild {
            user_discord_id: "member".into(),
            guild_discord_id: "g".into(),
            permissions,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    fn evaluator(store: &MemoryStore) -> PermissionEvaluator {
        PermissionEvaluator::new(Arc::new(Database::InMemory(store.clone())))
    }

    #[tokio::test]
    async fn test_no_relation_is_forbidden() {
        let store = MemoryStore::new();
        seed(&store, 0b0100, Some(json!({}))).await;

        let result = evaluator(&store)
            .authorize("stranger", "g", Action::Read)
            .await;
        assert!(matches!(result, Err(AuthzError::NoRelation)));
    }

    #[tokio::test]
    async fn test_missing_config_is_forbidden() {
        let store = MemoryStore::new();
        seed(&store, ALL_PERMISSIONS, None).await;

        let result = evaluator(&store).authorize("member", "g", Action::Read).await;
        assert!(matches!(result, Err(AuthzError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_any_shared_bit_grants() {
        let store = MemoryStore::new();
        seed(
            &store,
            0b0100,
            Some(json!({ "permissions": { "edit": 0b0101, "read": 0b0010 } })),
        )
        .await;
        let evaluator = evaluator(&store);

        let grant = evaluator.authorize("member", "g", Action::Edit).await.unwrap();
        assert_eq!(grant.relation.permissions, 0b0100);
        assert_eq!(grant.document.permissions.edit, 0b0101);

        let result = evaluator.authorize("member", "g", Action::Read).await;
        assert!(matches!(result, Err(AuthzError::Denied(Action::Read))));
    }

    #[tokio::test]
    async fn test_partial_document_uses_default_masks() {
        let store = MemoryStore::new();
        // edit falls back to 40 (0b101000)
        seed(&store, 0b1000, Some(json!({ "preset": "default" }))).await;

        let result = evaluator(&store).authorize("member", "g", Action::Edit).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        use http::StatusCode;

        assert_eq!(
            ApiError::from(AuthzError::NoRelation).status_code,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthzError::Denied(Action::Edit)).status_code,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthzError::Store(StoreError::Aborted("boom".into()))).status_code,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

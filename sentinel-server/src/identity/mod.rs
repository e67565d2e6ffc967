//! Materializes a federated identity and its guild memberships locally

use crate::permissions::document::GuildConfigDocument;
use crate::permissions::ALL_PERMISSIONS;
use crate::store::{Guild, Store, StoreError, User, UserGuild};
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("failed to encode default guild config: {0}")]
    Document(#[from] serde_json::Error),
}

/// A guild as reported by the identity provider for the syncing user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteGuild {
    pub discord_id: String,
    pub name: String,
    pub icon: Option<String>,
    pub is_owner: bool,
    pub permissions: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub relations: usize,
    pub owned_guilds: usize,
    pub configs_created: usize,
}

/// Upsert `user`, the guilds they own and every membership in one transaction.
///
/// Owned guilds get the default config if they have none yet and their
/// relation is forced to [`ALL_PERMISSIONS`]. Nothing is visible unless the
/// whole sync commits.
pub async fn sync_identity<S: Store + ?Sized>(
    store: &S,
    user: &User,
    guilds: &[RemoteGuild],
) -> Result<SyncSummary, SyncError> {
    let mut summary = SyncSummary::default();
    let mut tx = store.begin().await?;

    tx.upsert_user(user).await?;

    for remote in guilds {
        let mut permissions = remote.permissions;

        if remote.is_owner {
            tx.upsert_guild(&Guild {
                discord_id: remote.discord_id.clone(),
                name: remote.name.clone(),
                icon: remote.icon.clone(),
                owner_discord_id: user.discord_id.clone(),
            })
            .await?;

            let config = GuildConfigDocument::default().to_record(&remote.discord_id)?;
            if tx.create_guild_config_if_absent(&config).await? {
                summary.configs_created += 1;
            }

            permissions = ALL_PERMISSIONS;
            summary.owned_guilds += 1;
        }

        tx.upsert_user_guild(&UserGuild {
            user_discord_id: user.discord_id.clone(),
            guild_discord_id: remote.discord_id.clone(),
            permissions,
        })
        .await?;
        summary.relations += 1;
    }

    tx.commit().await?;
    debug!(
        "Synced user {}: {} relations, {} owned guilds, {} new configs",
        user.discord_id, summary.relations, summary.owned_guilds, summary.configs_created
    );
    Ok(summary)
}

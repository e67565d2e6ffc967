use crate::config::{DatabaseConfig, DatabaseStore};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod models;
pub mod postgres;

pub use models::{Guild, GuildConfig, MemberGuild, User, UserGuild};

/// Errors that can occur during relational store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

/// Query surface of the relational store.
///
/// Reads run outside of any transaction. Writes that must be all-or-nothing
/// go through a [`Transaction`] obtained from [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a transaction. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    async fn user(&self, discord_id: &str) -> Result<Option<User>, StoreError>;

    async fn guild(&self, discord_id: &str) -> Result<Option<Guild>, StoreError>;

    async fn relation(
        &self,
        user_discord_id: &str,
        guild_discord_id: &str,
    ) -> Result<Option<UserGuild>, StoreError>;

    /// Every membership of a user, ordered by guild id
    async fn member_guilds(&self, user_discord_id: &str) -> Result<Vec<MemberGuild>, StoreError>;

    async fn guild_config(&self, guild_discord_id: &str)
        -> Result<Option<GuildConfig>, StoreError>;

    /// Replace an existing config. Returns `None` if the guild has none.
    async fn overwrite_guild_config(
        &self,
        config: &GuildConfig,
    ) -> Result<Option<GuildConfig>, StoreError>;

    async fn health_check(&self) -> Result<(), String>;
}

/// Writes performed by the identity sync, applied atomically on `commit`
#[async_trait]
pub trait Transaction: Send {
    /// Insert a user or overwrite all of its profile fields
    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Insert a guild or refresh its name and icon. The owner is kept from creation.
    async fn upsert_guild(&mut self, guild: &Guild) -> Result<(), StoreError>;

    /// Insert a config unless the guild already has one. Returns whether it was inserted.
    async fn create_guild_config_if_absent(
        &mut self,
        config: &GuildConfig,
    ) -> Result<bool, StoreError>;

    async fn upsert_user_guild(&mut self, relation: &UserGuild) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Store implementation selected at startup
#[derive(Clone)]
pub enum Database {
    Postgres(postgres::PostgresStore),
    InMemory(memory::MemoryStore),
}

#[async_trait]
impl Store for Database {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        match self {
            Self::Postgres(store) => store.begin().await,
            Self::InMemory(store) => store.begin().await,
        }
    }

    async fn user(&self, discord_id: &str) -> Result<Option<User>, StoreError> {
        match self {
            Self::Postgres(store) => store.user(discord_id).await,
            Self::InMemory(store) => store.user(discord_id).await,
        }
    }

    async fn guild(&self, discord_id: &str) -> Result<Option<Guild>, StoreError> {
        match self {
            Self::Postgres(store) => store.guild(discord_id).await,
            Self::InMemory(store) => store.guild(discord_id).await,
        }
    }

    async fn relation(
        &self,
        user_discord_id: &str,
        guild_discord_id: &str,
    ) -> Result<Option<UserGuild>, StoreError> {
        match self {
            Self::Postgres(store) => store.relation(user_discord_id, guild_discord_id).await,
            Self::InMemory(store) => store.relation(user_discord_id, guild_discord_id).await,
        }
    }

    async fn member_guilds(&self, user_discord_id: &str) -> Result<Vec<MemberGuild>, StoreError> {
        match self {
            Self::Postgres(store) => store.member_guilds(user_discord_id).await,
            Self::InMemory(store) => store.member_guilds(user_discord_id).await,
        }
    }

    async fn guild_config(
        &self,
        guild_discord_id: &str,
    ) -> Result<Option<GuildConfig>, StoreError> {
        match self {
            Self::Postgres(store) => store.guild_config(guild_discord_id).await,
            Self::InMemory(store) => store.guild_config(guild_discord_id).await,
        }
    }

    async fn overwrite_guild_config(
        &self,
        config: &GuildConfig,
    ) -> Result<Option<GuildConfig>, StoreError> {
        match self {
            Self::Postgres(store) => store.overwrite_guild_config(config).await,
            Self::InMemory(store) => store.overwrite_guild_config(config).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::Postgres(store) => store.health_check().await,
            Self::InMemory(store) => store.health_check().await,
        }
    }
}

/// Creates the store selected by the configuration, running migrations for Postgres.
pub async fn create_store(config: &DatabaseConfig) -> Result<Database, StoreError> {
    match config.store {
        DatabaseStore::Postgres => {
            let store = postgres::PostgresStore::connect(config).await?;
            Ok(Database::Postgres(store))
        }
        DatabaseStore::InMemory => {
            log::warn!("Using the in-memory store, data will be lost on restart");
            Ok(Database::InMemory(memory::MemoryStore::new()))
        }
    }
}

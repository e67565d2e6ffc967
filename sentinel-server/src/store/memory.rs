//! Process-local store used for tests and single-node development

use super::{
    Guild, GuildConfig, MemberGuild, Store, StoreError, Transaction, User, UserGuild,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    guilds: HashMap<String, Guild>,
    // Keyed by (user, guild), ordered so listings come out sorted by guild per user
    relations: BTreeMap<(String, String), UserGuild>,
    configs: HashMap<String, GuildConfig>,
}

impl Tables {
    fn apply(&mut self, write: Write) {
        match write {
            Write::User(user) => {
                self.users.insert(user.discord_id.clone(), user);
            }
            Write::Guild(guild) => match self.guilds.get_mut(&guild.discord_id) {
                Some(existing) => {
                    existing.name = guild.name;
                    existing.icon = guild.icon;
                }
                None => {
                    self.guilds.insert(guild.discord_id.clone(), guild);
                }
            },
            Write::ConfigIfAbsent(config) => {
                self.configs
                    .entry(config.guild_discord_id.clone())
                    .or_insert(config);
            }
            Write::Relation(relation) => {
                self.relations.insert(
                    (
                        relation.user_discord_id.clone(),
                        relation.guild_discord_id.clone(),
                    ),
                    relation,
                );
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Write {
    User(User),
    Guild(Guild),
    ConfigIfAbsent(GuildConfig),
    Relation(UserGuild),
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    fail_relation_for: Arc<RwLock<Option<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make relation writes for `guild_discord_id` fail, to exercise rollback
    #[cfg(test)]
    pub async fn fail_relation_writes_for(&self, guild_discord_id: &str) {
        *self.fail_relation_for.write().await = Some(guild_discord_id.to_string());
    }

    /// Number of (users, guilds, relations, configs) rows
    #[cfg(test)]
    pub async fn row_counts(&self) -> (usize, usize, usize, usize) {
        let tables = self.tables.read().await;
        (
            tables.users.len(),
            tables.guilds.len(),
            tables.relations.len(),
            tables.configs.len(),
        )
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            fail_relation_for: self.fail_relation_for.read().await.clone(),
            pending: Vec::new(),
        }))
    }

    async fn user(&self, discord_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(discord_id).cloned())
    }

    async fn guild(&self, discord_id: &str) -> Result<Option<Guild>, StoreError> {
        Ok(self.tables.read().await.guilds.get(discord_id).cloned())
    }

    async fn relation(
        &self,
        user_discord_id: &str,
        guild_discord_id: &str,
    ) -> Result<Option<UserGuild>, StoreError> {
        let key = (user_discord_id.to_string(), guild_discord_id.to_string());
        Ok(self.tables.read().await.relations.get(&key).cloned())
    }

    async fn member_guilds(&self, user_discord_id: &str) -> Result<Vec<MemberGuild>, StoreError> {
        let tables = self.tables.read().await;
        let guilds = tables
            .relations
            .values()
            .filter(|relation| relation.user_discord_id == user_discord_id)
            .map(|relation| {
                let guild = tables.guilds.get(&relation.guild_discord_id);
                MemberGuild {
                    guild_discord_id: relation.guild_discord_id.clone(),
                    name: guild.map(|g| g.name.clone()),
                    icon: guild.and_then(|g| g.icon.clone()),
                    owner_discord_id: guild.map(|g| g.owner_discord_id.clone()),
                    permissions: relation.permissions,
                    config: tables
                        .configs
                        .get(&relation.guild_discord_id)
                        .map(|c| c.document.clone()),
                }
            })
            .collect();
        Ok(guilds)
    }

    async fn guild_config(
        &self,
        guild_discord_id: &str,
    ) -> Result<Option<GuildConfig>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .configs
            .get(guild_discord_id)
            .cloned())
    }

    async fn overwrite_guild_config(
        &self,
        config: &GuildConfig,
    ) -> Result<Option<GuildConfig>, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.configs.get_mut(&config.guild_discord_id) {
            Some(existing) => {
                *existing = config.clone();
                Ok(Some(existing.clone()))
            }
            None => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Buffers writes and replays them under the write lock on commit
struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    fail_relation_for: Option<String>,
    pending: Vec<Write>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.pending.push(Write::User(user.clone()));
        Ok(())
    }

    async fn upsert_guild(&mut self, guild: &Guild) -> Result<(), StoreError> {
        self.pending.push(Write::Guild(guild.clone()));
        Ok(())
    }

    async fn create_guild_config_if_absent(
        &mut self,
        config: &GuildConfig,
    ) -> Result<bool, StoreError> {
        let guild_id = &config.guild_discord_id;
        let pending = self.pending.iter().any(|write| {
            matches!(write, Write::ConfigIfAbsent(c) if &c.guild_discord_id == guild_id)
        });
        let committed = self.tables.read().await.configs.contains_key(guild_id);
        if pending || committed {
            return Ok(false);
        }
        self.pending.push(Write::ConfigIfAbsent(config.clone()));
        Ok(true)
    }

    async fn upsert_user_guild(&mut self, relation: &UserGuild) -> Result<(), StoreError> {
        if self.fail_relation_for.as_deref() == Some(relation.guild_discord_id.as_str()) {
            return Err(StoreError::Aborted(format!(
                "relation write for guild {} rejected",
                relation.guild_discord_id
            )));
        }
        self.pending.push(Write::Relation(relation.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for write in self.pending {
            tables.apply(write);
        }
        Ok(())
    }
}

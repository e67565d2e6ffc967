//! Server-side records backing refresh tokens

use crate::cache::{Cache, CacheError};
use crate::config::{SessionBackend, TokenConfig};
use crate::store::Database;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

pub mod cache;
pub mod postgres;

pub use cache::CacheSessionStore;
pub use postgres::PostgresSessionStore;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Request metadata recorded with a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub user_agent: String,
    pub client_ip: String,
}

/// Refresh-token record. `id` is the id of the refresh token's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub subject: String,
    pub refresh_secret: String,
    pub user_agent: String,
    pub client_ip: String,
    pub is_blocked: bool,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: Uuid,
        subject: &str,
        refresh_token: &str,
        client: &ClientMeta,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            subject: subject.to_string(),
            refresh_secret: hash_secret(refresh_token),
            user_agent: client.user_agent.clone(),
            client_ip: client.client_ip.clone(),
            is_blocked: false,
            expires_at,
        }
    }

    /// Time left until the session lapses, zero once it has
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }
}

/// SHA-256 of a refresh token, base64url encoded
pub fn hash_secret(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `session` under its id, replacing any previous record
    async fn put(&self, session: Session, ttl: Duration) -> Result<Session, SessionError>;

    async fn get(&self, id: Uuid) -> Result<Session, SessionError>;

    /// Permanently reject refreshes against this session
    async fn block(&self, id: Uuid) -> Result<(), SessionError>;
}

#[derive(Clone)]
pub enum Sessions {
    Cache(CacheSessionStore),
    Database(PostgresSessionStore),
}

#[async_trait]
impl SessionStore for Sessions {
    async fn put(&self, session: Session, ttl: Duration) -> Result<Session, SessionError> {
        match self {
            Self::Cache(store) => store.put(session, ttl).await,
            Self::Database(store) => store.put(session, ttl).await,
        }
    }

    async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        match self {
            Self::Cache(store) => store.get(id).await,
            Self::Database(store) => store.get(id).await,
        }
    }

    async fn block(&self, id: Uuid) -> Result<(), SessionError> {
        match self {
            Self::Cache(store) => store.block(id).await,
            Self::Database(store) => store.block(id).await,
        }
    }
}

/// Picks the session backend named by the token configuration
pub fn create_session_store(
    config: &TokenConfig,
    cache: &Cache,
    store: &Database,
) -> Result<Sessions, SessionError> {
    match (&config.session_backend, store) {
        (SessionBackend::Cache, _) => Ok(Sessions::Cache(CacheSessionStore::new(cache.clone()))),
        (SessionBackend::Database, Database::Postgres(pg)) => Ok(Sessions::Database(
            PostgresSessionStore::new(pg.pool().clone()),
        )),
        (SessionBackend::Database, Database::InMemory(_)) => Err(SessionError::Config(
            "the database session backend requires the postgres store".to_string(),
        )),
    }
}

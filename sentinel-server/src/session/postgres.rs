use super::{Session, SessionError, SessionStore};
use async_trait::async_trait;
use chrono::Duration;
use log::debug;
use sqlx::PgPool;
use uuid::Uuid;

/// Sessions kept in the `sessions` table. Lapsed rows are ignored on read.
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    async fn put(&self, session: Session, ttl: Duration) -> Result<Session, SessionError> {
        let expires_at = chrono::Utc::now() + ttl;
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, subject, refresh_secret, user_agent, client_ip,
                                  is_blocked, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET subject = EXCLUDED.subject,
                refresh_secret = EXCLUDED.refresh_secret,
                user_agent = EXCLUDED.user_agent,
                client_ip = EXCLUDED.client_ip,
                is_blocked = EXCLUDED.is_blocked,
                expires_at = EXCLUDED.expires_at
            RETURNING id, subject, refresh_secret, user_agent, client_ip, is_blocked, expires_at
            "#,
        )
        .bind(session.id)
        .bind(&session.subject)
        .bind(&session.refresh_secret)
        .bind(&session.user_agent)
        .bind(&session.client_ip)
        .bind(session.is_blocked)
        .bind(expires_at.min(session.expires_at))
        .fetch_one(&self.pool)
        .await?;
        debug!("Stored session {} for {}", session.id, session.subject);
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        sqlx::query_as::<_, Session>(
            r#"
            SELECT id, subject, refresh_secret, user_agent, client_ip, is_blocked, expires_at
            FROM sessions
            WHERE id = $1 AND expires_at > now()
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(SessionError::NotFound)
    }

    async fn block(&self, id: Uuid) -> Result<(), SessionError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_blocked = TRUE
            WHERE id = $1 AND expires_at > now()
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SessionError::NotFound);
        }
        debug!("Blocked session {}", id);
        Ok(())
    }
}

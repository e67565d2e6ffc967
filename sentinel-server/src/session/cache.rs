use super::{Session, SessionError, SessionStore};
use crate::cache::{Cache, CacheBackend};
use async_trait::async_trait;
use chrono::Duration;
use log::debug;
use uuid::Uuid;

fn session_key(id: Uuid) -> String {
    format!("session:{id}")
}

/// Sessions kept in the cache under `session:<id>`, expiring with their TTL
#[derive(Clone)]
pub struct CacheSessionStore {
    cache: Cache,
}

impl CacheSessionStore {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl SessionStore for CacheSessionStore {
    async fn put(&self, session: Session, ttl: Duration) -> Result<Session, SessionError> {
        let ttl = ttl.to_std().unwrap_or_default();
        self.cache.set(&session_key(session.id), &session, ttl).await?;
        debug!("Stored session {} for {}", session.id, session.subject);
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> Result<Session, SessionError> {
        self.cache
            .get::<Session>(&session_key(id))
            .await?
            .ok_or(SessionError::NotFound)
    }

    async fn block(&self, id: Uuid) -> Result<(), SessionError> {
        let mut session = self.get(id).await?;
        session.is_blocked = true;

        // Keep the original deadline; a session that lapsed meanwhile stays gone
        let ttl = session.remaining().to_std().unwrap_or_default();
        if !self
            .cache
            .set_if_present(&session_key(id), &session, ttl)
            .await?
        {
            return Err(SessionError::NotFound);
        }
        debug!("Blocked session {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCache;
    use crate::session::ClientMeta;
    use chrono::Utc;

    fn store() -> CacheSessionStore {
        CacheSessionStore::new(Cache::InMemory(InMemoryCache::new(16).unwrap()))
    }

    fn session(ttl: Duration) -> Session {
        Session::new(
            Uuid::new_v4(),
            "80351110224678912",
            "refresh-token",
            &ClientMeta {
                user_agent: "curl/8.5.0".to_string(),
                client_ip: "203.0.113.7".to_string(),
            },
            Utc::now() + ttl,
        )
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = store();
        let session = session(Duration::minutes(5));

        let stored = store.put(session.clone(), Duration::minutes(5)).await.unwrap();
        assert_eq!(stored, session);
        assert_eq!(store.get(session.id).await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        assert!(matches!(
            store().get(Uuid::new_v4()).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_block() {
        let store = store();
        let session = session(Duration::minutes(5));
        store.put(session.clone(), Duration::minutes(5)).await.unwrap();

        store.block(session.id).await.unwrap();

        let blocked = store.get(session.id).await.unwrap();
        assert!(blocked.is_blocked);
        assert_eq!(blocked.refresh_secret, session.refresh_secret);
    }

    #[tokio::test]
    async fn test_block_unknown_session() {
        assert!(matches!(
            store().block(Uuid::new_v4()).await,
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_session_expires_with_ttl() {
        let store = store();
        let session = session(Duration::milliseconds(200));
        store
            .put(session.clone(), Duration::milliseconds(200))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(400)).await;

        assert!(matches!(
            store.get(session.id).await,
            Err(SessionError::NotFound)
        ));
    }
}

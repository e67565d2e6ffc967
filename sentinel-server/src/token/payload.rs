use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a token may be presented for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried inside an encrypted token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    /// Unique per issued token; refresh tokens share it with their session
    pub id: Uuid,
    /// External identity id of the token holder
    pub subject: String,
    pub kind: TokenKind,
    pub issued_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl Payload {
    pub fn new(subject: &str, kind: TokenKind, duration: Duration) -> Self {
        let issued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            kind,
            issued_at,
            expired_at: issued_at + duration,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expired_at
    }
}

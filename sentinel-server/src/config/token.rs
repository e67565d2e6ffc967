use confique::Config;
use serde::Deserialize;

/// Where session records backing refresh tokens are kept
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum SessionBackend {
    Cache,
    Database,
}

impl TryFrom<String> for SessionBackend {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "cache" => Ok(Self::Cache),
            "database" => Ok(Self::Database),
            other => Err(format!(
                "unknown session backend '{other}', expected 'cache' or 'database'"
            )),
        }
    }
}

/// Token issuance configuration
#[derive(Debug, Config, Clone)]
pub struct TokenConfig {
    /// Symmetric key used to encrypt tokens, exactly 32 bytes
    #[config(env = "SENTINEL_TOKEN_SYMMETRIC_KEY")]
    pub symmetric_key: String,

    /// Access token lifetime in seconds (default: 900 = 15 minutes)
    #[config(env = "SENTINEL_TOKEN_ACCESS_DURATION", default = 900)]
    pub access_duration: i64,

    /// Refresh token lifetime in seconds (default: 604800 = 7 days)
    #[config(env = "SENTINEL_TOKEN_REFRESH_DURATION", default = 604800)]
    pub refresh_duration: i64,

    /// Session backend: "cache" (default) or "database"
    #[config(env = "SENTINEL_SESSION_BACKEND", default = "cache")]
    pub session_backend: SessionBackend,
}

impl TokenConfig {
    pub fn access_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_duration)
    }

    pub fn refresh_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_duration)
    }
}

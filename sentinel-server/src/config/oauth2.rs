//! Identity provider (Discord OAuth2) configuration

use confique::Config;
use serde::Deserialize;

/// How a completed provider callback hands tokens to the client
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum FlowMode {
    /// Callback marks the flow completed, the API client redeems it via finalize
    TwoStep,
    /// Callback issues tokens directly
    Direct,
}

impl TryFrom<String> for FlowMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "two-step" => Ok(Self::TwoStep),
            "direct" => Ok(Self::Direct),
            other => Err(format!(
                "unknown flow mode '{other}', expected 'two-step' or 'direct'"
            )),
        }
    }
}

/// OAuth2 configuration
#[derive(Debug, Config, Clone)]
pub struct OAuth2Config {
    /// Application client id
    #[config(env = "SENTINEL_OAUTH2_CLIENT_ID")]
    pub client_id: String,

    /// Application client secret
    #[config(env = "SENTINEL_OAUTH2_CLIENT_SECRET")]
    pub client_secret: String,

    /// Callback URL registered with the provider
    #[config(
        env = "SENTINEL_OAUTH2_REDIRECT_URL",
        default = "http://localhost:8080/oauth2/callback"
    )]
    pub redirect_url: String,

    /// Space separated scopes (default: "identify email guilds")
    #[config(env = "SENTINEL_OAUTH2_SCOPES", default = "identify email guilds")]
    pub scopes: String,

    #[config(
        env = "SENTINEL_OAUTH2_AUTHORIZE_URL",
        default = "https://discord.com/oauth2/authorize"
    )]
    pub authorize_url: String,

    #[config(
        env = "SENTINEL_OAUTH2_TOKEN_URL",
        default = "https://discord.com/api/oauth2/token"
    )]
    pub token_url: String,

    #[config(
        env = "SENTINEL_OAUTH2_API_BASE_URL",
        default = "https://discord.com/api/v10"
    )]
    pub api_base_url: String,

    /// Lifetime of a pending login flow in seconds (default: 600)
    #[config(env = "SENTINEL_OAUTH2_FLOW_TTL", default = 600)]
    pub flow_ttl: i64,

    /// "two-step" (default) or "direct"
    #[config(env = "SENTINEL_OAUTH2_FLOW_MODE", default = "two-step")]
    pub flow_mode: FlowMode,

    /// Where the browser is sent after a two-step callback
    #[config(env = "SENTINEL_OAUTH2_COMPLETION_REDIRECT")]
    pub completion_redirect: Option<String>,

    /// Permissions requested by the bot invite link (default: 8 = administrator)
    #[config(env = "SENTINEL_OAUTH2_BOT_PERMISSIONS", default = 8)]
    pub bot_permissions: u64,
}

impl OAuth2Config {
    /// Get scopes as a vector
    pub fn get_scopes(&self) -> Vec<String> {
        self.scopes
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn flow_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.flow_ttl)
    }
}

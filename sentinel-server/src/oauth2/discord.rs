//! Discord OAuth2 and REST client

use crate::config::OAuth2Config;
use crate::identity::RemoteGuild;
use crate::store::User;
use log::{debug, error, warn};
use reqwest::{Client, Response};
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use url::Url;

/// Errors that can occur while talking to the identity provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider refused the request, typically a bad or reused code
    #[error("provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("provider unavailable ({0})")]
    Unavailable(u16),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
    #[error("invalid provider URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    #[serde(default = "default_discriminator")]
    pub discriminator: String,
    pub avatar: Option<String>,
    #[serde(default)]
    pub verified: bool,
    pub email: Option<String>,
    #[serde(default)]
    pub flags: i64,
    pub banner: Option<String>,
    pub accent_color: Option<i64>,
    #[serde(default)]
    pub public_flags: i64,
}

fn default_discriminator() -> String {
    "0".to_string()
}

impl From<DiscordUser> for User {
    fn from(user: DiscordUser) -> Self {
        Self {
            discord_id: user.id,
            username: user.username,
            discriminator: user.discriminator,
            avatar: user.avatar,
            verified: user.verified,
            email: user.email,
            flags: user.flags,
            banner: user.banner,
            accent_color: user.accent_color,
            public_flags: user.public_flags,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DiscordGuild {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    #[serde(default)]
    pub owner: bool,
    #[serde(default, deserialize_with = "permissions_from_string_or_number")]
    pub permissions: i64,
}

impl From<DiscordGuild> for RemoteGuild {
    fn from(guild: DiscordGuild) -> Self {
        Self {
            discord_id: guild.id,
            name: guild.name,
            icon: guild.icon,
            is_owner: guild.owner,
            permissions: guild.permissions,
        }
    }
}

/// Discord sends permission bitfields as decimal strings; older API versions used numbers
fn permissions_from_string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Bitfield {
        Number(i64),
        Text(String),
    }

    match Bitfield::deserialize(deserializer)? {
        Bitfield::Number(value) => Ok(value),
        Bitfield::Text(text) => text.parse().map_err(de::Error::custom),
    }
}

#[derive(Clone)]
pub struct DiscordClient {
    client: Client,
    config: OAuth2Config,
}

impl DiscordClient {
    pub fn new(client: Client, config: OAuth2Config) -> Self {
        Self { client, config }
    }

    /// Authorization URL the browser is sent to, carrying `state`
    pub fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        let scope = self.config.get_scopes().join(" ");
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    /// Link that adds the bot to a guild
    pub fn invite_bot_url(&self) -> Result<String, ProviderError> {
        let permissions = self.config.bot_permissions.to_string();
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("permissions", permissions.as_str()),
                ("scope", "bot"),
            ],
        )?;
        Ok(url.into())
    }

    /// Trade an authorization code for a provider access token
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        debug!("Exchanging authorization code with {}", self.config.token_url);
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = read_json(response).await?;
        debug!("Code exchanged, granted scopes: {:?}", token.scope);
        Ok(token)
    }

    pub async fn current_user(&self, access_token: &str) -> Result<DiscordUser, ProviderError> {
        self.get_json("/users/@me", access_token).await
    }

    pub async fn current_user_guilds(
        &self,
        access_token: &str,
    ) -> Result<Vec<DiscordGuild>, ProviderError> {
        self.get_json("/users/@me/guilds", access_token).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path);
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
    let status = response.status();
    if status.is_server_error() {
        error!("Discord API error {}", status);
        return Err(ProviderError::Unavailable(status.as_u16()));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        warn!("Discord API rejected request {}: {}", status, message);
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(format!("JSON parse error: {e}")))
}

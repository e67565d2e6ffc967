//! Access/refresh token issuance and the refresh protocol

use crate::config::TokenConfig;
use crate::errors::ApiError;
use crate::session::{hash_secret, ClientMeta, Session, SessionError, SessionStore, Sessions};
use crate::token::{Payload, TokenError, TokenKind, TokenMaker};
use chrono::Duration;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials: {0}")]
    Unauthenticated(TokenError),
    #[error("refresh tokens cannot be used as access tokens")]
    NotAccessToken,
    #[error("session not found")]
    SessionNotFound,
    #[error("session is blocked")]
    Blocked,
    #[error("session does not match the presented token")]
    Mismatch,
    #[error("failed to issue token: {0}")]
    Issue(TokenError),
    #[error("session store error: {0}")]
    Session(SessionError),
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => Self::SessionNotFound,
            other => Self::Session(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(_)
            | AuthError::NotAccessToken
            | AuthError::Blocked
            | AuthError::Mismatch => ApiError::unauthorized(err),
            AuthError::SessionNotFound => ApiError::not_found(err),
            AuthError::Issue(_) | AuthError::Session(_) => ApiError::internal(err),
        }
    }
}

/// Tokens handed to a client after login or refresh
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TokenBundle {
    pub session_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub access_duration_ms: i64,
    pub refresh_duration_ms: i64,
}

#[derive(Clone)]
pub struct Authenticator {
    maker: TokenMaker,
    sessions: Sessions,
    access_duration: Duration,
    refresh_duration: Duration,
}

impl Authenticator {
    pub fn new(maker: TokenMaker, sessions: Sessions, config: &TokenConfig) -> Self {
        Self {
            maker,
            sessions,
            access_duration: config.access_duration(),
            refresh_duration: config.refresh_duration(),
        }
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn verify_access(&self, token: &str) -> Result<Payload, AuthError> {
        let payload = self
            .maker
            .verify_token(token)
            .map_err(AuthError::Unauthenticated)?;
        if payload.kind != TokenKind::Access {
            warn!("Refresh token {} presented as a bearer token", payload.id);
            return Err(AuthError::NotAccessToken);
        }
        Ok(payload)
    }

    /// Mint an access/refresh pair for `subject` and record the refresh session
    pub async fn issue(&self, subject: &str, client: &ClientMeta) -> Result<TokenBundle, AuthError> {
        let (access_token, _) = self
            .maker
            .create_token(subject, TokenKind::Access, self.access_duration)
            .map_err(AuthError::Issue)?;
        let (refresh_token, refresh_payload) = self
            .maker
            .create_token(subject, TokenKind::Refresh, self.refresh_duration)
            .map_err(AuthError::Issue)?;

        let session = Session::new(
            refresh_payload.id,
            subject,
            &refresh_token,
            client,
            refresh_payload.expired_at,
        );
        let session = self.sessions.put(session, self.refresh_duration).await?;
        debug!("Issued session {} for {}", session.id, subject);

        Ok(TokenBundle {
            session_id: session.id,
            access_token,
            refresh_token,
            access_duration_ms: self.access_duration.num_milliseconds(),
            refresh_duration_ms: self.refresh_duration.num_milliseconds(),
        })
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// The session behind the presented token is left untouched, so it stays
    /// usable until it expires or is blocked through [`Authenticator::revoke`].
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientMeta,
    ) -> Result<TokenBundle, AuthError> {
        let (payload, _) = self.load_session(refresh_token).await?;
        self.issue(&payload.subject, client).await
    }

    /// Block the session behind a refresh token
    pub async fn revoke(&self, refresh_token: &str) -> Result<Uuid, AuthError> {
        let (payload, session) = self.load_session(refresh_token).await?;
        self.sessions.block(session.id).await?;
        debug!("Revoked session {} for {}", session.id, payload.subject);
        Ok(session.id)
    }

    async fn load_session(&self, refresh_token: &str) -> Result<(Payload, Session), AuthError> {
        let payload = self
            .maker
            .verify_token(refresh_token)
            .map_err(AuthError::Unauthenticated)?;
        let session = self.sessions.get(payload.id).await?;

        if session.is_blocked {
            warn!("Refresh attempted on blocked session {}", session.id);
            return Err(AuthError::Blocked);
        }
        if session.subject != payload.subject || session.refresh_secret != hash_secret(refresh_token)
        {
            warn!("Refresh token does not match session {}", session.id);
            return Err(AuthError::Mismatch);
        }
        Ok((payload, session))
    }
}

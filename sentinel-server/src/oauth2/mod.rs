//! OAuth2 login flow bridging a browser redirect to an API client

use crate::auth::{AuthError, Authenticator, TokenBundle};
use crate::cache::{Cache, CacheBackend, CacheError};
use crate::config::{FlowMode, OAuth2Config};
use crate::errors::ApiError;
use crate::identity::{sync_identity, RemoteGuild, SyncError};
use crate::session::ClientMeta;
use crate::store::{Database, User};
use chrono::Duration;
use log::{debug, warn};
use std::sync::Arc;
use thiserror::Error;

pub mod discord;
pub mod flow;

pub use discord::{DiscordClient, ProviderError};
pub use flow::{claim_key, flow_key, generate_state, Flow, FlowStatus};

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("state not exists or expired")]
    NotFound,
    #[error("login flow is not completed yet")]
    NotCompleted,
    #[error("login flow was already used")]
    AlreadyUsed,
    #[error("identity provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("identity sync failed: {0}")]
    Sync(#[from] SyncError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::NotFound => ApiError::not_found(err),
            FlowError::NotCompleted => ApiError::unauthorized(err),
            FlowError::AlreadyUsed => ApiError::bad_request(err),
            FlowError::Provider(ProviderError::Rejected { .. }) => {
                ApiError::bad_request("identity provider rejected the authorization code")
            }
            FlowError::Provider(_) | FlowError::Sync(_) | FlowError::Cache(_) => {
                ApiError::internal(err)
            }
            FlowError::Auth(err) => err.into(),
        }
    }
}

/// Authorization URL plus the state that correlates its callback
#[derive(Debug, Clone, PartialEq)]
pub struct NewFlow {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// Two-step mode: the flow awaits finalize
    Completed { subject: String },
    /// Direct mode: the flow was consumed and tokens issued
    Issued(TokenBundle),
}

#[derive(Clone)]
pub struct FlowCoordinator {
    cache: Cache,
    store: Arc<Database>,
    discord: DiscordClient,
    auth: Authenticator,
    flow_ttl: Duration,
    mode: FlowMode,
}

impl FlowCoordinator {
    pub fn new(
        cache: Cache,
        store: Arc<Database>,
        discord: DiscordClient,
        auth: Authenticator,
        config: &OAuth2Config,
    ) -> Self {
        Self {
            cache,
            store,
            discord,
            auth,
            flow_ttl: config.flow_ttl(),
            mode: config.flow_mode,
        }
    }

    #[cfg(test)]
    pub fn with_flow_ttl(mut self, flow_ttl: Duration) -> Self {
        self.flow_ttl = flow_ttl;
        self
    }

    #[cfg(test)]
    pub fn with_mode(mut self, mode: FlowMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn invite_bot_url(&self) -> Result<String, FlowError> {
        Ok(self.discord.invite_bot_url()?)
    }

    /// Start a login: store a pending flow and build the provider URL
    pub async fn new_url(&self) -> Result<NewFlow, FlowError> {
        let state = generate_state();
        let flow = Flow::pending(self.flow_ttl);
        let url = self.discord.authorize_url(&state)?;

        if !self
            .cache
            .set_if_absent(&flow_key(&state), &flow, flow.remaining())
            .await?
        {
            // 256 random bits colliding means the RNG is broken
            return Err(FlowError::AlreadyUsed);
        }
        debug!("Created login flow expiring at {}", flow.expires_at);
        Ok(NewFlow { url, state })
    }

    /// Handle the provider redirect for `state`.
    ///
    /// Only one callback may drive a given flow. The claim is released if the
    /// callback fails or is cancelled, so the login can be retried while the
    /// flow is alive.
    pub async fn callback(
        &self,
        code: &str,
        state: &str,
        client: &ClientMeta,
    ) -> Result<CallbackOutcome, FlowError> {
        let flow = self.pending_flow(state).await?;

        let claim = claim_key(state);
        if !self.cache.set_if_absent(&claim, &true, flow.remaining()).await? {
            warn!("Rejected concurrent callback for a login flow");
            return Err(FlowError::AlreadyUsed);
        }
        let guard = ClaimGuard::new(self.cache.clone(), claim);

        let result = self.complete(code, state, &flow, client).await;
        match &result {
            Ok(_) => guard.keep(),
            Err(_) => guard.release().await,
        }
        result
    }

    /// Redeem a completed flow for tokens, exactly once.
    ///
    /// A pending flow is only read, never written, so polling is safe while
    /// its callback is in flight.
    pub async fn finalize(&self, state: &str, client: &ClientMeta) -> Result<TokenBundle, FlowError> {
        let key = flow_key(state);
        let peeked = self
            .cache
            .get::<Flow>(&key)
            .await?
            .filter(|flow| !flow.is_expired())
            .ok_or(FlowError::NotFound)?;
        if peeked.status == FlowStatus::Pending {
            return Err(FlowError::NotCompleted);
        }

        let flow = self
            .cache
            .take::<Flow>(&key)
            .await?
            .filter(|flow| !flow.is_expired())
            .ok_or(FlowError::NotFound)?;

        let subject = match &flow.status {
            FlowStatus::Completed { subject } => subject.clone(),
            FlowStatus::Pending => {
                self.restore(state, &flow).await;
                return Err(FlowError::NotCompleted);
            }
        };

        match self.auth.issue(&subject, client).await {
            Ok(bundle) => {
                debug!("Consumed login flow for {}", subject);
                Ok(bundle)
            }
            Err(e) => {
                self.restore(state, &flow).await;
                Err(e.into())
            }
        }
    }

    async fn pending_flow(&self, state: &str) -> Result<Flow, FlowError> {
        let flow = self
            .cache
            .get::<Flow>(&flow_key(state))
            .await?
            .filter(|flow| !flow.is_expired())
            .ok_or(FlowError::NotFound)?;
        match flow.status {
            FlowStatus::Pending => Ok(flow),
            FlowStatus::Completed { .. } => Err(FlowError::AlreadyUsed),
        }
    }

    async fn complete(
        &self,
        code: &str,
        state: &str,
        flow: &Flow,
        client: &ClientMeta,
    ) -> Result<CallbackOutcome, FlowError> {
        let token = self.discord.exchange_code(code).await?;
        let user: User = self.discord.current_user(&token.access_token).await?.into();
        let guilds: Vec<RemoteGuild> = self
            .discord
            .current_user_guilds(&token.access_token)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        sync_identity(self.store.as_ref(), &user, &guilds).await?;
        let subject = user.discord_id;

        match self.mode {
            FlowMode::TwoStep => {
                let completed = flow.completed(&subject);
                if !self
                    .cache
                    .set_if_present(&flow_key(state), &completed, completed.remaining())
                    .await?
                {
                    return Err(FlowError::NotFound);
                }
                debug!("Completed login flow for {}", subject);
                Ok(CallbackOutcome::Completed { subject })
            }
            FlowMode::Direct => {
                self.cache
                    .take::<Flow>(&flow_key(state))
                    .await?
                    .ok_or(FlowError::NotFound)?;
                let bundle = self.auth.issue(&subject, client).await?;
                debug!("Consumed login flow for {} at callback", subject);
                Ok(CallbackOutcome::Issued(bundle))
            }
        }
    }

    /// Put a taken flow back unless something else has written the key since
    async fn restore(&self, state: &str, flow: &Flow) {
        let remaining = flow.remaining();
        if remaining.is_zero() {
            return;
        }
        if let Err(e) = self
            .cache
            .set_if_absent(&flow_key(state), flow, remaining)
            .await
        {
            warn!("Failed to restore login flow: {}", e);
        }
    }
}

/// Holds a callback's claim on a flow.
///
/// Dropping an armed guard, as happens when the request future is cancelled
/// mid-callback, releases the claim in the background.
struct ClaimGuard {
    cache: Cache,
    key: String,
    armed: bool,
}

impl ClaimGuard {
    fn new(cache: Cache, key: String) -> Self {
        Self {
            cache,
            key,
            armed: true,
        }
    }

    /// Keep the claim so no later callback can drive the flow
    fn keep(mut self) {
        self.armed = false;
    }

    async fn release(mut self) {
        self.armed = false;
        if let Err(e) = self.cache.delete(&self.key).await {
            warn!("Failed to release login flow claim: {}", e);
        }
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cache = self.cache.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Releasing claim of a cancelled login callback");
                handle.spawn(async move {
                    if let Err(e) = cache.delete(&key).await {
                        warn!("Failed to release login flow claim: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime to release login flow claim, it expires with the flow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCache;
    use crate::config::SentinelConfig;
    use crate::permissions::ALL_PERMISSIONS;
    use crate::session::{CacheSessionStore, SessionStore, Sessions};
    use crate::store::memory::MemoryStore;
    use crate::store::Store;
    use crate::test_utils::mock_discord_login;
    use crate::token::TokenMaker;
    use http::StatusCode;
    use serde_json::json;
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        flows: FlowCoordinator,
        store: MemoryStore,
        mock: MockServer,
    }

    async fn harness() -> Harness {
        let mock = MockServer::start().await;
        let config = SentinelConfig::for_test_with_mocks(&mock);
        let cache = Cache::InMemory(InMemoryCache::new(16).unwrap());
        let store = MemoryStore::new();
        let auth = Authenticator::new(
            TokenMaker::new(&config.token.symmetric_key).unwrap(),
            Sessions::Cache(CacheSessionStore::new(cache.clone())),
            &config.token,
        );
        let flows = FlowCoordinator::new(
            cache,
            Arc::new(Database::InMemory(store.clone())),
            DiscordClient::new(reqwest::Client::new(), config.oauth2.clone()),
            auth,
            &config.oauth2,
        );
        Harness { flows, store, mock }
    }

    fn client() -> ClientMeta {
        ClientMeta::default()
    }

    async fn mock_owner_login(mock: &MockServer) {
        mock_discord_login(
            mock,
            json!({ "id": "100", "username": "owner" }),
            json!([
                { "id": "g1", "name": "owned", "owner": true, "permissions": "0" },
                { "id": "g2", "name": "joined", "owner": false, "permissions": "8" },
            ]),
        )
        .await;
    }

    /// Owner login where the Discord endpoint at `slow_path` answers after `delay`
    async fn mock_slow_owner_login(mock: &MockServer, slow_path: &str, delay: StdDuration) {
        mock.reset().await;
        let responses = [
            (
                "POST",
                "/api/oauth2/token",
                json!({ "access_token": "discord-access", "token_type": "Bearer" }),
            ),
            (
                "GET",
                "/api/users/@me",
                json!({ "id": "100", "username": "owner" }),
            ),
            (
                "GET",
                "/api/users/@me/guilds",
                json!([{ "id": "g1", "name": "owned", "owner": true, "permissions": "0" }]),
            ),
        ];
        for (verb, route, body) in responses {
            let mut template = ResponseTemplate::new(200).set_body_json(body);
            if route == slow_path {
                template = template.set_delay(delay);
            }
            Mock::given(method(verb))
                .and(path(route))
                .respond_with(template)
                .mount(mock)
                .await;
        }
    }

    #[tokio::test]
    async fn test_new_url_stores_pending_flow() {
        let h = harness().await;
        let new = h.flows.new_url().await.unwrap();

        assert!(new.url.contains(&format!("state={}", new.state)));
        let flow: Flow = h.flows.cache.get(&flow_key(&new.state)).await.unwrap().unwrap();
        assert_eq!(flow.status, FlowStatus::Pending);
    }

    #[tokio::test]
    async fn test_two_step_login() {
        let h = harness().await;
        mock_owner_login(&h.mock).await;
        let new = h.flows.new_url().await.unwrap();

        let outcome = h.flows.callback("code", &new.state, &client()).await.unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Completed {
                subject: "100".to_string()
            }
        );

        let store = Database::InMemory(h.store.clone());
        assert_eq!(
            store.relation("100", "g1").await.unwrap().unwrap().permissions,
            ALL_PERMISSIONS
        );
        assert_eq!(store.relation("100", "g2").await.unwrap().unwrap().permissions, 8);
        assert!(store.guild_config("g1").await.unwrap().is_some());

        let bundle = h.flows.finalize(&new.state, &client()).await.unwrap();
        assert_eq!(
            h.flows.auth.verify_access(&bundle.access_token).unwrap().subject,
            "100"
        );
        let session = h.flows.auth.sessions().get(bundle.session_id).await.unwrap();
        assert_eq!(session.subject, "100");

        // consumed
        assert!(matches!(
            h.flows.finalize(&new.state, &client()).await,
            Err(FlowError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_finalize_unknown_state() {
        let h = harness().await;
        let err = h.flows.finalize("nope", &client()).await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound));
        assert_eq!(ApiError::from(err).status_code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_finalize_pending_flow_is_kept() {
        let h = harness().await;
        let new = h.flows.new_url().await.unwrap();

        for _ in 0..2 {
            let err = h.flows.finalize(&new.state, &client()).await.unwrap_err();
            assert!(matches!(err, FlowError::NotCompleted));
            assert_eq!(ApiError::from(err).status_code, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_concurrent_finalize_redeems_once() {
        let h = harness().await;
        mock_owner_login(&h.mock).await;
        let new = h.flows.new_url().await.unwrap();
        h.flows.callback("code", &new.state, &client()).await.unwrap();

        let mut handles = vec![];
        for _ in 0..8 {
            let flows = h.flows.clone();
            let state = new.state.clone();
            handles.push(tokio::spawn(async move {
                flows.finalize(&state, &ClientMeta::default()).await.is_ok()
            }));
        }
        let mut redeemed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                redeemed += 1;
            }
        }
        assert_eq!(redeemed, 1);
    }

    #[tokio::test]
    async fn test_finalize_polled_during_callback() {
        let h = harness().await;
        mock_slow_owner_login(&h.mock, "/api/users/@me/guilds", StdDuration::from_millis(300))
            .await;
        let new = h.flows.new_url().await.unwrap();

        let callback = {
            let flows = h.flows.clone();
            let state = new.state.clone();
            tokio::spawn(async move {
                flows
                    .callback("code", &state, &ClientMeta::default())
                    .await
            })
        };

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        for _ in 0..3 {
            assert!(matches!(
                h.flows.finalize(&new.state, &client()).await,
                Err(FlowError::NotCompleted)
            ));
        }
        let flow: Flow = h.flows.cache.get(&flow_key(&new.state)).await.unwrap().unwrap();
        assert_eq!(flow.status, FlowStatus::Pending);

        let outcome = callback.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Completed {
                subject: "100".to_string()
            }
        );

        let bundle = h.flows.finalize(&new.state, &client()).await.unwrap();
        assert_eq!(
            h.flows.auth.verify_access(&bundle.access_token).unwrap().subject,
            "100"
        );
    }

    #[tokio::test]
    async fn test_cancelled_callback_releases_claim() {
        let h = harness().await;
        mock_slow_owner_login(&h.mock, "/api/oauth2/token", StdDuration::from_millis(500)).await;
        let new = h.flows.new_url().await.unwrap();

        let cancelled = tokio::time::timeout(
            StdDuration::from_millis(50),
            h.flows.callback("code", &new.state, &client()),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let claim: Option<bool> = h.flows.cache.get(&claim_key(&new.state)).await.unwrap();
        assert!(claim.is_none());

        mock_owner_login(&h.mock).await;
        assert!(h.flows.callback("code", &new.state, &client()).await.is_ok());
        assert!(h.flows.finalize(&new.state, &client()).await.is_ok());
    }

    #[tokio::test]
    async fn test_second_callback_is_rejected() {
        let h = harness().await;
        mock_owner_login(&h.mock).await;
        let new = h.flows.new_url().await.unwrap();

        h.flows.callback("code", &new.state, &client()).await.unwrap();
        let err = h.flows.callback("code", &new.state, &client()).await.unwrap_err();
        assert!(matches!(err, FlowError::AlreadyUsed));
        assert_eq!(ApiError::from(err).status_code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_callback_unknown_state() {
        let h = harness().await;
        let err = h.flows.callback("code", "nope", &client()).await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound));
    }

    #[tokio::test]
    async fn test_rejected_code_releases_claim() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant"
            })))
            .up_to_n_times(1)
            .mount(&h.mock)
            .await;
        let new = h.flows.new_url().await.unwrap();

        let err = h.flows.callback("bad", &new.state, &client()).await.unwrap_err();
        assert!(matches!(err, FlowError::Provider(ProviderError::Rejected { .. })));
        assert_eq!(ApiError::from(err).status_code, StatusCode::BAD_REQUEST);
        assert_eq!(h.store.row_counts().await, (0, 0, 0, 0));

        mock_owner_login(&h.mock).await;
        assert!(h.flows.callback("good", &new.state, &client()).await.is_ok());
    }

    #[tokio::test]
    async fn test_provider_outage_is_internal() {
        let h = harness().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth2/token"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&h.mock)
            .await;
        let new = h.flows.new_url().await.unwrap();

        let err = h.flows.callback("code", &new.state, &client()).await.unwrap_err();
        assert_eq!(
            ApiError::from(err).status_code,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_expired_flow_cannot_be_finalized() {
        let h = harness().await;
        let flows = h.flows.clone().with_flow_ttl(Duration::milliseconds(200));
        let new = flows.new_url().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(400)).await;

        assert!(matches!(
            flows.finalize(&new.state, &client()).await,
            Err(FlowError::NotFound)
        ));
        assert!(matches!(
            flows.callback("code", &new.state, &client()).await,
            Err(FlowError::NotFound)
        ));
        assert_eq!(h.store.row_counts().await, (0, 0, 0, 0));
    }

    #[tokio::test]
    async fn test_direct_mode_issues_at_callback() {
        let h = harness().await;
        mock_owner_login(&h.mock).await;
        let flows = h.flows.clone().with_mode(FlowMode::Direct);
        let new = flows.new_url().await.unwrap();

        let outcome = flows.callback("code", &new.state, &client()).await.unwrap();
        let CallbackOutcome::Issued(bundle) = outcome else {
            panic!("expected tokens from a direct callback");
        };
        assert_eq!(
            flows.auth.verify_access(&bundle.access_token).unwrap().subject,
            "100"
        );
        assert!(matches!(
            flows.finalize(&new.state, &client()).await,
            Err(FlowError::NotFound)
        ));
    }
}

use crate::auth::TokenBundle;
use crate::config::{FlowMode, SentinelConfig};
use crate::create_app;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use http::{Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test fixture running the whole application over in-memory backends.
///
/// Discord is replaced by a wiremock server, so a complete login can be
/// driven over HTTP:
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let tokens = fixture
///         .login(json!({ "id": "7", "username": "ada" }), json!([]))
///         .await;
///
///     let response = fixture.get("/users/me", Some(&tokens.access_token)).await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration the application was built with
    pub config: SentinelConfig,
    /// Mock server standing in for Discord
    pub discord_mock: MockServer,
    /// Shared state behind the router
    pub state: AppState,
    /// OpenAPI document generated from the routes
    pub api_doc: utoipa::openapi::OpenApi,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Creates a fixture after letting `modify` adjust the test configuration
    pub async fn with_config(modify: impl FnOnce(&mut SentinelConfig)) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let discord_mock = MockServer::start().await;
        let mut config = SentinelConfig::for_test_with_mocks(&discord_mock);
        modify(&mut config);

        let state = AppState::for_testing(&config);
        let (app, api_doc) = create_app(state.clone());

        Self {
            app,
            config,
            discord_mock,
            state,
            api_doc,
        }
    }

    /// Initializes the test logger; later calls are ignored
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Creates a request builder with JSON and user agent headers, plus a
    /// bearer token when one is given
    pub fn request_builder(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        token: Option<&str>,
    ) -> http::request::Builder {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Content-Type", "application/json")
            .header("User-Agent", "sentinel-tests");

        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        builder
    }

    pub async fn get(&self, uri: impl AsRef<str>, token: Option<&str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri, token)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn post<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        token: Option<&str>,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(Method::POST, uri, token)
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns the raw response, for header assertions
    pub async fn send_raw(&self, request: Request<Body>) -> Response<Body> {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// Sends a request and collects its status and JSON body.
    ///
    /// Empty or non-JSON bodies are reported as an empty object.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.send_raw(request).await;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse { status, json }
    }

    /// Makes the Discord mock answer a login as `user` belonging to `guilds`
    pub async fn mock_login(&self, user: Value, guilds: Value) {
        mock_discord_login(&self.discord_mock, user, guilds).await;
    }

    /// Drives a complete login over HTTP and returns the issued tokens
    pub async fn login(&self, user: Value, guilds: Value) -> TokenBundle {
        self.mock_login(user, guilds).await;

        let new_url = self.get("/oauth2/new_url", None).await;
        new_url.assert_ok();
        let state = new_url.json["state"]
            .as_str()
            .expect("new_url response has no state")
            .to_string();

        let callback = self
            .get(format!("/oauth2/callback?code=test-code&state={state}"), None)
            .await;
        callback.assert_ok();
        if self.config.oauth2.flow_mode == FlowMode::Direct {
            return callback.json_as();
        }

        let finalize = self
            .post("/auth/finalize", &json!({ "state": state }), None)
            .await;
        finalize.assert_ok();
        finalize.json_as()
    }
}

/// Mounts the Discord token, user and guild endpoints on `mock`.
///
/// Previously mounted mocks are dropped first so consecutive logins
/// can answer as different users.
pub async fn mock_discord_login(mock: &MockServer, user: Value, guilds: Value) {
    mock.reset().await;

    Mock::given(method("POST"))
        .and(path("/api/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "discord-access",
            "token_type": "Bearer",
            "expires_in": 604800,
            "refresh_token": "discord-refresh",
            "scope": "identify email guilds",
        })))
        .mount(mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/users/@me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user))
        .mount(mock)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/users/@me/guilds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(guilds))
        .mount(mock)
        .await;
}

/// Status and JSON body of a test request
pub struct TestResponse {
    pub status: StatusCode,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts the status code, printing the body on mismatch
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Deserializes the body, panicking if it does not match `T`
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const OAUTH2_TAG: &str = "OAuth2 API";
pub(crate) const AUTH_TAG: &str = "Auth API";
pub(crate) const GUILDS_TAG: &str = "Guilds API";
pub(crate) const USERS_TAG: &str = "Users API";

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi
            .components
            .get_or_insert_with(Default::default)
            .add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerAuth),
    security(("bearer" = [])),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = OAUTH2_TAG, description = "Discord login flow"),
        (name = AUTH_TAG, description = "Token issuance, refresh and revocation"),
        (name = GUILDS_TAG, description = "Guilds and their configuration"),
        (name = USERS_TAG, description = "The authenticated user"),
    ),
    info(
        title = "Sentinel API",
        description = "Per-guild configuration service behind Discord OAuth2",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFixture;

    #[tokio::test]
    async fn test_routes_are_documented() {
        let fixture = TestFixture::new().await;
        let paths = &fixture.api_doc.paths.paths;

        for path in [
            "/health",
            "/ready",
            "/oauth2/new_url",
            "/oauth2/callback",
            "/oauth2/invite_bot_url",
            "/auth/finalize",
            "/auth/refresh",
            "/auth/revoke",
            "/guilds/{id}",
            "/guilds/{id}/config",
            "/guild_configs/presets/{preset}",
            "/users/me",
            "/users/me/guilds",
            "/users/me/guilds/{id}",
        ] {
            assert!(paths.contains_key(path), "{path} is not documented");
        }

        let config = &paths["/guilds/{id}/config"];
        assert!(config.get.is_some());
        assert!(config.post.is_some());
        assert!(ApiDoc::openapi().tags.is_some());
    }
}

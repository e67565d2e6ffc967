mod auth;
mod authn_middleware;
mod client_meta;
mod guilds;
pub(crate) mod health;
mod oauth2;
mod users;

use crate::api::authn_middleware::authentication_middleware;
use crate::state::AppState;
use axum::middleware;
use utoipa_axum::router::OpenApiRouter;

/// Combines all API routes into a single router
pub(super) fn router(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(health::router())
        .merge(oauth2::router())
        .merge(auth::router())
        .merge(protected_routes(state))
}

/// Routes that require a valid access token
fn protected_routes(state: &AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(guilds::router())
        .merge(users::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authentication_middleware,
        ))
}

use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Basic health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    status: &'static str,
    details: Option<Value>,
    #[serde(skip)]
    status_code: StatusCode,
}

impl IntoResponse for Health {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "status": self.status
        });

        if let Some(Value::Object(obj)) = self.details {
            for (key, value) in obj {
                body[key] = value;
            }
        }

        (self.status_code, Json(body)).into_response()
    }
}

fn component_status(result: &Result<(), String>) -> &'static str {
    match result {
        Ok(()) => "healthy",
        Err(_) => "unhealthy",
    }
}

/// Basic health check handler
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is healthy", body = Health)
    )
)]
async fn health_check() -> Health {
    Health {
        status: "ok",
        details: None,
        status_code: StatusCode::OK,
    }
}

/// Readiness check handler
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is ready", body = Health),
        (status = 503, description = "Service is not ready", body = Health)
    )
)]
async fn ready_check(State(state): State<AppState>) -> Health {
    let readiness = state.health_check().await;
    let details = serde_json::json!({
        "cache_status": component_status(&readiness.cache),
        "database_status": component_status(&readiness.database),
    });

    if readiness.is_ready() {
        Health {
            status: "ok",
            details: Some(details),
            status_code: StatusCode::OK,
        }
    } else {
        Health {
            status: "error",
            details: Some(details),
            status_code: StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub(super) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(health_check))
        .routes(routes!(ready_check))
}

use crate::session::ClientMeta;
use axum::extract::{ConnectInfo, FromRequestParts};
use http::request::Parts;
use http::HeaderMap;
use std::convert::Infallible;
use std::net::SocketAddr;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    let first_hop = value.split(',').next()?.trim();
    (!first_hop.is_empty()).then(|| first_hop.to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = parts
            .headers
            .get(http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let client_ip = forwarded_for(&parts.headers)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();

        Ok(Self {
            user_agent,
            client_ip,
        })
    }
}

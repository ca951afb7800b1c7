use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use super::AppState;
use crate::domain::RequestContext;

/// Client address and user agent for session rows, audit entries and the
/// per-IP login limiter.
///
/// The address is the socket peer. `X-Forwarded-For` is honoured only when
/// the peer is a configured trusted proxy. Without connection info (for
/// example under `oneshot` in tests) the address is empty, which the
/// limiter treats as unknown.
#[derive(Debug, Clone)]
pub struct ClientMeta(pub RequestContext);

impl FromRequestParts<Arc<AppState>> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(Self(request_context(
            peer,
            &parts.headers,
            &state.config().security.auth_throttle.trusted_proxy_ips,
        )))
    }
}

#[must_use]
pub fn request_context(
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    trusted_proxies: &[String],
) -> RequestContext {
    let peer_ip = peer.map(|addr| addr.ip().to_canonical().to_string());

    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
    };

    let ip_address = match peer_ip {
        Some(ip) if trusted_proxies.iter().any(|p| p == &ip) => forwarded().unwrap_or(ip),
        Some(ip) => ip,
        None => String::new(),
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();

    RequestContext {
        ip_address,
        user_agent,
    }
}

// HTTP middleware

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use ipnet::IpNet;
use serde_json::json;
use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use super::AppState;

/// Address of the client behind the request.
///
/// `X-Forwarded-For` (first entry) and `X-Real-IP` are only honoured when
/// the peer itself is a trusted proxy, so clients cannot spoof their address.
pub fn client_ip(peer: Option<IpAddr>, headers: &HeaderMap, trusted: &[IpNet]) -> String {
    let trust_headers = peer.is_some_and(|ip| trusted.iter().any(|net| net.contains(&ip)));

    if trust_headers {
        let forwarded = headers
            .get("X-Forwarded-For")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
        if let Some(ip) = headers.get("X-Real-IP").and_then(|h| h.to_str().ok()) {
            return ip.to_string();
        }
    }

    peer.map_or_else(|| "unknown".to_string(), |ip| ip.to_string())
}

/// One access log event per request
pub async fn access_log(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());
    let client = client_ip(peer, request.headers(), &state.trusted_proxies);
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let version = request.version();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let response = next.run(request).await;

    tracing::info!(
        client_ip = %client,
        method = %method,
        path = %path,
        protocol = ?version,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        user_agent = %user_agent,
        "HTTP request"
    );
    response
}

/// Turn a handler panic into a 500 JSON response
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Page not found" })),
    )
        .into_response()
}

pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "message": "Method not allowed" })),
    )
        .into_response()
}

//! # Streamplay Relay (streamplay-relay)
//!
//! Pass-through relay for players that can only fetch from hosts that allow
//! cross-origin reads. A request for `/?target=<url>` is forwarded to
//! `<url>` and the upstream response is streamed back unchanged, except that
//! every response allows any origin.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const MISSING_TARGET: &str = "Error: 'target' query parameter is missing.";
pub const INVALID_TARGET: &str = "Error: Invalid target URL format.";
pub const FETCH_FAILED: &str = "Internal Server Error: Failed to fetch from target URL";

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Shared relay state
#[derive(Clone)]
pub struct RelayState {
    pub client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    pub target: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "streamplay-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Build the relay router
///
/// `/health` answers locally; every other path is relayed.
pub fn build_router(client: reqwest::Client) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .fallback(relay)
        .with_state(RelayState { client })
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Parse a relay target; only absolute http(s) URLs are accepted.
pub fn parse_target(target: &str) -> Option<reqwest::Url> {
    let url = reqwest::Url::parse(target).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

async fn relay(
    State(state): State<RelayState>,
    method: Method,
    Query(query): Query<RelayQuery>,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let Some(target) = query.target.filter(|t| !t.is_empty()) else {
        warn!("Request rejected: missing 'target' query parameter");
        return (StatusCode::BAD_REQUEST, MISSING_TARGET).into_response();
    };
    let Some(url) = parse_target(&target) else {
        warn!("Request rejected: invalid target URL {}", target);
        return (StatusCode::BAD_REQUEST, INVALID_TARGET).into_response();
    };

    info!("Relaying {} {}", method, url);
    let upstream = match state.client.request(method, url).send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!("Failed to fetch {}: {}", target, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, FETCH_FAILED).into_response();
        }
    };

    let status = upstream.status();
    let headers = forwarded_headers(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn forwarded_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if *name == header::ACCESS_CONTROL_ALLOW_ORIGIN || HOP_BY_HOP.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

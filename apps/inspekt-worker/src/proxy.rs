//! # Interception Proxy
//!
//! Converts between axum's request/response types and the owned
//! [`HttpRequest`]/[`HttpResponse`] values the cache engine works with.
//!
//! ## Request Mode
//! ```text
//! sec-fetch-mode: navigate ──────────────► Navigate
//! sec-fetch-mode: cors / no-cors / ... ──► as sent
//! no header, GET, Accept: text/html ────► Navigate
//! anything else ─────────────────────────► Cors
//! ```

use std::str::FromStr;

use axum::body::{Body, Bytes};
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use url::Url;

use inspekt_core::{HttpMethod, HttpRequest, RequestMode};
use inspekt_sync::{ResponseSource, Served, SyncResult};

/// Largest request body the proxy buffers.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Response header naming where the response came from.
pub const SOURCE_HEADER: &str = "x-inspekt-source";

const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "content-length",
];

const SKIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "trailer",
    "content-length",
];

/// Infers how the page issued the request.
pub fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    match headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
        Some("navigate") => return RequestMode::Navigate,
        Some("same-origin") => return RequestMode::SameOrigin,
        Some("no-cors") => return RequestMode::NoCors,
        Some("cors") => return RequestMode::Cors,
        _ => {}
    }

    let wants_html = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));

    if method == Method::GET && wants_html {
        RequestMode::Navigate
    } else {
        RequestMode::default()
    }
}

/// Rebuilds an intercepted request against the remote origin.
pub fn to_http_request(
    origin: &Url,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> SyncResult<HttpRequest> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    // A leading `//` would make the join scheme-relative
    let path = format!("/{}", path_and_query.trim_start_matches('/'));
    let url = origin.join(&path)?;
    let mode = request_mode(method, headers);

    let headers = headers
        .iter()
        .filter(|(name, _)| !SKIPPED_REQUEST_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Ok(HttpRequest {
        method: HttpMethod::from_str(method.as_str())?,
        url,
        headers,
        body: (!body.is_empty()).then(|| body.to_vec()),
        mode,
    })
}

/// Turns a served response into an axum response tagged with its source.
pub fn into_response(served: Served) -> Response {
    let Served { response, source } = served;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        if SKIPPED_RESPONSE_HEADERS
            .iter()
            .any(|h| name.eq_ignore_ascii_case(h))
        {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }

    builder
        .header(SOURCE_HEADER, source_name(source))
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn source_name(source: ResponseSource) -> &'static str {
    match source {
        ResponseSource::Network => "network",
        ResponseSource::Cache => "cache",
        ResponseSource::OfflinePage => "offline-page",
        ResponseSource::Synthetic => "synthetic",
    }
}

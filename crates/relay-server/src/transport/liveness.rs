//! Plain-HTTP liveness response.
//!
//! Anything on the relay port that is not a WebSocket upgrade is answered with
//! a fixed `200 OK` text body.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

/// Body served to non-upgrade requests.
pub const LIVENESS_BODY: &str = "chat relay is running";

/// Whether the request asks for a WebSocket upgrade at all.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::UPGRADE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
}

/// The liveness response.
pub fn response() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        LIVENESS_BODY,
    )
        .into_response()
}

//! Correlation IDs tying a client call to its backend calls in logs and traces.

use http::HeaderMap;
use uuid::Uuid;

/// Header carrying the correlation ID on backend requests and client responses.
pub const CORRELATION_HEADER: &str = "x-bundler-proxy-request-id";

/// Generate a new correlation ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reuse a caller-supplied correlation ID when it is a UUID, otherwise
/// generate one.
pub fn from_headers(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .map(|id| id.to_string())
        .unwrap_or_else(generate_id)
}

//! Error taxonomy for startup and request dispatch.

use std::time::Duration;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;

use crate::backend::BackendVersion;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Missing or unusable backend address. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A backend never reported its entry points in time. Fatal at startup.
    #[error("{backend} bundler did not report supported entry points within {timeout:?}")]
    DiscoveryTimeout {
        backend: BackendVersion,
        timeout: Duration,
    },

    #[error("malformed JSON-RPC request: {0}")]
    MalformedRequest(#[source] serde_json::Error),

    #[error("{method} called with unsupported entry point {entry_point:?}")]
    UnsupportedEntryPoint {
        method: String,
        entry_point: Option<String>,
    },

    #[error("{backend} bundler request failed: {source}")]
    BackendTransport {
        backend: BackendVersion,
        #[source]
        source: reqwest::Error,
    },

    #[error("{backend} bundler returned an undecodable response: {source}")]
    Decode {
        backend: BackendVersion,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MalformedRequest(_) | ProxyError::UnsupportedEntryPoint { .. } => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::BackendTransport { source, .. } if source.is_timeout() => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ProxyError::BackendTransport { .. } | ProxyError::Decode { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::Config(_) | ProxyError::DiscoveryTimeout { .. } | ProxyError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    /// Client errors carry an empty body; upstream failures get a short
    /// plain-text reason.
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ProxyError::MalformedRequest(_) | ProxyError::UnsupportedEntryPoint { .. } => {
                status.into_response()
            }
            ProxyError::BackendTransport { .. } if status == StatusCode::GATEWAY_TIMEOUT => {
                (status, "upstream timeout").into_response()
            }
            ProxyError::BackendTransport { .. } => {
                (status, "upstream connection error").into_response()
            }
            ProxyError::Decode { .. } => (status, "upstream returned invalid response").into_response(),
            _ => (status, "internal error").into_response(),
        }
    }
}

//! Raw byte forwarding to a bundler backend.
//!
//! Two modes: `stream` relays the backend response to the client as it
//! arrives; `capture` reads the whole response into a [`CapturedResponse`] so
//! the caller can inspect it before anything reaches the client.

use std::time::Instant;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use tracing::Instrument;

use super::correlation::CORRELATION_HEADER;
use crate::backend::Backend;
use crate::error::ProxyError;
use crate::rpc::RpcResponse;

/// Headers that should NOT be forwarded (hop-by-hop headers).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Headers not copied when a buffered body is framed again: hop-by-hop, the
/// length (recomputed from the buffer) and our own correlation header.
fn is_rewritten(name: &HeaderName) -> bool {
    is_hop_by_hop(name) || name.as_str() == CORRELATION_HEADER || *name == CONTENT_LENGTH
}

/// A fully read backend response.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CapturedResponse {
    /// Decode the body as a JSON-RPC response envelope.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<RpcResponse<T>, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Whether the body is a response envelope with a non-null `result`.
    pub fn has_result(&self) -> bool {
        self.decode::<serde_json::Value>()
            .map(|resp| resp.result.is_some())
            .unwrap_or(false)
    }

    /// Replay to the client: same status, headers and body, with
    /// `content-length` recomputed from the body.
    pub fn into_response(self, correlation_id: &str) -> Response {
        let mut builder = Response::builder().status(self.status);

        for (name, value) in self.headers.iter() {
            if is_rewritten(name) {
                continue;
            }
            builder = builder.header(name, value);
        }

        builder = builder
            .header(CONTENT_LENGTH, self.body.len())
            .header(CORRELATION_HEADER, correlation_header_value(correlation_id));

        builder.body(Body::from(self.body)).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to build replayed response");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        })
    }
}

/// Forward `body` to `backend` and stream its response back verbatim.
///
/// Transport failures become 502/504 responses.
pub async fn stream(
    backend: &Backend,
    headers: &HeaderMap,
    body: Bytes,
    correlation_id: &str,
) -> Response {
    let span = bundler_tracing::backend_forward_span!(correlation_id, backend.version(), "stream");
    let start = Instant::now();

    async {
        let upstream_result = build_request(backend, headers, body, correlation_id)
            .send()
            .await;
        let upstream_resp = match upstream_result {
            Ok(resp) => resp,
            Err(source) => {
                let err = ProxyError::BackendTransport {
                    backend: backend.version(),
                    source,
                };
                record_outcome(start, err.status());
                tracing::error!(error = %err, "Backend forward failed");
                return err.into_response();
            }
        };

        let status = upstream_resp.status();
        record_outcome(start, status);

        let mut response_builder = Response::builder().status(status);
        for (name, value) in upstream_resp.headers().iter() {
            if is_hop_by_hop(name) || name.as_str() == CORRELATION_HEADER {
                continue;
            }
            response_builder = response_builder.header(name, value);
        }
        response_builder =
            response_builder.header(CORRELATION_HEADER, correlation_header_value(correlation_id));

        let body = Body::from_stream(upstream_resp.bytes_stream());

        response_builder.body(body).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to build response");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        })
    }
    .instrument(span)
    .await
}

/// Forward `body` to `backend` and read the whole response into memory.
pub async fn capture(
    backend: &Backend,
    headers: &HeaderMap,
    body: Bytes,
    correlation_id: &str,
) -> Result<CapturedResponse, ProxyError> {
    let span = bundler_tracing::backend_forward_span!(correlation_id, backend.version(), "capture");
    let start = Instant::now();

    async {
        let transport = |source| ProxyError::BackendTransport {
            backend: backend.version(),
            source,
        };

        let upstream_resp = build_request(backend, headers, body, correlation_id)
            .send()
            .await
            .map_err(transport)?;

        let status = upstream_resp.status();
        let headers = upstream_resp.headers().clone();
        let body = upstream_resp.bytes().await.map_err(transport)?;
        record_outcome(start, status);

        Ok(CapturedResponse {
            status,
            headers,
            body,
        })
    }
    .instrument(span)
    .await
}

fn build_request(
    backend: &Backend,
    headers: &HeaderMap,
    body: Bytes,
    correlation_id: &str,
) -> reqwest::RequestBuilder {
    let mut req_builder = backend
        .client()
        .post(backend.url().clone())
        .body(body)
        .header(CORRELATION_HEADER, correlation_id);

    // Forward non-hop-by-hop headers from the original request
    for (name, value) in headers.iter() {
        if is_rewritten(name) {
            continue;
        }
        req_builder = req_builder.header(name, value);
    }
    req_builder
}

fn record_outcome(start: Instant, status: StatusCode) {
    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);
    tracing::Span::current().record("status", status.as_u16());
    tracing::info!(status = status.as_u16(), latency_ms = latency, "Forward complete");
}

fn correlation_header_value(correlation_id: &str) -> HeaderValue {
    HeaderValue::from_str(correlation_id).unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::backend::BackendVersion;
    use http::header::CONTENT_TYPE;
    use wiremock::matchers::{body_string, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> Backend {
        Backend::new(
            BackendVersion::V06,
            server.uri().parse().unwrap(),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn test_capture_keeps_status_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string("{\"x\":1}"))
            .and(header("x-client", "abc"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("x-upstream", "v06")
                    .set_body_string(r#"{"id":1,"jsonrpc":"2.0","result":{"ok":true}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-client", HeaderValue::from_static("abc"));
        headers.insert("connection", HeaderValue::from_static("keep-alive"));

        let captured = capture(&backend(&server), &headers, Bytes::from_static(b"{\"x\":1}"), "cid")
            .await
            .unwrap();
        assert_eq!(captured.status, StatusCode::ACCEPTED);
        assert_eq!(captured.headers.get("x-upstream").unwrap(), "v06");
        assert!(captured.has_result());
    }

    #[tokio::test]
    async fn test_capture_transport_error() {
        let backend = Backend::new(
            BackendVersion::V06,
            "http://127.0.0.1:9".parse().unwrap(),
            reqwest::Client::new(),
        );
        let err = capture(&backend, &HeaderMap::new(), Bytes::new(), "cid")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::BackendTransport {
                backend: BackendVersion::V06,
                ..
            }
        ));
    }

    #[test]
    fn test_has_result() {
        let captured = |body: &'static str| CapturedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        };
        assert!(captured(r#"{"id":1,"jsonrpc":"2.0","result":"0x1"}"#).has_result());
        assert!(!captured(r#"{"id":1,"jsonrpc":"2.0","result":null}"#).has_result());
        assert!(!captured(r#"{"id":1,"jsonrpc":"2.0"}"#).has_result());
        assert!(!captured("<html>bad gateway</html>").has_result());
    }

    #[tokio::test]
    async fn test_replay_recomputes_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        let captured = CapturedResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(b"{\"result\":1}"),
        };

        let resp = captured.into_response("cid");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_LENGTH], "12");
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(resp.headers()[CORRELATION_HEADER], "cid");
        assert!(resp.headers().get("transfer-encoding").is_none());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{\"result\":1}");
    }

    #[tokio::test]
    async fn test_stream_relays_backend_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("relayed"))
            .expect(1)
            .mount(&server)
            .await;

        let resp = stream(&backend(&server), &HeaderMap::new(), Bytes::from_static(b"{}"), "cid").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"relayed");
    }

    #[tokio::test]
    async fn test_stream_transport_error_is_bad_gateway() {
        let backend = Backend::new(
            BackendVersion::V07,
            "http://127.0.0.1:9".parse().unwrap(),
            reqwest::Client::new(),
        );
        let resp = stream(&backend, &HeaderMap::new(), Bytes::new(), "cid").await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_stream_relays_headers_without_hop_by_hop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-bundler", "rundler")
                    .insert_header("content-type", "application/json")
                    .insert_header("connection", "close")
                    .insert_header("keep-alive", "timeout=5")
                    .set_body_string(r#"{"id":1,"jsonrpc":"2.0","result":"0x1"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let resp = stream(&backend(&server), &HeaderMap::new(), Bytes::from_static(b"{}"), "cid").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-bundler"], "rundler");
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(resp.headers()[CORRELATION_HEADER], "cid");
        assert!(resp.headers().get("connection").is_none());
        assert!(resp.headers().get("keep-alive").is_none());
    }

    #[tokio::test]
    async fn test_stream_does_not_forward_inbound_host() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("client-facing.example"));
        headers.insert("x-client", HeaderValue::from_static("abc"));

        let resp = stream(&backend(&server), &headers, Bytes::from_static(b"{}"), "cid").await;
        assert_eq!(resp.status(), StatusCode::OK);

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        let host = received[0].headers.get("host").unwrap().to_str().unwrap();
        assert_ne!(host, "client-facing.example");
        assert_eq!(host, server.address().to_string());
        assert_eq!(received[0].headers.get("x-client").unwrap(), "abc");
        assert_eq!(received[0].headers.get(CORRELATION_HEADER).unwrap(), "cid");
    }

    #[tokio::test]
    async fn test_stream_timeout_is_gateway_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let backend = Backend::new(BackendVersion::V07, server.uri().parse().unwrap(), client);

        let resp = stream(&backend, &HeaderMap::new(), Bytes::from_static(b"{}"), "cid").await;
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"upstream timeout");
    }
}

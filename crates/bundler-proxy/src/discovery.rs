//! Startup discovery of the entry points each bundler serves.
//!
//! Polls `eth_supportedEntryPoints` until the backend answers with a non-empty
//! list or the deadline passes. Runs once; the result is never refreshed.

use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use crate::backend::Backend;
use crate::error::ProxyError;
use crate::routing::EntryPointSet;
use crate::rpc::{RpcRequest, RpcResponse, SUPPORTED_ENTRY_POINTS};

/// Poll `backend` every `poll_interval` until it reports at least one entry
/// point, failing with [`ProxyError::DiscoveryTimeout`] after `timeout`.
pub async fn discover(
    backend: &Backend,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<EntryPointSet, ProxyError> {
    let span = bundler_tracing::discovery_span!(backend.version(), backend.url());

    async {
        let deadline = Instant::now() + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            tracing::Span::current().record("attempts", attempts);
            tracing::info!(attempt = attempts, "Requesting supported entry points");

            match tokio::time::timeout_at(deadline, fetch_entry_points(backend)).await {
                Ok(Ok(entry_points)) if !entry_points.is_empty() => {
                    tracing::Span::current().record("entry_points", entry_points.len());
                    tracing::info!(entry_points = ?entry_points, "Entry points discovered");
                    return Ok(entry_points);
                }
                Ok(Ok(_)) => tracing::warn!("Bundler reported no entry points yet"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Entry point discovery attempt failed"),
                Err(_) => break,
            }

            let next = Instant::now() + poll_interval;
            if next >= deadline {
                break;
            }
            tokio::time::sleep_until(next).await;
        }

        tracing::error!(attempts, timeout_secs = timeout.as_secs_f64(), "Entry point discovery timed out");
        Err(ProxyError::DiscoveryTimeout {
            backend: backend.version(),
            timeout,
        })
    }
    .instrument(span)
    .await
}

/// One `eth_supportedEntryPoints` round trip. An absent or null `result`
/// comes back as an empty set.
async fn fetch_entry_points(backend: &Backend) -> Result<EntryPointSet, ProxyError> {
    let request = RpcRequest::new(1, SUPPORTED_ENTRY_POINTS, Vec::new());
    let transport = |source| ProxyError::BackendTransport {
        backend: backend.version(),
        source,
    };

    let body = backend
        .client()
        .post(backend.url().clone())
        .json(&request)
        .send()
        .await
        .map_err(transport)?
        .bytes()
        .await
        .map_err(transport)?;

    let response: RpcResponse<Vec<String>> =
        serde_json::from_slice(&body).map_err(|source| ProxyError::Decode {
            backend: backend.version(),
            source,
        })?;

    Ok(EntryPointSet::new(response.result.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendVersion;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const POLL: Duration = Duration::from_millis(20);

    fn backend(server: &MockServer) -> Backend {
        Backend::new(
            BackendVersion::V07,
            server.uri().parse().unwrap(),
            reqwest::Client::new(),
        )
    }

    fn entry_points_reply(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"id": 1, "jsonrpc": "2.0", "result": result}))
    }

    #[tokio::test]
    async fn test_discovers_entry_points_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_supportedEntryPoints", "params": []})))
            .respond_with(entry_points_reply(json!(["0xB", "0xA"])))
            .expect(1)
            .mount(&server)
            .await;

        let set = discover(&backend(&server), POLL, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["0xB", "0xA"]);
    }

    #[tokio::test]
    async fn test_retries_until_non_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(entry_points_reply(json!([])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("starting"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(entry_points_reply(json!(["0xA"])))
            .mount(&server)
            .await;

        let set = discover(&backend(&server), POLL, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_wrong_result_shape_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(entry_points_reply(json!([1, 2, 3])))
            .mount(&server)
            .await;

        let err = discover(&backend(&server), POLL, Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::DiscoveryTimeout {
                backend: BackendVersion::V07,
                ..
            }
        ));
        assert!(server.received_requests().await.unwrap().len() > 1);
    }

    #[tokio::test]
    async fn test_null_result_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(entry_points_reply(serde_json::Value::Null))
            .mount(&server)
            .await;

        let result = discover(&backend(&server), POLL, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ProxyError::DiscoveryTimeout { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_backend_times_out() {
        // Nothing listens on port 9 of the loopback interface.
        let backend = Backend::new(
            BackendVersion::V06,
            "http://127.0.0.1:9".parse().unwrap(),
            reqwest::Client::new(),
        );
        let result = discover(&backend, POLL, Duration::from_millis(100)).await;
        assert!(matches!(
            result,
            Err(ProxyError::DiscoveryTimeout {
                backend: BackendVersion::V06,
                ..
            })
        ));
    }
}

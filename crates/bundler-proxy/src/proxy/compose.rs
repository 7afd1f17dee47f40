//! Per-request dispatch: parse, classify, call the backend(s) and compose the
//! single response the client receives.

use std::sync::Arc;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use tracing::Instrument;

use super::correlation;
use super::forward;
use crate::backend::BackendVersion;
use crate::classify::{classify, select_by_entry_point, Strategy};
use crate::error::ProxyError;
use crate::routing::RoutingTable;
use crate::rpc::{EntryPointsResponse, RpcRequest};
use crate::stats::ProxyStats;

/// Routes JSON-RPC calls across the two bundlers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: Arc<RoutingTable>,
    stats: ProxyStats,
}

impl Dispatcher {
    pub fn new(routes: Arc<RoutingTable>, stats: ProxyStats) -> Self {
        Self { routes, stats }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Handle one inbound call. `body` is the buffered request body; it is
    /// re-sent unmodified to whichever backend(s) the call needs.
    pub async fn handle(&self, headers: &HeaderMap, body: Bytes) -> Response {
        let correlation_id = correlation::from_headers(headers);
        self.stats.inc_requests();

        let request: RpcRequest = match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => return self.reject(ProxyError::MalformedRequest(e), &correlation_id),
        };

        let strategy = classify(&request.method);
        let span = bundler_tracing::rpc_request_span!(&correlation_id, &request.method);
        span.record("strategy", strategy.name());

        async {
            match strategy {
                Strategy::Aggregate => self.aggregate(&request),
                Strategy::Fixed(version) => {
                    self.stream(version, headers, body, &correlation_id).await
                }
                Strategy::ByEntryPoint { index } => {
                    match select_by_entry_point(&request, index, &self.routes) {
                        Ok(version) => {
                            if let Some(entry_point) = request.string_param(index) {
                                tracing::Span::current().record("entry_point", entry_point);
                            }
                            self.stream(version, headers, body, &correlation_id).await
                        }
                        Err(e) => self.reject(e, &correlation_id),
                    }
                }
                Strategy::Fallback { primary, secondary } => {
                    self.fallback(primary, secondary, headers, body, &correlation_id)
                        .await
                }
                Strategy::Fanout { secondary, primary } => {
                    self.fanout(secondary, primary, headers, body, &correlation_id)
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Answer `eth_supportedEntryPoints` from the discovered sets.
    fn aggregate(&self, request: &RpcRequest) -> Response {
        self.stats.inc_aggregate();

        let reply = EntryPointsResponse {
            id: request.id,
            jsonrpc: &request.jsonrpc,
            result: self.routes.all_entry_points().collect(),
        };
        let body = match serde_json::to_vec(&reply) {
            Ok(body) => body,
            Err(e) => {
                let err = ProxyError::Encode(e);
                tracing::error!(error = %err, "Failed to encode entry point list");
                return err.into_response();
            }
        };

        Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build response");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            })
    }

    async fn stream(
        &self,
        version: BackendVersion,
        headers: &HeaderMap,
        body: Bytes,
        correlation_id: &str,
    ) -> Response {
        self.stats.inc_forward(version);
        forward::stream(self.routes.backend(version), headers, body, correlation_id).await
    }

    /// Replay `primary`'s answer if it has a result, otherwise stream
    /// `secondary`'s. A failed or undecodable primary call counts as no result.
    async fn fallback(
        &self,
        primary: BackendVersion,
        secondary: BackendVersion,
        headers: &HeaderMap,
        body: Bytes,
        correlation_id: &str,
    ) -> Response {
        self.stats.inc_forward(primary);
        let backend = self.routes.backend(primary);

        match forward::capture(backend, headers, body.clone(), correlation_id).await {
            Ok(captured) if captured.has_result() => return captured.into_response(correlation_id),
            Ok(captured) => tracing::debug!(
                backend = %primary,
                status = captured.status.as_u16(),
                "No result from primary bundler, falling back"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "Primary bundler call failed, falling back"
            ),
        }

        self.stats.inc_fallbacks();
        self.stream(secondary, headers, body, correlation_id).await
    }

    /// Send to `secondary` and drop its answer, then stream `primary`'s.
    async fn fanout(
        &self,
        secondary: BackendVersion,
        primary: BackendVersion,
        headers: &HeaderMap,
        body: Bytes,
        correlation_id: &str,
    ) -> Response {
        self.stats.inc_forward(secondary);
        let backend = self.routes.backend(secondary);

        match forward::capture(backend, headers, body.clone(), correlation_id).await {
            Ok(captured) if captured.status.is_success() => tracing::debug!(
                backend = %secondary,
                status = captured.status.as_u16(),
                "Fanout call complete, response discarded"
            ),
            Ok(captured) => {
                self.stats.inc_fanout_failures();
                tracing::warn!(
                    backend = %secondary,
                    status = captured.status.as_u16(),
                    "Fanout call returned an error status"
                );
            }
            Err(e) => {
                self.stats.inc_fanout_failures();
                tracing::warn!(error = %e, "Fanout call failed");
            }
        }

        self.stream(primary, headers, body, correlation_id).await
    }

    fn reject(&self, err: ProxyError, correlation_id: &str) -> Response {
        self.stats.inc_rejected();
        tracing::warn!(correlation_id = %correlation_id, error = %err, "Rejecting request");
        err.into_response()
    }
}

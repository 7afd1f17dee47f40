//! Span constructors for bundler-proxy instrumentation.

/// Span for one inbound JSON-RPC call.
///
/// `strategy` is recorded once the request has been classified.
#[macro_export]
macro_rules! rpc_request_span {
    ($correlation_id:expr, $method:expr) => {
        tracing::info_span!(
            "rpc_request",
            correlation_id = %$correlation_id,
            rpc.method = %$method,
            strategy = tracing::field::Empty,
            entry_point = tracing::field::Empty,
        )
    };
}

/// Span for a single call to one bundler backend.
///
/// `mode` is `"stream"` or `"capture"`.
#[macro_export]
macro_rules! backend_forward_span {
    ($correlation_id:expr, $backend:expr, $mode:expr) => {
        tracing::info_span!(
            "backend_forward",
            correlation_id = %$correlation_id,
            backend = %$backend,
            mode = $mode,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Span for the startup entry point discovery of one backend.
#[macro_export]
macro_rules! discovery_span {
    ($backend:expr, $url:expr) => {
        tracing::info_span!(
            "entry_point_discovery",
            backend = %$backend,
            url = %$url,
            attempts = tracing::field::Empty,
            entry_points = tracing::field::Empty,
        )
    };
}

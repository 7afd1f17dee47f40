//! bundler-proxy: one JSON-RPC endpoint in front of a v0.6 and a v0.7
//! ERC-4337 bundler, routing each call by method and entry point.

mod backend;
mod classify;
mod config;
mod discovery;
mod error;
mod proxy;
mod routing;
mod rpc;
mod server;
mod stats;

use std::sync::Arc;
use std::time::Duration;

use backend::{Backend, BackendVersion};
use config::ProxyConfig;
use proxy::compose::Dispatcher;
use routing::{Route, RoutingTable};
use server::AppState;
use stats::ProxyStats;

fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("BUNDLER_PROXY_CONFIG").ok())
        .unwrap_or_else(|| "bundler-proxy.toml".to_string());

    let listen_override = args
        .iter()
        .position(|a| a == "--listen")
        .and_then(|i| args.get(i + 1).cloned());

    let mut config = ProxyConfig::load(&config_path)?;
    if let Some(addr) = listen_override {
        config.server.listen_address = addr;
    }

    // The tonic OTLP exporter needs a reactor, so build the runtime before tracing
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = bundler_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            otlp_export = tracing_guard.exporting(),
            listen_address = %config.server.listen_address,
            v06_url = ?config.backends.v06_url,
            v07_url = ?config.backends.v07_url,
            "Starting bundler-proxy"
        );

        let state = match bootstrap(config).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "Startup failed, not serving");
                return Err(e);
            }
        };
        let result = server::run(state).await;
        drop(tracing_guard);
        result
    })
}

/// Validate backend addresses and discover entry points. The listener is
/// only bound once this succeeds for both backends.
async fn bootstrap(config: ProxyConfig) -> anyhow::Result<AppState> {
    let v06_url = config.backend_url(BackendVersion::V06)?;
    let v07_url = config.backend_url(BackendVersion::V07)?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.backends.timeout_secs))
        .build()?;
    let v06 = Backend::new(BackendVersion::V06, v06_url, client.clone());
    let v07 = Backend::new(BackendVersion::V07, v07_url, client);

    let poll_interval = config.discovery.poll_interval();
    let timeout = config.discovery.timeout();
    let (v06_entry_points, v07_entry_points) = tokio::try_join!(
        discovery::discover(&v06, poll_interval, timeout),
        discovery::discover(&v07, poll_interval, timeout),
    )?;

    let routes = RoutingTable::new(
        Route {
            backend: v06,
            entry_points: v06_entry_points,
        },
        Route {
            backend: v07,
            entry_points: v07_entry_points,
        },
    );

    let stats = ProxyStats::new();
    let dispatcher = Dispatcher::new(Arc::new(routes), stats.clone());
    tracing::info!(
        entry_points = dispatcher.routes().all_entry_points().count(),
        "Routing table ready"
    );

    Ok(AppState {
        config,
        dispatcher,
        stats,
    })
}

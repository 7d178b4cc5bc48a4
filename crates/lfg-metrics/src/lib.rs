use std::env;
use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// Search requests received, labelled by `outcome` (`ok`, `store_error`, `bad_request`).
pub const SEARCH_REQUESTS_TOTAL: &str = "lfg_search_requests_total";
/// Number of players returned per search (before pagination).
pub const SEARCH_RESULTS: &str = "lfg_search_results";
/// Collaborator failures surfaced while searching.
pub const SEARCH_STORE_ERRORS_TOTAL: &str = "lfg_search_store_errors_total";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn resolve_port(raw: Option<String>, default_port: u16) -> u16 {
    raw.and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(default_port)
}

/// Start the Prometheus exporter on `0.0.0.0:<port>`, once per process.
///
/// The port comes from `port_env` when it holds a valid non-zero port, else
/// `default_port`. A failed start is logged and leaves the process running
/// with metrics recorded into the no-op recorder.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = resolve_port(env::var(port_env).ok(), default_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    match PrometheusBuilder::new().with_http_listener(addr).install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            info!(metrics_port = port, "started prometheus exporter");
        }
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to start prometheus exporter");
        }
    }

    PROMETHEUS_HANDLE.get()
}

//! Observability wiring for the resource server.
//!
//! # Purpose
//! Installs the tracing subscriber and the Prometheus metrics recorder, and
//! serves the `/metrics` scrape endpoint on its own listener.
//!
//! # Notes
//! Initialization is guarded by `OnceLock` to keep startup idempotent in tests.
use metrics_exporter_prometheus::PrometheusBuilder;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static OBS_INIT: OnceLock<()> = OnceLock::new();

pub const AUTHZ_DECISIONS_TOTAL: &str = "gatekeeper_authz_decisions_total";

pub fn init_observability(service_name: &str) -> PrometheusHandle {
    OBS_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer();
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init();
        tracing::debug!(service = service_name, "tracing initialized");
    });

    install_metrics_recorder()
}

/// Count one authorization decision. `outcome` is `authorized`,
/// `anonymous`, or the rejection code.
pub fn record_decision(outcome: &'static str) {
    metrics::counter!(AUTHZ_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn metrics_router(handle: PrometheusHandle) -> axum::Router {
    axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    serve_metrics_with_shutdown(handle, addr, std::future::pending()).await
}

pub async fn serve_metrics_with_shutdown<F>(
    handle: PrometheusHandle,
    addr: SocketAddr,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "metrics listening");
    axum::serve(listener, metrics_router(handle).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}

fn install_metrics_recorder() -> PrometheusHandle {
    if let Some(handle) = METRICS_HANDLE.get() {
        return handle.clone();
    }
    let handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            // Another recorder is already global; keep a detached handle so
            // callers still get a renderable registry.
            tracing::warn!(error = %err, "metrics recorder already installed");
            PrometheusBuilder::new().build_recorder().handle()
        }
    };
    let _ = METRICS_HANDLE.set(handle.clone());
    handle
}

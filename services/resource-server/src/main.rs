//! Resource-server HTTP service entry point.
//!
//! # Purpose
//! Loads configuration, builds the authorization wiring, and serves the API
//! and the metrics endpoint until shutdown.
//!
//! # Notes
//! Invalid authorizer configuration aborts startup instead of serving
//! requests with a partial rule set.
use resource_server::app::{build_router, build_state};
use resource_server::config::ResourceServerConfig;
use resource_server::observability;
use std::future::Future;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ResourceServerConfig::from_env_or_yaml()?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: ResourceServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("gatekeeper-resource-server");
    let (state, authorizers) = build_state(&config)?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state, authorizers);

    let addr = config.bind_addr;
    tracing::info!(%addr, issuer = %config.issuer, "resource server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

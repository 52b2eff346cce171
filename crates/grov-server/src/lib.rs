// SPDX-License-Identifier: Apache-2.0
//! Axum HTTP surface: routing, raw-body capture, health, shutdown, and the
//! periodic background tasks that keep sessions and the extended cache
//! healthy.
mod error;
mod handlers;
mod security;
mod state;

pub use state::AppState;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use grov_adapters::AdapterRegistry;
use grov_config::Config;
use grov_core::CoreState;
use grov_store::{DriftLogRepository, SessionRepository, StepRepository};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

fn router<R>(state: AppState<R>) -> Router
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    let body_limit = state.config.http.body_limit;
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/messages", post(handlers::proxy::<R>))
        .route("/v1/responses", post(handlers::proxy::<R>))
        .fallback(handlers::not_found)
        .layer(axum::middleware::from_fn(security::security_headers))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::limit::RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}

/// Spawns the two background timers the core depends on: the extended
/// cache's keep-alive tick and the session-store sweep.
fn spawn_background_tasks<R>(core: Arc<CoreState<R>>, config: Arc<Config>)
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    if config.cache.extended_cache_enabled {
        let cache = core.extended_cache.clone();
        let tick_secs = config.cache.tick_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
            loop {
                interval.tick().await;
                cache.tick().await;
            }
        });
    }

    let sessions = core.sessions.clone();
    let stale_after_secs = config.session.stale_after_secs as i64;
    let retention_secs = config.session.completed_retention_secs as i64;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();
            if let Err(e) = sessions.sweep_stale(now, stale_after_secs).await {
                error!(error = %e, "session stale sweep failed");
            }
            if let Err(e) = sessions.sweep_expired(now, retention_secs).await {
                error!(error = %e, "session expiry sweep failed");
            }
        }
    });
}

/// Runs the proxy until `shutdown` resolves. On shutdown, stops accepting
/// new connections, wipes the extended cache, and gives in-flight
/// responses a short grace period before the socket closes.
pub async fn serve<R>(
    config: Arc<Config>,
    adapters: Arc<AdapterRegistry>,
    core: Arc<CoreState<R>>,
    upstream: reqwest::Client,
    shutdown: oneshot::Receiver<()>,
) -> anyhow::Result<()>
where
    R: SessionRepository + StepRepository + DriftLogRepository + Send + Sync + 'static,
{
    spawn_background_tasks(core.clone(), config.clone());

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr, "grov listening");

    let state = AppState::new(config, adapters, core.clone(), upstream);
    let app = router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
            info!("shutdown signal received, draining in-flight requests");
        })
        .await?;

    core.extended_cache.shutdown_wipe().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    info!("grov stopped");
    Ok(())
}

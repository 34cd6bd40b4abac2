//! Tally API
//!
//! Quota enforcement microservice.
//!
//! ## REST Endpoints
//!
//! - `POST /api/v1/quota/admit` - Admit or deny a metered action
//! - `GET /api/v1/quota/usage/{user_id}/{quota_type}` - Current period usage
//! - `GET /api/v1/quota/statistics/{user_id}/{quota_type}` - Trailing-window statistics
//! - `GET /api/v1/quota/daily/{user_id}` - Zero-filled daily usage
//! - `GET /api/v1/prompts/{user_id}` - List upgrade prompts
//! - `POST /api/v1/prompts/{id}/dismiss` - Dismiss a prompt
//! - `POST /api/v1/prompts/{id}/convert` - Mark a prompt converted
//!
//! ## Admin Endpoints (bearer `ADMIN_TOKEN`)
//!
//! - `POST /admin/v1/reset` - Run the reset scheduler now
//! - `POST /admin/v1/reset/{user_id}/{quota_type}` - Reset one user's quota
//! - `GET /admin/v1/scheduler` - Scheduler status
//! - `GET /admin/v1/reset-logs` - Recent reset runs
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

mod config;
mod error;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tally_core::QuotaService;
use tally_db::{PoolOptions, Repositories};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::handlers::{health, ready};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("tally_api=debug".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tally API");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        http_port = config.http_port,
        reset_interval_secs = config.reset_interval.as_secs(),
        policies = config.quota.policies.entries().len(),
        "Configuration loaded"
    );

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    // Create database pool and apply schema
    let pool_options = PoolOptions::default().with_max_connections(config.db_max_connections);
    let pool = tally_db::create_pool_with_options(&config.database_url, &pool_options).await?;
    tally_db::run_migrations(&pool).await?;
    tracing::info!("Database pool created");

    let quota = QuotaService::from_repositories(config.quota.clone(), Repositories::new(pool.clone()));

    // Background work
    let reset_loop = tokio::spawn(quota.scheduler().run_forever(config.reset_interval));
    let sweep_loop = spawn_prompt_sweep(quota.clone(), config.prompt_sweep_interval);

    let state = AppState::new(quota, pool, config.clone());
    let app = build_router(state, metrics_handle);

    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    if let Err(e) = run_http_server(app, http_addr).await {
        tracing::error!(error = ?e, "HTTP server error");
    }

    reset_loop.abort();
    sweep_loop.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let request_timeout = state.request_timeout();

    // API v1 routes
    let api_v1 = Router::new()
        // Request gate and reporting
        .route("/quota/admit", post(handlers::admit))
        .route("/quota/usage/{user_id}/{quota_type}", get(handlers::get_usage))
        .route(
            "/quota/statistics/{user_id}/{quota_type}",
            get(handlers::get_statistics),
        )
        .route("/quota/daily/{user_id}", get(handlers::get_daily_usage))
        // Prompt lifecycle
        .route("/prompts/{id}", get(handlers::list_prompts))
        .route("/prompts/{id}/dismiss", post(handlers::dismiss_prompt))
        .route("/prompts/{id}/convert", post(handlers::convert_prompt));

    // Admin routes (bearer token)
    let admin_v1 = Router::new()
        .route("/reset", post(handlers::trigger_reset))
        .route("/reset/{user_id}/{quota_type}", post(handlers::reset_user_quota))
        .route("/scheduler", get(handlers::scheduler_status))
        .route("/reset-logs", get(handlers::list_reset_logs))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_admin,
        ));

    // Health routes (no timeout - must always respond quickly)
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics route (no timeout)
    let metrics_route = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    // Build middleware stack (order matters - outermost first)
    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .nest("/api/v1", api_v1)
        .nest("/admin/v1", admin_v1)
        .layer(layers)
        .merge(health_routes)
        .merge(metrics_route)
        .with_state(state)
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Periodically evaluate upgrade prompts for all live usage
fn spawn_prompt_sweep(quota: QuotaService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match quota.sweep_prompts(Utc::now()).await {
                Ok(summary) if summary.created > 0 => {
                    tracing::info!(created = summary.created, "Prompt sweep created prompts");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Prompt sweep failed"),
            }
        }
    })
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    // Admission is on every metered request; most decisions should be a
    // single round trip well under 50ms
    let quota_latency_buckets = &[0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("quota_operation_duration_seconds".to_string()),
            quota_latency_buckets,
        )?
        .install_recorder()?;

    metrics::describe_counter!(
        "quota_admissions_total",
        "Admission decisions by quota type and result"
    );
    metrics::describe_counter!("quota_reset_runs_total", "Completed reset scheduler runs");
    metrics::describe_counter!(
        "quota_reset_items_total",
        "Per-pair reset outcomes by result"
    );
    metrics::describe_counter!(
        "quota_prompts_created_total",
        "Upgrade prompts created by quota type"
    );
    metrics::describe_histogram!(
        "quota_operation_duration_seconds",
        "Quota API operation latency in seconds by operation and result"
    );

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

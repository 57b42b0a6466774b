//! Standalone reconciliation sweep against the PostgreSQL job store.
//!
//! Runs alongside one or more API processes that share `DATABASE_URL` and
//! fails jobs whose owning process stopped heartbeating.

use std::sync::Arc;

use lookgen_db::PgJobStore;
use lookgen_worker::{reconcile, ReconcileConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lookgen_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ReconcileConfig::from_env();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = lookgen_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    lookgen_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    lookgen_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgJobStore::new(pool));
    let cancel = CancellationToken::new();
    let sweep = tokio::spawn(reconcile::run(store, config, cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();
    let _ = sweep.await;

    tracing::info!("Reconciler stopped");
}

/// Wait for SIGINT or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, stopping"),
        () = terminate => tracing::info!("Received SIGTERM, stopping"),
    }
}

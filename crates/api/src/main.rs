use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lookgen_api::config::ServerConfig;
use lookgen_api::router::build_app_router;
use lookgen_api::state::AppState;
use lookgen_db::{JobStore, MemoryJobStore, PgJobStore, TaskQueue};
use lookgen_pipeline::artifact::FsArtifactSink;
use lookgen_pipeline::http::{CollaboratorConfig, HttpDescriptionModel, HttpIntrospector};
use lookgen_pipeline::GenerationExecutor;
use lookgen_worker::{reconcile, ReconcileConfig, Scheduler, SchedulerConfig, StatusService};

/// How long in-flight jobs get to record their outcome after the server
/// stops accepting connections.
const SCHEDULER_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lookgen_api=debug,lookgen_worker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let scheduler_config = SchedulerConfig::from_env();
    let reconcile_config = ReconcileConfig::from_env();
    let collaborators = CollaboratorConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        pool_size = scheduler_config.pool_size,
        "Loaded server configuration",
    );

    // --- Job store ---
    let (store, pool) = match &config.database_url {
        Some(database_url) => {
            let pool = lookgen_db::create_pool(database_url)
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

            let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs are kept in memory only");
            let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            (store, None)
        }
    };

    // --- Executor ---
    let executor = GenerationExecutor::new(
        Arc::new(HttpIntrospector::from_config(&collaborators)),
        Arc::new(HttpDescriptionModel::from_config(&collaborators)),
        Arc::new(FsArtifactSink::from_env()),
    )
    .with_granularity(scheduler_config.progress_granularity);

    // --- Scheduler ---
    let scheduler = Scheduler::new(
        Arc::clone(&store),
        Arc::new(TaskQueue::new()),
        Arc::new(executor),
        scheduler_config,
    );
    if let Err(e) = scheduler.recover_pending().await {
        tracing::error!(error = %e, "Could not recover pending jobs");
    }
    let dispatcher = scheduler.start();

    // --- Reconciliation sweep ---
    let sweep_cancel = CancellationToken::new();
    let sweep = tokio::spawn(reconcile::run(
        Arc::clone(&store),
        reconcile_config,
        sweep_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        scheduler: scheduler.clone(),
        status: StatusService::new(Arc::clone(&store)),
        pool,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    scheduler.shutdown(SCHEDULER_SHUTDOWN_GRACE).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), dispatcher).await;
    tracing::info!("Scheduler stopped");

    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep).await;
    tracing::info!("Reconciliation sweep stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

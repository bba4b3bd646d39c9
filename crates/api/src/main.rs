use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use spotline_cloud::ec2::Ec2Gateway;
use spotline_cloud::metadata::{self, InstanceMetadata};
use spotline_db::store::{PgTaskStore, TaskStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spotline_api::config::{SchedulerConfig, ServerConfig};
use spotline_api::engine::scheduler::Scheduler;
use spotline_api::router::build_app_router;
use spotline_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spotline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let mut scheduler_config = SchedulerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        public_base_url = %config.public_base_url,
        "Loaded server configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = spotline_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    spotline_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    spotline_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(pool));

    // --- Scheduler ---
    let scheduler_cancel = CancellationToken::new();
    let scheduler_handle = if scheduler_config.enabled {
        if scheduler_config.region.is_none() {
            scheduler_config.region = discover_region().await;
        }
        let gateway = Ec2Gateway::from_env(
            scheduler_config.region.clone(),
            scheduler_config.launch.clone(),
        )
        .await;
        let scheduler = Scheduler::new(Arc::clone(&store), Arc::new(gateway), scheduler_config);
        Some(tokio::spawn(scheduler.run(scheduler_cancel.clone())))
    } else {
        tracing::info!("Scheduler disabled");
        None
    };

    // --- App state ---
    let state = AppState {
        store,
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

    scheduler_cancel.cancel();
    if let Some(handle) = scheduler_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Scheduler stopped");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Region of the instance the controller runs on, if it runs on one.
async fn discover_region() -> Option<String> {
    let imds = match InstanceMetadata::new(metadata::DEFAULT_ENDPOINT) {
        Ok(imds) => imds,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build metadata client");
            return None;
        }
    };
    match imds.region().await {
        Ok(region) => {
            tracing::info!(region = ?region, "Region discovered from instance metadata");
            region
        }
        Err(e) => {
            tracing::warn!(error = %e, "AWS_REGION unset and instance metadata unavailable");
            None
        }
    }
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
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

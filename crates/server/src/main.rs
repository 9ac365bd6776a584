use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelforge_core::{
    load_config, validate_config, CacheStore, Config, FfprobeProber, JobOrchestrator, JobStore,
    LocalCacheStore, MediaProber, OwnerUpdater, ProviderRegistry, SanitizedConfig, SqliteJobStore,
    SqliteOwnerMediaStore,
};
use reelforge_server::api::create_router;
use reelforge_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("REELFORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config);
    info!("reelforge {} starting", VERSION);
    info!("Loaded configuration from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Configuration validated");
    info!("Database path: {:?}", config.database.path);

    // Job records
    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    info!("Job store initialized");

    // Owner media fields live beside the jobs
    let owners: Arc<dyn OwnerUpdater> = Arc::new(
        SqliteOwnerMediaStore::new(&config.database.path)
            .context("Failed to create owner media store")?,
    );

    let cache: Arc<dyn CacheStore> = Arc::new(
        LocalCacheStore::from_config(&config.storage).context("Failed to create media cache")?,
    );
    info!(
        "Media cache at {:?} served as {}",
        config.storage.base_path, config.storage.base_url
    );

    let registry = Arc::new(
        ProviderRegistry::from_config(&config.providers)
            .context("Failed to create provider clients")?,
    );
    if registry.names().is_empty() {
        warn!("No provider clients configured; every submission will be rejected");
    }

    let mut orchestrator = JobOrchestrator::new(
        config.orchestrator.clone(),
        job_store,
        registry,
        cache,
        owners,
    );

    if config.probe.enabled {
        info!("Probing media durations with {:?}", config.probe.ffprobe_path);
        let prober: Arc<dyn MediaProber> =
            Arc::new(FfprobeProber::new(config.probe.ffprobe_path.clone()));
        orchestrator = orchestrator.with_prober(prober);
    } else {
        info!("Media probing disabled");
    }

    let orchestrator = Arc::new(orchestrator);

    // Start the orchestrator; the first recovery sweep runs here
    let report = orchestrator.start().await;
    info!(
        reattached = report.reattached,
        redownloaded = report.redownloaded,
        rebound = report.rebound,
        missed = report.missed,
        owners_resynced = report.owners_resynced,
        "Job orchestrator started"
    );

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&orchestrator)));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Pollers stop here; processing jobs are picked up by the next start
    info!("Stopping orchestrator...");
    orchestrator.stop().await;
    info!("Server shut down");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

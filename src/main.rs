use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::info;

use setset::api::{create_router, AppState};
use setset::config::Config;
use setset::observability::{init_tracing, EngineMetrics};
use setset::policy::{build_store, load_sets, RulesLoader, RulesWatcher};
use setset::rules::{Engine, SeededRandom};
use setset::sets::{MemorySetStore, SetStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    init_tracing(&config.log_level, config.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting setset engine");

    // Sets must exist before any rule can resolve them
    let sets = load_sets(&config.sets_path)
        .with_context(|| format!("loading sets from {}", config.sets_path.display()))?;
    let store = Arc::new(build_store(&sets)?);
    let dyn_store: Arc<dyn SetStore> = store.clone();

    let metrics = Arc::new(EngineMetrics::new());

    let loader = RulesLoader::new(&config.rules_path, dyn_store);
    let watcher = RulesWatcher::new(loader, config.rules_reload_interval(), metrics.clone());
    let (ruleset_rx, rules_handle) = watcher.start();

    let mut engine = Engine::new(metrics).with_backoff_interval(config.backoff_interval());
    if let Some(seed) = config.sampling_seed {
        info!(seed, "Using seeded sampling");
        engine = engine.with_random(Arc::new(SeededRandom::new(seed)));
    }

    let gc_handle = spawn_purger(store.clone(), config.gc_interval());

    let state = Arc::new(AppState {
        store,
        engine,
        ruleset_rx,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let app = create_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    info!("Shutting down...");
    rules_handle.abort();
    gc_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Periodically drop expired set entries.
fn spawn_purger(
    store: Arc<MemorySetStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            store.purge_expired();
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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

    info!("Received shutdown signal");
}

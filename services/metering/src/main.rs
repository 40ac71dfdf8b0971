use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::serve;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use lingua_metering_service::api::{create_router, ApiState};
use lingua_metering_service::config::{MeteringConfig, StoreBackend};
use lingua_metering_service::metering::{MeteringEngine, StaticTierLookup, TierLookup};
use lingua_quota_store::{CounterStore, MemoryCounterStore, QuotaStore, RedisCounterStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = MeteringConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config);

    info!("lingua-metering starting");

    let backend: Arc<dyn CounterStore> = match config.store_backend {
        StoreBackend::Redis => {
            let store = RedisCounterStore::connect(&config.redis_url)
                .await
                .context("failed to connect to redis counter store")?;
            info!(redis_url = %config.redis_url, "redis counter store connected");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            // Single-instance shortcut: counts are process-local and not
            // shared across replicas.
            warn!("memory counter store selected, quotas are not enforced across instances");
            Arc::new(MemoryCounterStore::new())
        }
    };

    let store = QuotaStore::new(backend, Duration::from_millis(config.store_timeout_ms));
    let tiers = Arc::new(StaticTierLookup::new());
    let tier_lookup: Arc<dyn TierLookup> = tiers.clone();
    let engine = Arc::new(MeteringEngine::new(store, tier_lookup));

    let state = Arc::new(ApiState::new(engine, tiers, config.clone()));
    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid server bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read bound address")?;
    info!(%local_addr, "lingua-metering listening");

    serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server encountered an unrecoverable error")?;

    info!("lingua-metering shutdown complete");
    Ok(())
}

fn init_tracing(config: &MeteringConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

//! # LDN Inbox Server
//!
//! Loads configuration, builds the processor registry, message store,
//! delivery coordinator and retry scheduler, then serves the inbox over HTTP
//! until ctrl-c.

use anyhow::Context;
use ldn_core::config::{ConfigManager, LdnConfig};
use ldn_core::logging::init_structured_logging;
use ldn_core::orchestration::{
    DeliveryCoordinator, RetryScheduler, RetrySchedulerSettings, Router,
};
use ldn_core::processors::{HttpOutboundSender, InMemoryItemRepository};
use ldn_core::registry::ProcessorFactory;
use ldn_core::store::{InMemoryMessageStore, MessageStore, PgMessageStore};
use ldn_core::web::{create_app, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

const SCHEDULER_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let config_manager = ConfigManager::load().context("failed to load configuration")?;
    let config = Arc::new(config_manager.config().clone());
    info!(
        environment = config_manager.environment(),
        config = %config_manager.debug_config(),
        "🚀 Starting LDN inbox server"
    );

    let store = build_store(&config).await?;

    let sender = HttpOutboundSender::new(&config.outbound)
        .context("failed to build outbound HTTP client")?;
    let factory = ProcessorFactory::with_defaults(
        Arc::new(InMemoryItemRepository::new()),
        Arc::new(sender),
    );
    let registry = factory
        .build_registry(&config.routes)
        .context("failed to build processor registry")?;

    let coordinator = Arc::new(DeliveryCoordinator::from_config(
        &config,
        store,
        Router::new(Arc::new(registry)),
    ));

    let scheduler = if config.scheduler.enabled {
        let scheduler = Arc::new(RetryScheduler::new(
            coordinator.clone(),
            RetrySchedulerSettings::from(&config.scheduler),
        ));
        scheduler.start()?;
        Some(scheduler)
    } else {
        warn!("Retry scheduler disabled; queued messages wait for manual retry");
        None
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Shutdown signal received");
        }
        let _ = shutdown_tx.send(true);
    });

    let app = create_app(AppState::new(coordinator, config.clone()));
    let listener = tokio::net::TcpListener::bind(&config.web.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.web.bind_address))?;
    info!(bind_address = %config.web.bind_address, "📬 LDN inbox listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
        })
        .await
        .context("server error")?;

    if let Some(scheduler) = scheduler {
        scheduler.stop(SCHEDULER_STOP_TIMEOUT).await?;
    }

    info!("LDN inbox server stopped");
    Ok(())
}

async fn build_store(config: &LdnConfig) -> anyhow::Result<Arc<dyn MessageStore>> {
    if config.database.url.is_none() {
        warn!("No database.url configured; using the in-memory message store");
        return Ok(Arc::new(InMemoryMessageStore::new()));
    }

    let store = PgMessageStore::connect(&config.database)
        .await
        .context("failed to connect to PostgreSQL")?;
    if config.database.run_migrations {
        store.migrate().await.context("failed to run migrations")?;
    }
    Ok(Arc::new(store))
}

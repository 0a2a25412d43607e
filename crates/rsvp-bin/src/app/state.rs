//! Shared service wiring.

use anyhow::Context;
use ledger_sync_worker::{SyncProcessor, SyncProcessorConfig};
use provider_gateways::Gateways;
use registration_orchestrator::RegistrationOrchestrator;
use retry_ledger::RetryLedger;
use rsvp_config_and_utils::{Config, Paths, SharedClock, SystemClock};
use rsvp_database::AsyncDatabase;
use std::sync::Arc;
use tracing::info;

/// Everything a command needs, built once from configuration.
pub struct AppState {
    pub db: AsyncDatabase,
    pub gateways: Gateways,
    pub orchestrator: RegistrationOrchestrator,
    pub processor: SyncProcessor,
}

impl AppState {
    /// Open the store, creating the runtime directories first.
    pub async fn open_database(config: &Config, paths: &Paths) -> anyhow::Result<AsyncDatabase> {
        paths.ensure_dirs()?;
        let path = config.database_file(paths);
        let db = AsyncDatabase::open(&path)
            .await
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        db.health_check()
            .await
            .with_context(|| format!("Database at {} failed its health check", db.path()))?;
        info!(path = %db.path(), "Database ready");
        Ok(db)
    }

    /// Build the store, ledger, gateways, orchestrator and sync processor.
    pub async fn init(config: &Config, paths: &Paths) -> anyhow::Result<Self> {
        let db = Self::open_database(config, paths).await?;
        let clock: SharedClock = Arc::new(SystemClock);
        let ledger = RetryLedger::new(db.clone(), clock, config.sync.initial_delay());

        let gateways = Gateways::from_config(config, Arc::new(db.clone()))
            .context("Provider gateways are not configured")?;

        let orchestrator = RegistrationOrchestrator::new(db.clone(), gateways.clone(), ledger.clone());
        let processor = SyncProcessor::new(
            SyncProcessorConfig::from(&config.sync),
            ledger,
            gateways.clone(),
        );

        Ok(Self {
            db,
            gateways,
            orchestrator,
            processor,
        })
    }
}

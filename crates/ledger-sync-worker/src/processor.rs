use crate::{SyncError, SyncResult};
use provider_gateways::Gateways;
use retry_ledger::RetryLedger;
use rsvp_config_and_utils::SyncSettings;
use rsvp_database::{LedgerOperation, RetryLedgerEntry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Sweep cadence and outer backoff.
///
/// # Backoff
///
/// After the N-th failed replay the entry waits `base_delay * 2^N`. With the
/// defaults (base 60s, ceiling 10):
///
/// | Failures | Next attempt in |
/// |----------|-----------------|
/// | 1        | 2m              |
/// | 2        | 4m              |
/// | 3        | 8m              |
/// | ...      | ...             |
/// | 9        | 512m            |
/// | 10       | abandoned       |
#[derive(Debug, Clone)]
pub struct SyncProcessorConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Maximum entries replayed per sweep.
    pub batch_size: usize,
    /// Failed replays after which an entry is abandoned.
    pub max_retries: u32,
    /// Outer backoff base.
    pub base_delay: Duration,
}

impl Default for SyncProcessorConfig {
    fn default() -> Self {
        Self::from(&SyncSettings::default())
    }
}

impl From<&SyncSettings> for SyncProcessorConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            interval: settings.interval(),
            batch_size: settings.batch_size,
            max_retries: settings.max_retries,
            base_delay: settings.base_delay(),
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub selected: usize,
    pub resolved: usize,
    pub rescheduled: usize,
    pub abandoned: usize,
    pub skipped: usize,
    /// Entries whose ledger update itself failed.
    pub errors: usize,
}

enum EntryOutcome {
    Resolved,
    Rescheduled,
    Abandoned,
    Skipped,
}

/// Replays due ledger entries through the gateways.
#[derive(Clone)]
pub struct SyncProcessor {
    config: SyncProcessorConfig,
    ledger: RetryLedger,
    gateways: Gateways,
    running: Arc<AtomicBool>,
}

impl SyncProcessor {
    pub fn new(config: SyncProcessorConfig, ledger: RetryLedger, gateways: Gateways) -> Self {
        Self {
            config,
            ledger,
            gateways,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run one sweep over the due entries, oldest-due first.
    ///
    /// Only the due-entry query can fail the sweep. A failure on one entry is
    /// logged and counted, and the sweep moves on.
    pub async fn sweep_once(&self) -> SyncResult<SweepSummary> {
        let entries = self.ledger.due_entries(self.config.batch_size).await?;
        let mut summary = SweepSummary {
            selected: entries.len(),
            ..SweepSummary::default()
        };

        if entries.is_empty() {
            return Ok(summary);
        }

        info!(count = entries.len(), "Processing due ledger entries");

        for entry in entries {
            let entry_id = entry.id.clone();
            match self.process_entry(entry).await {
                Ok(EntryOutcome::Resolved) => summary.resolved += 1,
                Ok(EntryOutcome::Rescheduled) => summary.rescheduled += 1,
                Ok(EntryOutcome::Abandoned) => summary.abandoned += 1,
                Ok(EntryOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(entry_id = %entry_id, error = %e, "Failed to update ledger entry");
                    summary.errors += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn process_entry(&self, entry: RetryLedgerEntry) -> SyncResult<EntryOutcome> {
        let Some(operation) = LedgerOperation::parse(&entry.operation) else {
            warn!(entry_id = %entry.id, operation = %entry.operation, "Unknown ledger operation");
            return Ok(EntryOutcome::Skipped);
        };
        let Some(payload) = entry.decode_payload() else {
            warn!(entry_id = %entry.id, operation = operation.as_str(), "Undecodable ledger payload");
            return Ok(EntryOutcome::Skipped);
        };

        let error = match self.gateways.replay(&payload).await {
            Ok(()) => {
                self.ledger.resolve(&entry, operation).await?;
                info!(entry_id = %entry.id, operation = operation.as_str(), "Ledger entry resolved");
                return Ok(EntryOutcome::Resolved);
            }
            Err(e) => e.to_string(),
        };

        let retry_count = entry.retry_count.saturating_add(1);
        if retry_count >= self.config.max_retries {
            self.ledger.abandon(&entry.id, retry_count, &error).await?;
            error!(
                entry_id = %entry.id,
                operation = operation.as_str(),
                retry_count,
                "Max retries reached, giving up"
            );
            return Ok(EntryOutcome::Abandoned);
        }

        let delay = compute_backoff(retry_count, self.config.base_delay);
        let next_retry_at = self
            .ledger
            .reschedule(&entry.id, retry_count, &error, delay)
            .await?;
        warn!(
            entry_id = %entry.id,
            operation = operation.as_str(),
            retry_count,
            next_retry_at = %next_retry_at,
            "Ledger retry scheduled"
        );
        Ok(EntryOutcome::Rescheduled)
    }

    /// Spawn the recurring sweep.
    ///
    /// The first sweep runs one interval after start. Refused while a
    /// previous task from this processor is still running, or when the
    /// interval is zero.
    pub fn start(&self) -> SyncResult<SyncProcessorHandle> {
        if self.config.interval.is_zero() {
            return Err(SyncError::ZeroInterval);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Sync processor already running");
            return Err(SyncError::AlreadyRunning);
        }

        let processor = self.clone();
        let trigger = Arc::new(Notify::new());
        let wake = trigger.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let period = self.config.interval;

        info!(interval_secs = period.as_secs(), "Starting sync processor");

        let running = RunningGuard(self.running.clone());
        let task = tokio::spawn(async move {
            let _running = running;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                    _ = wake.notified() => debug!("Sweep triggered"),
                }

                match processor.sweep_once().await {
                    Ok(summary) if summary.selected > 0 => info!(
                        selected = summary.selected,
                        resolved = summary.resolved,
                        rescheduled = summary.rescheduled,
                        abandoned = summary.abandoned,
                        skipped = summary.skipped,
                        errors = summary.errors,
                        "Sweep finished"
                    ),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Failed to query due ledger entries, skipping sweep"),
                }
            }

            info!("Stopped sync processor");
        });

        Ok(SyncProcessorHandle {
            trigger,
            shutdown_tx,
            task,
        })
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Control handle for a started [`SyncProcessor`].
///
/// Dropping the handle without `stop` also ends the task after the
/// in-flight sweep.
pub struct SyncProcessorHandle {
    trigger: Arc<Notify>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SyncProcessorHandle {
    /// Request a sweep now instead of waiting for the next tick.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop after the in-flight sweep and wait for the task to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sync processor task ended abnormally");
        }
    }
}

/// Outer backoff after `retry_count` failed replays: `base * 2^retry_count`,
/// saturating.
pub fn compute_backoff(retry_count: u32, base: Duration) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let multiplier = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_backoff_doubles_per_failure() {
        let base = Duration::from_secs(60);
        assert_eq!(compute_backoff(0, base), Duration::from_secs(60));
        assert_eq!(compute_backoff(1, base), Duration::from_secs(120));
        assert_eq!(compute_backoff(2, base), Duration::from_secs(240));
        assert_eq!(compute_backoff(9, base), Duration::from_secs(60 * 512));
    }

    #[test]
    fn compute_backoff_is_monotonic() {
        let base = Duration::from_secs(60);
        let delays: Vec<_> = (0..80).map(|n| compute_backoff(n, base)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn compute_backoff_saturates() {
        let base = Duration::from_secs(60);
        assert_eq!(compute_backoff(64, base), Duration::from_millis(u64::MAX));
        assert_eq!(compute_backoff(200, base), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn config_from_settings() {
        let config = SyncProcessorConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.base_delay, Duration::from_secs(60));
    }
}

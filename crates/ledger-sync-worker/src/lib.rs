//! # Ledger sync worker
//!
//! Drains the retry ledger: every interval it selects due entries, replays
//! each through the provider gateways and moves the entry forward.
//!
//! ```text
//! ┌──────────────┐  due entries   ┌───────────────┐  replay   ┌───────────┐
//! │ Retry Ledger │───────────────▶│ SyncProcessor │──────────▶│ Gateways  │
//! │   (SQLite)   │◀───────────────│    (sweep)    │◀──────────│ (Loops)   │
//! └──────────────┘ resolve /      └───────────────┘  ok / err └───────────┘
//!                  reschedule /
//!                  abandon
//! ```
//!
//! ## Per-entry transitions
//!
//! - replay ok: resolved, attendee flag set
//! - replay failed, `retry_count + 1 < max_retries`: rescheduled
//!   `base * 2^(retry_count + 1)` from now
//! - replay failed, ceiling reached: abandoned (resolved, error kept)
//! - undecodable payload or unknown operation: logged, left untouched
//!
//! ## Example
//!
//! ```ignore
//! let processor = SyncProcessor::new(SyncProcessorConfig::from(&config.sync), ledger, gateways);
//! let handle = processor.start()?;
//! handle.trigger();
//! handle.stop().await;
//! ```

mod error;
mod processor;

pub use error::{SyncError, SyncResult};
pub use processor::{compute_backoff, SweepSummary, SyncProcessor, SyncProcessorConfig, SyncProcessorHandle};

//! Configuration, paths, logging and clock utilities shared by the RSVP crates.

mod clock;
mod config;
mod error;
mod logging;
mod paths;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{Config, GatewaySettings, SyncSettings, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;

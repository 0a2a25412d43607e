//! Application wiring and command handlers.

mod commands;
mod state;

pub use commands::{preview, register, seed_event, serve, sweep};
pub use state::AppState;

//! RSVP - event registration with best-effort provider sync.

mod app;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rsvp_config_and_utils::{init_logging, Config, Paths};

/// RSVP command-line interface.
#[derive(Parser)]
#[command(name = "rsvp")]
#[command(about = "Event registration and follow-up sync")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, database, logs). Defaults to ~/.rsvp
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ledger sync processor until Ctrl-C
    Serve,
    /// Register one attendee
    Register {
        /// Event slug
        #[arg(long)]
        event: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        role: Option<String>,
        /// Interest tag; repeat for several
        #[arg(long = "interest")]
        interests: Vec<String>,
    },
    /// Run exactly one ledger sweep
    Sweep,
    /// Insert an active event
    SeedEvent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
        /// Event start, RFC 3339 (e.g. 2025-04-10T17:00:00Z)
        #[arg(long, value_parser = parse_date)]
        date: DateTime<Utc>,
        /// Host company name
        #[arg(long)]
        company: String,
        /// Lifecycle trigger fired on registration
        #[arg(long)]
        trigger: String,
        #[arg(long)]
        description: Option<String>,
        /// Interest option offered on the form; repeat for several
        #[arg(long = "interest-option")]
        interest_options: Vec<String>,
    },
    /// Print the three-step follow-up series for an attendee
    Preview {
        /// Attendee id
        #[arg(long)]
        attendee: String,
    },
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 date '{raw}': {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command {
        Commands::Serve => app::serve(config, paths).await,
        Commands::Register {
            event,
            name,
            email,
            company,
            role,
            interests,
        } => {
            let input = registration_orchestrator::RegistrationInput {
                name,
                email,
                company,
                role,
                interests,
            };
            app::register(config, paths, &event, input).await
        }
        Commands::Sweep => app::sweep(config, paths).await,
        Commands::SeedEvent {
            name,
            slug,
            date,
            company,
            trigger,
            description,
            interest_options,
        } => {
            let event = rsvp_database::NewEvent {
                id: uuid::Uuid::new_v4().to_string(),
                slug,
                name,
                description,
                date,
                company_name: company,
                lifecycle_trigger: trigger,
                interest_options,
                status: rsvp_database::EventStatus::Active,
            };
            app::seed_event(config, paths, event).await
        }
        Commands::Preview { attendee } => app::preview(config, paths, &attendee).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn register_collects_repeated_interests() {
        let cli = Cli::parse_from([
            "rsvp", "register", "--event", "summit", "--name", "Jane Smith", "--email",
            "jane@x.com", "--interest", "demo", "--interest", "partnership",
        ]);
        match cli.command {
            Commands::Register { interests, company, .. } => {
                assert_eq!(interests, vec!["demo", "partnership"]);
                assert!(company.is_none());
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn seed_event_parses_dates() {
        assert!(parse_date("2025-04-10T17:00:00Z").is_ok());
        assert!(parse_date("2025-04-10T19:00:00+02:00").is_ok());
        assert!(parse_date("April 10").is_err());
    }
}

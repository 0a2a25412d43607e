//! Command handlers.

use crate::app::AppState;
use anyhow::Context;
use provider_gateways::{AttendeeContext, EventContext};
use registration_orchestrator::{RegistrationError, RegistrationInput, StepOutcome};
use rsvp_config_and_utils::{Config, Paths};
use rsvp_database::{queries, NewEvent};
use tracing::info;

/// Run the sync processor until Ctrl-C.
pub async fn serve(config: Config, paths: Paths) -> anyhow::Result<()> {
    let AppState { db, processor, .. } = AppState::init(&config, &paths).await?;
    let handle = processor.start()?;
    info!(
        interval_secs = config.sync.interval_secs,
        batch_size = config.sync.batch_size,
        "RSVP service running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    handle.stop().await;
    db.close().await.context("Failed to close database")?;
    Ok(())
}

/// Register one attendee and print the result.
pub async fn register(
    config: Config,
    paths: Paths,
    event_slug: &str,
    input: RegistrationInput,
) -> anyhow::Result<()> {
    let state = AppState::init(&config, &paths).await?;

    let report = match state.orchestrator.register(event_slug, &input).await {
        Ok(report) => report,
        Err(e @ RegistrationError::Validation(_)) => {
            eprintln!("{e}");
            return Err(e.into());
        }
        Err(e) => {
            eprintln!("Registration failed ({}): {e}", e.status_code());
            return Err(e.into());
        }
    };

    println!("{}", report.attendee_id);
    for (step, outcome) in &report.steps {
        let detail = match outcome {
            StepOutcome::Succeeded => "ok".to_string(),
            StepOutcome::Degraded { error } => format!("degraded: {error}"),
            StepOutcome::Deferred { entry_id, error } => format!("deferred to {entry_id}: {error}"),
            StepOutcome::Failed { error } => format!("failed: {error}"),
            StepOutcome::Skipped { reason } => format!("skipped: {reason}"),
        };
        eprintln!("  {:<20} {detail}", step.as_str());
    }
    Ok(())
}

/// Run one sweep and print its counts.
pub async fn sweep(config: Config, paths: Paths) -> anyhow::Result<()> {
    let state = AppState::init(&config, &paths).await?;
    let summary = state.processor.sweep_once().await?;
    println!(
        "selected={} resolved={} rescheduled={} abandoned={} skipped={} errors={}",
        summary.selected,
        summary.resolved,
        summary.rescheduled,
        summary.abandoned,
        summary.skipped,
        summary.errors
    );
    Ok(())
}

/// Insert an active event.
pub async fn seed_event(config: Config, paths: Paths, event: NewEvent) -> anyhow::Result<()> {
    let db = AppState::open_database(&config, &paths).await?;
    let slug = event.slug.clone();
    let stored = db
        .call(move |conn| queries::insert_event(conn, &event))
        .await
        .with_context(|| format!("Failed to create event '{slug}'"))?;
    info!(event_id = %stored.id, slug = %stored.slug, "Event created");
    println!("{} {}", stored.id, stored.slug);
    Ok(())
}

/// Print the follow-up series for an attendee as JSON.
pub async fn preview(config: Config, paths: Paths, attendee_id: &str) -> anyhow::Result<()> {
    let state = AppState::init(&config, &paths).await?;

    let id = attendee_id.to_string();
    let attendee = state
        .db
        .call(move |conn| queries::get_attendee(conn, &id))
        .await?
        .with_context(|| format!("Attendee not found: {attendee_id}"))?;

    let event_id = attendee.event_id.clone();
    let event = state
        .db
        .call(move |conn| queries::get_event(conn, &event_id))
        .await?
        .with_context(|| format!("Event not found: {}", attendee.event_id))?;

    let series = state
        .gateways
        .email_series(&AttendeeContext::from(&attendee), &EventContext::from(&event))
        .await;
    println!("{}", serde_json::to_string_pretty(&series)?);
    Ok(())
}

//! End-to-end registration against an in-memory store and scripted providers.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use provider_gateways::{
    default_series, unavailable, AttendeeContext, ContactDirectory, EmailSeriesStep, EmailSender,
    EventContext, GatewayResult, Gateways, LifecycleEvents, PersonalizationGenerator,
    PersonalizationService, PersonalizationSource, RetryPolicy,
};
use registration_orchestrator::{
    RegistrationError, RegistrationInput, RegistrationOrchestrator, Step, StepOutcome,
};
use retry_ledger::RetryLedger;
use rsvp_config_and_utils::{Clock, ManualClock};
use rsvp_database::{
    queries, AsyncDatabase, ContactSnapshot, EventStatus, LedgerOperation, LedgerPayload, NewEvent,
    PersonalizedFields, DEFAULT_PERSONALIZATION,
};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Provider {
    fail: bool,
    calls: AtomicU32,
}

impl Provider {
    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> GatewayResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(unavailable("fake"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersonalizationGenerator for Provider {
    async fn generate(&self, attendee: &AttendeeContext, _: &EventContext) -> GatewayResult<PersonalizedFields> {
        self.answer()?;
        Ok(PersonalizedFields {
            subject_line: format!("{}, great to meet you", attendee.name),
            intro: "Loved your questions on robotics.".to_string(),
            cta: "Book a demo this week.".to_string(),
        })
    }

    async fn generate_series(&self, attendee: &AttendeeContext, event: &EventContext) -> GatewayResult<Vec<EmailSeriesStep>> {
        self.answer()?;
        Ok(default_series(&attendee.name, &event.name))
    }
}

#[async_trait]
impl ContactDirectory for Provider {
    async fn upsert_contact(&self, _: &ContactSnapshot, _: &PersonalizedFields) -> GatewayResult<()> {
        self.answer()
    }
}

#[async_trait]
impl LifecycleEvents for Provider {
    async fn fire_event(&self, _: &str, _: &str, _: &Map<String, Value>) -> GatewayResult<()> {
        self.answer()
    }
}

#[async_trait]
impl EmailSender for Provider {
    async fn send(&self, _: &str, _: &str, _: &str) -> GatewayResult<String> {
        self.answer().map(|_| "msg-1".to_string())
    }
}

struct Harness {
    db: AsyncDatabase,
    clock: Arc<ManualClock>,
    ledger: RetryLedger,
    orchestrator: RegistrationOrchestrator,
    generator: Arc<Provider>,
    contacts: Arc<Provider>,
    lifecycle: Arc<Provider>,
    email: Arc<Provider>,
}

async fn harness(
    generator: Arc<Provider>,
    contacts: Arc<Provider>,
    lifecycle: Arc<Provider>,
    email: Arc<Provider>,
) -> Harness {
    let db = AsyncDatabase::open_in_memory().await.unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()));
    let ledger = RetryLedger::new(db.clone(), clock.clone(), std::time::Duration::from_secs(60));
    let policy = RetryPolicy::default();
    let gateways = Gateways::new(
        PersonalizationService::new(generator.clone(), Arc::new(db.clone()), policy),
        contacts.clone(),
        lifecycle.clone(),
        Some(email.clone() as Arc<dyn EmailSender>),
        policy,
    );

    seed_event(&db, "hardtech-summit", EventStatus::Active).await;
    seed_event(&db, "draft-night", EventStatus::Draft).await;

    Harness {
        orchestrator: RegistrationOrchestrator::new(db.clone(), gateways, ledger.clone()),
        db,
        clock,
        ledger,
        generator,
        contacts,
        lifecycle,
        email,
    }
}

async fn all_ok() -> Harness {
    harness(Provider::ok(), Provider::ok(), Provider::ok(), Provider::ok()).await
}

async fn seed_event(db: &AsyncDatabase, slug: &str, status: EventStatus) {
    let event = NewEvent {
        id: format!("evt-{slug}"),
        slug: slug.to_string(),
        name: "Hardtech Summit".to_string(),
        description: Some("Robotics and manufacturing".to_string()),
        date: Utc.with_ymd_and_hms(2025, 4, 10, 17, 0, 0).unwrap(),
        company_name: "Colare".to_string(),
        lifecycle_trigger: "summit_registered".to_string(),
        interest_options: vec!["demo".to_string(), "partnership".to_string()],
        status,
    };
    db.call(move |conn| queries::insert_event(conn, &event))
        .await
        .unwrap();
}

fn jane() -> RegistrationInput {
    RegistrationInput {
        name: "Jane Smith".to_string(),
        email: "jane@x.com".to_string(),
        company: None,
        role: None,
        interests: vec!["demo".to_string()],
    }
}

#[tokio::test(start_paused = true)]
async fn jane_registers_with_all_providers_up() {
    let h = all_ok().await;

    let report = h.orchestrator.register("hardtech-summit", &jane()).await.unwrap();
    assert!(!report.attendee_id.is_empty());
    assert_eq!(report.segment, "demo");
    assert_eq!(report.personalization, PersonalizationSource::Generated);
    assert!(report.all_succeeded());
    assert!(report.deferred().is_empty());

    let id = report.attendee_id.clone();
    let attendee = h
        .db
        .call(move |conn| queries::get_attendee(conn, &id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attendee.segment, "demo");
    assert!(attendee.contact_synced);
    assert!(attendee.lifecycle_event_fired);
    assert_eq!(
        attendee.personalized_subject.as_deref(),
        Some("Jane Smith, great to meet you")
    );

    assert!(h.ledger.entries_for_attendee(&attendee.id).await.unwrap().is_empty());
    assert_eq!(h.ledger.pending_count().await.unwrap(), 0);
    assert_eq!(h.email.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_registration_is_a_conflict() {
    let h = all_ok().await;

    h.orchestrator.register("hardtech-summit", &jane()).await.unwrap();

    let mut again = jane();
    again.name = "Jane S.".to_string();
    let err = h.orchestrator.register("hardtech-summit", &again).await.unwrap_err();
    assert!(matches!(err, RegistrationError::AlreadyRegistered(ref email) if email == "jane@x.com"));
    assert_eq!(err.status_code(), 409);

    let attendees = h
        .db
        .call(|conn| queries::list_attendees_for_event(conn, "evt-hardtech-summit"))
        .await
        .unwrap();
    assert_eq!(attendees.len(), 1);
    assert_eq!(attendees[0].name, "Jane Smith");
}

#[tokio::test(start_paused = true)]
async fn personalization_failure_stores_defaults() {
    let h = harness(Provider::failing(), Provider::ok(), Provider::ok(), Provider::ok()).await;

    let report = h.orchestrator.register("hardtech-summit", &jane()).await.unwrap();
    assert_eq!(report.personalization, PersonalizationSource::Fallback);
    assert!(matches!(report.outcome(Step::Personalize), Some(StepOutcome::Degraded { .. })));
    assert_eq!(h.generator.calls(), 3);

    let id = report.attendee_id.clone();
    let attendee = h
        .db
        .call(move |conn| queries::get_attendee(conn, &id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attendee.personalization(), Some(DEFAULT_PERSONALIZATION.to_fields()));
    assert!(attendee.contact_synced);
}

#[tokio::test(start_paused = true)]
async fn contact_sync_failure_is_deferred_to_ledger() {
    let h = harness(Provider::ok(), Provider::failing(), Provider::ok(), Provider::ok()).await;

    let report = h.orchestrator.register("hardtech-summit", &jane()).await.unwrap();
    assert_eq!(h.contacts.calls(), 3);

    let entries = h.ledger.entries_for_attendee(&report.attendee_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.operation, LedgerOperation::ContactSync.as_str());
    assert_eq!(entry.retry_count, 0);
    assert!(entry.next_retry_at.unwrap() > h.clock.now());
    assert!(entry.last_error.as_deref().unwrap_or_default().contains("503"));
    assert_eq!(report.deferred(), vec![entry.id.as_str()]);

    match entry.decode_payload().unwrap() {
        LedgerPayload::ContactSync { contact, personalization } => {
            assert_eq!(contact.email, "jane@x.com");
            assert_eq!(contact.segment, "demo");
            assert_eq!(contact.event_slug, "hardtech-summit");
            assert_eq!(personalization.cta, "Book a demo this week.");
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    let id = report.attendee_id.clone();
    let attendee = h
        .db
        .call(move |conn| queries::get_attendee(conn, &id))
        .await
        .unwrap()
        .unwrap();
    assert!(!attendee.contact_synced);
    assert!(attendee.lifecycle_event_fired);
}

#[tokio::test(start_paused = true)]
async fn lifecycle_failure_records_trigger_and_properties() {
    let h = harness(Provider::ok(), Provider::ok(), Provider::failing(), Provider::ok()).await;

    let report = h.orchestrator.register("hardtech-summit", &jane()).await.unwrap();
    let entries = h.ledger.entries_for_attendee(&report.attendee_id).await.unwrap();
    assert_eq!(entries.len(), 1);

    match entries[0].decode_payload().unwrap() {
        LedgerPayload::LifecycleEventFire {
            email,
            trigger_name,
            properties,
        } => {
            assert_eq!(email, "jane@x.com");
            assert_eq!(trigger_name, "summit_registered");
            assert_eq!(properties["eventName"], "Hardtech Summit");
            assert_eq!(properties["eventSlug"], "hardtech-summit");
            assert_eq!(properties["segment"], "demo");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn every_provider_down_still_registers() {
    let h = harness(
        Provider::failing(),
        Provider::failing(),
        Provider::failing(),
        Provider::failing(),
    )
    .await;

    let report = h.orchestrator.register("hardtech-summit", &jane()).await.unwrap();
    assert_eq!(report.deferred().len(), 2);
    assert!(matches!(
        report.outcome(Step::ConfirmationEmail),
        Some(StepOutcome::Failed { .. })
    ));
    // Email failures are not retried later.
    assert_eq!(h.ledger.pending_count().await.unwrap(), 2);
    assert_eq!(h.email.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn cached_personalization_is_reused_across_events() {
    let h = all_ok().await;
    seed_event(&h.db, "robotics-night", EventStatus::Active).await;

    h.orchestrator.register("hardtech-summit", &jane()).await.unwrap();
    let report = h.orchestrator.register("robotics-night", &jane()).await.unwrap();

    assert_eq!(report.personalization, PersonalizationSource::Cached);
    assert_eq!(h.generator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_before_any_side_effect() {
    let h = all_ok().await;

    let err = h.orchestrator.register("no-such-event", &jane()).await.unwrap_err();
    assert!(matches!(err, RegistrationError::EventNotFound(_)));
    assert_eq!(err.status_code(), 404);

    let err = h.orchestrator.register("draft-night", &jane()).await.unwrap_err();
    assert!(matches!(err, RegistrationError::EventNotActive(_)));
    assert_eq!(err.status_code(), 400);

    let mut bad = jane();
    bad.email = "jane-at-x".to_string();
    bad.name = String::new();
    let err = h.orchestrator.register("hardtech-summit", &bad).await.unwrap_err();
    match &err {
        RegistrationError::Validation(fields) => assert_eq!(fields.len(), 2),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(err.status_code(), 400);

    assert_eq!(h.contacts.calls() + h.lifecycle.calls() + h.generator.calls(), 0);
    let attendees = h
        .db
        .call(|conn| queries::list_attendees_for_event(conn, "evt-hardtech-summit"))
        .await
        .unwrap();
    assert!(attendees.is_empty());
}

#[tokio::test(start_paused = true)]
async fn ledger_entry_becomes_due_after_initial_delay() {
    let h = harness(Provider::ok(), Provider::failing(), Provider::ok(), Provider::ok()).await;
    h.orchestrator.register("hardtech-summit", &jane()).await.unwrap();

    assert!(h.ledger.due_entries(10).await.unwrap().is_empty());
    h.clock.advance(Duration::seconds(60));
    assert_eq!(h.ledger.due_entries(10).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn store_failure_on_insert_is_fatal_before_any_provider_call() {
    let h = all_ok().await;
    h.db.call_sqlite(|conn| {
        conn.execute_batch(
            "CREATE TRIGGER reject_attendees BEFORE INSERT ON attendees
             BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
        )
    })
    .await
    .unwrap();

    let err = h.orchestrator.register("hardtech-summit", &jane()).await.unwrap_err();

    assert!(matches!(err, RegistrationError::Persistence(ref e) if !e.is_unique_violation()));
    assert_eq!(err.status_code(), 500);
    assert_eq!(h.generator.calls(), 0);
    assert_eq!(h.contacts.calls(), 0);
    assert_eq!(h.lifecycle.calls(), 0);
    assert_eq!(h.email.calls(), 0);
    assert_eq!(h.ledger.pending_count().await.unwrap(), 0);
}

//! The registration flow.
//!
//! Only validation, event lookup and the attendee insert can fail a
//! registration. Every later step is isolated: personalization degrades to
//! defaults, contact sync and the lifecycle event degrade to retry ledger
//! entries, and the confirmation email is logged and dropped.

use crate::error::{RegistrationError, RegistrationResult};
use crate::pipeline::{RegistrationReport, Step, StepOutcome};
use crate::segment::derive_segment;
use crate::validation::{validate, RegistrationInput, ValidRegistration};
use provider_gateways::{
    AttendeeContext, ConfirmationEmail, EventContext, Gateways, PersonalizationSource,
};
use retry_ledger::RetryLedger;
use rsvp_database::{
    queries, Attendee, AttendeeFlag, AsyncDatabase, ContactSnapshot, Event, EventStatus,
    LedgerPayload, NewAttendee, PersonalizedFields,
};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

/// Drives one registration through persist, personalize, sync, fire, notify.
#[derive(Clone)]
pub struct RegistrationOrchestrator {
    db: AsyncDatabase,
    gateways: Gateways,
    ledger: RetryLedger,
}

impl RegistrationOrchestrator {
    pub fn new(db: AsyncDatabase, gateways: Gateways, ledger: RetryLedger) -> Self {
        Self {
            db,
            gateways,
            ledger,
        }
    }

    /// Register an attendee for the event with this slug.
    ///
    /// Returns once the attendee is stored; integration failures only show
    /// up in the report.
    pub async fn register(
        &self,
        event_slug: &str,
        input: &RegistrationInput,
    ) -> RegistrationResult<RegistrationReport> {
        let valid = validate(input).map_err(RegistrationError::Validation)?;
        let event = self.active_event(event_slug).await?;
        let attendee = self.persist_attendee(&event, valid).await?;

        info!(
            attendee_id = %attendee.id,
            event_id = %event.id,
            segment = %attendee.segment,
            "Attendee registered"
        );

        let mut report = RegistrationReport::new(attendee.id.clone(), attendee.segment.clone());

        let (personalization, source, outcome) = self.personalize(&attendee, &event).await;
        report.personalization = source;
        report.record(Step::Personalize, outcome);

        let outcome = self.sync_contact(&attendee, &event, &personalization).await;
        report.record(Step::ContactSync, outcome);

        let outcome = self.fire_lifecycle_event(&attendee, &event).await;
        report.record(Step::LifecycleEvent, outcome);

        let outcome = self.send_confirmation(&attendee, &event, &personalization).await;
        report.record(Step::ConfirmationEmail, outcome);

        Ok(report)
    }

    async fn active_event(&self, slug: &str) -> RegistrationResult<Event> {
        let lookup = slug.to_string();
        let event = self
            .db
            .call(move |conn| queries::get_event_by_slug(conn, &lookup))
            .await?
            .ok_or_else(|| RegistrationError::EventNotFound(slug.to_string()))?;

        if event.status != EventStatus::Active {
            return Err(RegistrationError::EventNotActive(slug.to_string()));
        }
        Ok(event)
    }

    async fn persist_attendee(
        &self,
        event: &Event,
        valid: ValidRegistration,
    ) -> RegistrationResult<Attendee> {
        let email = valid.email.clone();
        let new = NewAttendee {
            id: uuid::Uuid::new_v4().to_string(),
            event_id: event.id.clone(),
            segment: derive_segment(&valid.interests),
            name: valid.name,
            email: valid.email,
            company: valid.company,
            role: valid.role,
            interests: valid.interests,
        };

        match self.db.call(move |conn| queries::insert_attendee(conn, &new)).await {
            Ok(attendee) => Ok(attendee),
            Err(e) if e.is_unique_violation() => {
                info!(event_id = %event.id, "Duplicate registration rejected");
                Err(RegistrationError::AlreadyRegistered(email))
            }
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Failed to insert attendee");
                Err(RegistrationError::Persistence(e))
            }
        }
    }

    async fn personalize(
        &self,
        attendee: &Attendee,
        event: &Event,
    ) -> (PersonalizedFields, PersonalizationSource, StepOutcome) {
        let result = self
            .gateways
            .personalize(&AttendeeContext::from(attendee), &EventContext::from(event), false)
            .await;

        let id = attendee.id.clone();
        let fields = result.fields.clone();
        if let Err(e) = self
            .db
            .call(move |conn| queries::update_attendee_personalization(conn, &id, &fields))
            .await
        {
            warn!(attendee_id = %attendee.id, error = %e, "Failed to store personalization");
        }

        let outcome = match result.source {
            PersonalizationSource::Fallback => StepOutcome::Degraded {
                error: "personalization unavailable, defaults used".to_string(),
            },
            PersonalizationSource::Generated | PersonalizationSource::Cached => StepOutcome::Succeeded,
        };
        (result.fields, result.source, outcome)
    }

    async fn sync_contact(
        &self,
        attendee: &Attendee,
        event: &Event,
        personalization: &PersonalizedFields,
    ) -> StepOutcome {
        let contact = ContactSnapshot {
            email: attendee.email.clone(),
            name: attendee.name.clone(),
            company: attendee.company.clone(),
            role: attendee.role.clone(),
            interests: attendee.interests.clone(),
            segment: attendee.segment.clone(),
            event_name: event.name.clone(),
            event_slug: event.slug.clone(),
        };

        match self.gateways.sync_contact(&contact, personalization).await {
            Ok(()) => {
                self.set_flag(&attendee.id, AttendeeFlag::ContactSynced).await;
                StepOutcome::Succeeded
            }
            Err(e) => {
                error!(attendee_id = %attendee.id, error = %e, "Contact sync failed");
                let payload = LedgerPayload::ContactSync {
                    contact,
                    personalization: personalization.clone(),
                };
                self.defer(&attendee.id, payload, e.to_string()).await
            }
        }
    }

    async fn fire_lifecycle_event(&self, attendee: &Attendee, event: &Event) -> StepOutcome {
        let properties = lifecycle_properties(event, &attendee.segment);

        match self
            .gateways
            .fire_lifecycle_event(&attendee.email, &event.lifecycle_trigger, &properties)
            .await
        {
            Ok(()) => {
                self.set_flag(&attendee.id, AttendeeFlag::LifecycleEventFired).await;
                StepOutcome::Succeeded
            }
            Err(e) => {
                error!(attendee_id = %attendee.id, error = %e, "Lifecycle event fire failed");
                let payload = LedgerPayload::LifecycleEventFire {
                    email: attendee.email.clone(),
                    trigger_name: event.lifecycle_trigger.clone(),
                    properties,
                };
                self.defer(&attendee.id, payload, e.to_string()).await
            }
        }
    }

    async fn send_confirmation(
        &self,
        attendee: &Attendee,
        event: &Event,
        personalization: &PersonalizedFields,
    ) -> StepOutcome {
        let email = ConfirmationEmail {
            attendee_name: attendee.name.clone(),
            attendee_email: attendee.email.clone(),
            event_name: event.name.clone(),
            event_date: event.date,
            company_name: event.company_name.clone(),
            personalized_subject: Some(personalization.subject_line.clone()),
        };

        match self.gateways.send_confirmation(&email).await {
            Ok(Some(_)) => StepOutcome::Succeeded,
            Ok(None) => StepOutcome::Skipped {
                reason: "email provider not configured".to_string(),
            },
            Err(e) => {
                error!(attendee_id = %attendee.id, error = %e, "Confirmation email failed");
                StepOutcome::Failed { error: e.to_string() }
            }
        }
    }

    async fn set_flag(&self, attendee_id: &str, flag: AttendeeFlag) {
        let id = attendee_id.to_string();
        if let Err(e) = self
            .db
            .call(move |conn| queries::set_attendee_flag(conn, &id, flag))
            .await
        {
            warn!(attendee_id = %attendee_id, flag = flag.column(), error = %e, "Failed to set attendee flag");
        }
    }

    async fn defer(&self, attendee_id: &str, payload: LedgerPayload, error: String) -> StepOutcome {
        match self.ledger.record_failure(attendee_id, payload, &error).await {
            Ok(entry) => StepOutcome::Deferred {
                entry_id: entry.id,
                error,
            },
            Err(e) => {
                error!(attendee_id = %attendee_id, error = %e, "Failed to record failed sync");
                StepOutcome::Failed { error }
            }
        }
    }
}

/// Property bag sent with the lifecycle trigger.
pub fn lifecycle_properties(event: &Event, segment: &str) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("eventName".into(), json!(event.name));
    properties.insert("eventSlug".into(), json!(event.slug));
    properties.insert("segment".into(), json!(segment));
    properties
}

//! The set of outbound gateways used by registration and replay.

use crate::email::{ConfirmationEmail, EmailSender, ResendClient};
use crate::error::{GatewayError, GatewayResult};
use crate::gemini::GeminiClient;
use crate::loops::{ContactDirectory, LifecycleEvents, LoopsClient};
use crate::personalization::{
    AttendeeContext, EmailSeriesStep, EventContext, Personalization, PersonalizationCache,
    PersonalizationService,
};
use crate::retry::{with_retry, RetryPolicy};
use rsvp_config_and_utils::Config;
use rsvp_database::{ContactSnapshot, LedgerPayload, PersonalizedFields};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Outbound gateways, each call wrapped in the same bounded retry.
#[derive(Clone)]
pub struct Gateways {
    personalization: PersonalizationService,
    contacts: Arc<dyn ContactDirectory>,
    lifecycle: Arc<dyn LifecycleEvents>,
    email: Option<Arc<dyn EmailSender>>,
    policy: RetryPolicy,
}

impl Gateways {
    pub fn new(
        personalization: PersonalizationService,
        contacts: Arc<dyn ContactDirectory>,
        lifecycle: Arc<dyn LifecycleEvents>,
        email: Option<Arc<dyn EmailSender>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            personalization,
            contacts,
            lifecycle,
            email,
            policy,
        }
    }

    /// Build the production gateways from configuration.
    ///
    /// Loops and Gemini keys are required. Email is optional: without a
    /// Resend key and sender address, confirmations are skipped.
    pub fn from_config(config: &Config, cache: Arc<dyn PersonalizationCache>) -> GatewayResult<Self> {
        let timeout = config.gateways.request_timeout();
        let policy = RetryPolicy::from(&config.gateways);

        let loops_key = config
            .loops_api_key
            .clone()
            .ok_or(GatewayError::MissingApiKey("LOOPS_API_KEY"))?;
        let gemini_key = config
            .gemini_api_key
            .clone()
            .ok_or(GatewayError::MissingApiKey("GEMINI_API_KEY"))?;

        let loops = Arc::new(LoopsClient::new(loops_key, timeout)?);
        let gemini = Arc::new(GeminiClient::new(gemini_key, timeout)?);

        let email: Option<Arc<dyn EmailSender>> =
            match (&config.resend_api_key, &config.resend_from_email) {
                (Some(key), Some(from)) => Some(Arc::new(ResendClient::new(key.clone(), from.clone(), timeout)?)),
                _ => {
                    info!("Resend not configured, confirmation emails will be skipped");
                    None
                }
            };

        Ok(Self::new(
            PersonalizationService::new(gemini, cache, policy),
            loops.clone(),
            loops,
            email,
            policy,
        ))
    }

    /// Personalization for one attendee. Never fails.
    pub async fn personalize(
        &self,
        attendee: &AttendeeContext,
        event: &EventContext,
        skip_cache: bool,
    ) -> Personalization {
        self.personalization.personalize(attendee, event, skip_cache).await
    }

    /// Three-step follow-up series. Never fails.
    pub async fn email_series(&self, attendee: &AttendeeContext, event: &EventContext) -> Vec<EmailSeriesStep> {
        self.personalization.series(attendee, event).await
    }

    /// Create or update the directory contact.
    pub async fn sync_contact(
        &self,
        contact: &ContactSnapshot,
        personalization: &PersonalizedFields,
    ) -> GatewayResult<()> {
        with_retry(&self.policy, "contact_sync", || {
            self.contacts.upsert_contact(contact, personalization)
        })
        .await
    }

    /// Fire a lifecycle trigger.
    pub async fn fire_lifecycle_event(
        &self,
        email: &str,
        trigger_name: &str,
        properties: &Map<String, Value>,
    ) -> GatewayResult<()> {
        with_retry(&self.policy, "lifecycle_event_fire", || {
            self.lifecycle.fire_event(email, trigger_name, properties)
        })
        .await
    }

    /// Send the registration confirmation.
    ///
    /// `Ok(None)` when no email provider is configured.
    pub async fn send_confirmation(&self, email: &ConfirmationEmail) -> GatewayResult<Option<String>> {
        let Some(sender) = &self.email else {
            info!(to = %email.attendee_email, "Email not configured, skipping confirmation");
            return Ok(None);
        };

        let subject = email.subject();
        let html = email.html();
        let id = with_retry(&self.policy, "confirmation_email", || {
            sender.send(&email.attendee_email, &subject, &html)
        })
        .await?;
        Ok(Some(id))
    }

    /// Replay a recorded ledger operation through the matching gateway.
    pub async fn replay(&self, payload: &LedgerPayload) -> GatewayResult<()> {
        match payload {
            LedgerPayload::ContactSync {
                contact,
                personalization,
            } => self.sync_contact(contact, personalization).await,
            LedgerPayload::LifecycleEventFire {
                email,
                trigger_name,
                properties,
            } => self.fire_lifecycle_event(email, trigger_name, properties).await,
        }
    }
}

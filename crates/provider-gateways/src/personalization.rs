//! Personalized follow-up content.
//!
//! Generation is best-effort: every failure path ends in
//! [`PersonalizedFields::fallback`] or [`default_series`], so callers never
//! see an error from this module.

use crate::retry::{with_retry, RetryPolicy};
use crate::GatewayResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rsvp_database::{queries, AsyncDatabase, Attendee, Event, PersonalizedFields};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attendee facts the generator may use.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendeeContext {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub interests: Vec<String>,
}

impl From<&Attendee> for AttendeeContext {
    fn from(attendee: &Attendee) -> Self {
        Self {
            name: attendee.name.clone(),
            email: attendee.email.clone(),
            company: attendee.company.clone(),
            role: attendee.role.clone(),
            interests: attendee.interests.clone(),
        }
    }
}

/// Event facts the generator may use.
#[derive(Debug, Clone, PartialEq)]
pub struct EventContext {
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub company_name: String,
}

impl From<&Event> for EventContext {
    fn from(event: &Event) -> Self {
        Self {
            name: event.name.clone(),
            description: event.description.clone(),
            date: event.date,
            company_name: event.company_name.clone(),
        }
    }
}

/// One message of the three-step follow-up series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSeriesStep {
    pub step: u8,
    pub send_day: u32,
    pub subject: String,
    pub body: String,
    pub cta: String,
}

/// Remote content generator.
#[async_trait]
pub trait PersonalizationGenerator: Send + Sync {
    /// Generate the subject/intro/cta triple.
    async fn generate(
        &self,
        attendee: &AttendeeContext,
        event: &EventContext,
    ) -> GatewayResult<PersonalizedFields>;

    /// Generate the three-step follow-up series.
    async fn generate_series(
        &self,
        attendee: &AttendeeContext,
        event: &EventContext,
    ) -> GatewayResult<Vec<EmailSeriesStep>>;
}

/// Lookup of previously stored personalization by email.
///
/// A stored default triple is returned like any other row, but
/// [`PersonalizationService`] treats it as a miss and regenerates.
#[async_trait]
pub trait PersonalizationCache: Send + Sync {
    async fn lookup(&self, email: &str) -> GatewayResult<Option<PersonalizedFields>>;
}

#[async_trait]
impl PersonalizationCache for AsyncDatabase {
    async fn lookup(&self, email: &str) -> GatewayResult<Option<PersonalizedFields>> {
        let email = email.to_string();
        Ok(self
            .call(move |conn| queries::find_cached_personalization(conn, &email))
            .await?)
    }
}

/// Where a personalization result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalizationSource {
    Generated,
    Cached,
    Fallback,
}

/// Personalization plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Personalization {
    pub fields: PersonalizedFields,
    pub source: PersonalizationSource,
}

impl Personalization {
    pub fn fallback() -> Self {
        Self {
            fields: PersonalizedFields::fallback(),
            source: PersonalizationSource::Fallback,
        }
    }
}

/// Cache-first personalization with fallback defaults.
#[derive(Clone)]
pub struct PersonalizationService {
    generator: Arc<dyn PersonalizationGenerator>,
    cache: Arc<dyn PersonalizationCache>,
    policy: RetryPolicy,
}

impl PersonalizationService {
    pub fn new(
        generator: Arc<dyn PersonalizationGenerator>,
        cache: Arc<dyn PersonalizationCache>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            generator,
            cache,
            policy,
        }
    }

    /// Personalize for one attendee. Never fails.
    ///
    /// A stored triple for the same email is reused unless `skip_cache` is
    /// set. A stored fallback triple is not treated as a hit.
    pub async fn personalize(
        &self,
        attendee: &AttendeeContext,
        event: &EventContext,
        skip_cache: bool,
    ) -> Personalization {
        if !skip_cache {
            match self.cache.lookup(&attendee.email).await {
                Ok(Some(fields)) if !fields.is_fallback() => {
                    info!(email = %attendee.email, "Using cached personalization");
                    return Personalization {
                        fields,
                        source: PersonalizationSource::Cached,
                    };
                }
                Ok(_) => debug!(email = %attendee.email, "No cached personalization"),
                Err(e) => warn!(email = %attendee.email, error = %e, "Personalization cache lookup failed"),
            }
        }

        let generated = with_retry(&self.policy, "personalization.generate", || {
            self.generator.generate(attendee, event)
        })
        .await;

        match generated {
            Ok(fields) if is_complete(&fields) => Personalization {
                fields,
                source: PersonalizationSource::Generated,
            },
            Ok(_) => {
                warn!(email = %attendee.email, "Generator returned empty fields, using defaults");
                Personalization::fallback()
            }
            Err(e) => {
                warn!(email = %attendee.email, error = %e, "Personalization failed, using defaults");
                Personalization::fallback()
            }
        }
    }

    /// Three-step follow-up series. Never fails; never cached.
    pub async fn series(&self, attendee: &AttendeeContext, event: &EventContext) -> Vec<EmailSeriesStep> {
        let generated = with_retry(&self.policy, "personalization.series", || {
            self.generator.generate_series(attendee, event)
        })
        .await;

        match generated {
            Ok(steps) if is_valid_series(&steps) => steps,
            Ok(steps) => {
                warn!(steps = steps.len(), "Generated series is malformed, using defaults");
                default_series(&attendee.name, &event.name)
            }
            Err(e) => {
                warn!(error = %e, "Series generation failed, using defaults");
                default_series(&attendee.name, &event.name)
            }
        }
    }
}

fn is_complete(fields: &PersonalizedFields) -> bool {
    !fields.subject_line.trim().is_empty()
        && !fields.intro.trim().is_empty()
        && !fields.cta.trim().is_empty()
}

fn is_valid_series(steps: &[EmailSeriesStep]) -> bool {
    steps.len() == 3
        && steps
            .iter()
            .zip(1u8..)
            .all(|(s, n)| s.step == n && !s.subject.trim().is_empty() && !s.body.trim().is_empty())
}

/// Fixed series used when generation is unavailable.
pub fn default_series(attendee_name: &str, event_name: &str) -> Vec<EmailSeriesStep> {
    vec![
        EmailSeriesStep {
            step: 1,
            send_day: 0,
            subject: format!("Great meeting you at {event_name}!"),
            body: format!(
                "Hi {attendee_name},\n\nThank you for attending {event_name}! It was great connecting with so many people passionate about engineering talent.\n\nWe'd love to keep the conversation going."
            ),
            cta: "Reply to this email if you'd like to learn more. We'd love to hear from you.".to_string(),
        },
        EmailSeriesStep {
            step: 2,
            send_day: 3,
            subject: "How top engineering teams are rethinking hiring".to_string(),
            body: format!(
                "Hi {attendee_name},\n\nFollowing up from {event_name}. Something we keep hearing from engineering leaders: traditional interviews miss the skills that actually matter on the job.\n\nHands-on, simulation-based assessments show how candidates think and build before they're hired."
            ),
            cta: "Would it be helpful if I sent over a case study relevant to your team?".to_string(),
        },
        EmailSeriesStep {
            step: 3,
            send_day: 7,
            subject: "Quick question for you".to_string(),
            body: format!(
                "Hi {attendee_name},\n\nI hope the week's been great since {event_name}. Is improving your engineering hiring process something your team is actively thinking about?\n\nIf so, I'd love to show you how it works in a quick 15-minute walkthrough."
            ),
            cta: "Would any day next week work for a brief call? Happy to work around your schedule.".to_string(),
        },
    ]
}

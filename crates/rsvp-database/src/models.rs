//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event lifecycle status. Registration is only accepted while `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Active,
    Completed,
    Archived,
}

impl Default for EventStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    /// Lenient parse; unknown values read as `Draft`.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => Self::Active,
            "completed" => Self::Completed,
            "archived" => Self::Archived,
            _ => Self::Draft,
        }
    }
}

/// Event record. Owned by the event management surface; read-only here
/// apart from seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub company_name: String,
    /// Trigger name fired in the marketing system after registration.
    pub lifecycle_trigger: String,
    pub interest_options: Vec<String>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub date: DateTime<Utc>,
    pub company_name: String,
    pub lifecycle_trigger: String,
    pub interest_options: Vec<String>,
    pub status: EventStatus,
}

/// AI-personalized follow-up text attached to an attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalizedFields {
    pub subject_line: String,
    pub intro: String,
    pub cta: String,
}

/// Fallback triple used whenever generation fails.
pub const DEFAULT_PERSONALIZATION: DefaultPersonalization = DefaultPersonalization {
    subject_line: "Great connecting with you at the event!",
    intro: "Thank you for attending our event! We loved having you there.",
    cta: "We'd love to continue the conversation — reply to this email and let us know how we can help.",
};

/// Const form of [`PersonalizedFields`].
#[derive(Debug, Clone, Copy)]
pub struct DefaultPersonalization {
    pub subject_line: &'static str,
    pub intro: &'static str,
    pub cta: &'static str,
}

impl DefaultPersonalization {
    pub fn to_fields(&self) -> PersonalizedFields {
        PersonalizedFields {
            subject_line: self.subject_line.to_string(),
            intro: self.intro.to_string(),
            cta: self.cta.to_string(),
        }
    }
}

impl PersonalizedFields {
    /// The fixed fallback triple.
    pub fn fallback() -> Self {
        DEFAULT_PERSONALIZATION.to_fields()
    }

    pub fn is_fallback(&self) -> bool {
        *self == Self::fallback()
    }
}

/// Attendee record - one registration for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub interests: Vec<String>,
    pub segment: String,
    pub personalized_intro: Option<String>,
    pub personalized_cta: Option<String>,
    pub personalized_subject: Option<String>,
    pub contact_synced: bool,
    pub lifecycle_event_fired: bool,
    pub registered_at: DateTime<Utc>,
}

impl Attendee {
    /// Stored personalization, if all three fields are present.
    pub fn personalization(&self) -> Option<PersonalizedFields> {
        Some(PersonalizedFields {
            subject_line: self.personalized_subject.clone()?,
            intro: self.personalized_intro.clone()?,
            cta: self.personalized_cta.clone()?,
        })
    }
}

/// Input for creating a new attendee.
#[derive(Debug, Clone)]
pub struct NewAttendee {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub interests: Vec<String>,
    pub segment: String,
}

/// Attendee attribute which a ledger flag update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendeeFlag {
    ContactSynced,
    LifecycleEventFired,
}

impl AttendeeFlag {
    pub fn column(&self) -> &'static str {
        match self {
            Self::ContactSynced => "contact_synced",
            Self::LifecycleEventFired => "lifecycle_event_fired",
        }
    }
}

/// Everything the contact directory needs to upsert one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSnapshot {
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub interests: Vec<String>,
    pub segment: String,
    pub event_name: String,
    pub event_slug: String,
}

/// Kind of failed outbound operation held in the retry ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOperation {
    ContactSync,
    LifecycleEventFire,
}

impl LedgerOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContactSync => "contact_sync",
            Self::LifecycleEventFire => "lifecycle_event_fire",
        }
    }

    /// Parse a stored operation name. Unknown names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contact_sync" => Some(Self::ContactSync),
            "lifecycle_event_fire" => Some(Self::LifecycleEventFire),
            _ => None,
        }
    }

    /// Attendee flag set once this operation succeeds.
    pub fn flag(&self) -> AttendeeFlag {
        match self {
            Self::ContactSync => AttendeeFlag::ContactSynced,
            Self::LifecycleEventFire => AttendeeFlag::LifecycleEventFired,
        }
    }
}

/// Replay arguments for a ledger entry, one variant per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerPayload {
    ContactSync {
        contact: ContactSnapshot,
        personalization: PersonalizedFields,
    },
    LifecycleEventFire {
        email: String,
        trigger_name: String,
        properties: serde_json::Map<String, serde_json::Value>,
    },
}

impl LedgerPayload {
    pub fn operation(&self) -> LedgerOperation {
        match self {
            Self::ContactSync { .. } => LedgerOperation::ContactSync,
            Self::LifecycleEventFire { .. } => LedgerOperation::LifecycleEventFire,
        }
    }

    /// Decode a stored payload against its stored operation name.
    ///
    /// Returns `None` for unknown operations or a payload whose shape does
    /// not match the operation.
    pub fn decode(operation: &str, payload: &str) -> Option<Self> {
        let decoded = match LedgerOperation::parse(operation)? {
            LedgerOperation::ContactSync => {
                #[derive(Deserialize)]
                struct Args {
                    contact: ContactSnapshot,
                    personalization: PersonalizedFields,
                }
                let args: Args = serde_json::from_str(payload).ok()?;
                Self::ContactSync {
                    contact: args.contact,
                    personalization: args.personalization,
                }
            }
            LedgerOperation::LifecycleEventFire => {
                #[derive(Deserialize)]
                struct Args {
                    email: String,
                    trigger_name: String,
                    #[serde(default)]
                    properties: serde_json::Map<String, serde_json::Value>,
                }
                let args: Args = serde_json::from_str(payload).ok()?;
                Self::LifecycleEventFire {
                    email: args.email,
                    trigger_name: args.trigger_name,
                    properties: args.properties,
                }
            }
        };
        Some(decoded)
    }
}

/// Retry ledger entry - a failed best-effort call awaiting replay.
///
/// Visible to the sweep only while `resolved_at` is null and
/// `next_retry_at <= now`. Never deleted.
#[derive(Debug, Clone)]
pub struct RetryLedgerEntry {
    pub id: String,
    pub attendee_id: String,
    /// Raw stored operation name; see [`LedgerOperation::parse`].
    pub operation: String,
    /// Raw stored JSON payload; see [`LedgerPayload::decode`].
    pub payload: String,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RetryLedgerEntry {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    pub fn decode_payload(&self) -> Option<LedgerPayload> {
        LedgerPayload::decode(&self.operation, &self.payload)
    }
}

/// Input for recording a new ledger entry.
#[derive(Debug, Clone)]
pub struct NewRetryLedgerEntry {
    pub id: String,
    pub attendee_id: String,
    pub payload: LedgerPayload,
    pub last_error: String,
    pub next_retry_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact() -> ContactSnapshot {
        ContactSnapshot {
            email: "jane@x.com".to_string(),
            name: "Jane Smith".to_string(),
            company: None,
            role: Some("CTO".to_string()),
            interests: vec!["demo".to_string()],
            segment: "demo".to_string(),
            event_name: "Hardtech Summit".to_string(),
            event_slug: "hardtech-summit".to_string(),
        }
    }

    #[test]
    fn test_default_personalization_text() {
        let fields = PersonalizedFields::fallback();
        assert_eq!(fields.subject_line, "Great connecting with you at the event!");
        assert_eq!(
            fields.intro,
            "Thank you for attending our event! We loved having you there."
        );
        assert_eq!(
            fields.cta,
            "We'd love to continue the conversation — reply to this email and let us know how we can help."
        );
        assert!(fields.is_fallback());
    }

    #[test]
    fn test_event_status_parse() {
        assert_eq!(EventStatus::parse("active"), EventStatus::Active);
        assert_eq!(EventStatus::parse("ACTIVE"), EventStatus::Active);
        assert_eq!(EventStatus::parse("completed"), EventStatus::Completed);
        assert_eq!(EventStatus::parse("archived"), EventStatus::Archived);
        assert_eq!(EventStatus::parse("draft"), EventStatus::Draft);
        assert_eq!(EventStatus::parse("bogus"), EventStatus::Draft);
    }

    #[test]
    fn test_ledger_operation_names() {
        assert_eq!(LedgerOperation::ContactSync.as_str(), "contact_sync");
        assert_eq!(
            LedgerOperation::parse("lifecycle_event_fire"),
            Some(LedgerOperation::LifecycleEventFire)
        );
        assert_eq!(LedgerOperation::parse("send_email"), None);
        assert_eq!(
            LedgerOperation::ContactSync.flag(),
            AttendeeFlag::ContactSynced
        );
    }

    #[test]
    fn test_payload_decode_matches_operation() {
        let payload = LedgerPayload::ContactSync {
            contact: contact(),
            personalization: PersonalizedFields::fallback(),
        };
        let json = serde_json::to_string(&payload).unwrap();

        assert_eq!(LedgerPayload::decode("contact_sync", &json), Some(payload));
        // Right JSON, wrong operation.
        assert_eq!(LedgerPayload::decode("lifecycle_event_fire", &json), None);
        assert_eq!(LedgerPayload::decode("unknown", &json), None);
        assert_eq!(LedgerPayload::decode("contact_sync", "not json"), None);
    }

    #[test]
    fn test_lifecycle_payload_defaults_properties() {
        let raw = json!({"email": "jane@x.com", "trigger_name": "summit_registered"}).to_string();
        let decoded = LedgerPayload::decode("lifecycle_event_fire", &raw).unwrap();
        match decoded {
            LedgerPayload::LifecycleEventFire { properties, .. } => assert!(properties.is_empty()),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_attendee_personalization_requires_all_fields() {
        let mut attendee = Attendee {
            id: "a1".to_string(),
            event_id: "e1".to_string(),
            name: "Jane Smith".to_string(),
            email: "jane@x.com".to_string(),
            company: None,
            role: None,
            interests: vec![],
            segment: "general".to_string(),
            personalized_intro: Some("hi".to_string()),
            personalized_cta: Some("call".to_string()),
            personalized_subject: None,
            contact_synced: false,
            lifecycle_event_fired: false,
            registered_at: Utc::now(),
        };
        assert!(attendee.personalization().is_none());

        attendee.personalized_subject = Some("subject".to_string());
        assert_eq!(attendee.personalization().unwrap().intro, "hi");
    }

    #[test]
    fn test_fallback_detection() {
        assert!(PersonalizedFields::fallback().is_fallback());
        let mut fields = PersonalizedFields::fallback();
        fields.intro = "custom".to_string();
        assert!(!fields.is_fallback());
    }
}

//! Loops API client: contact directory sync and lifecycle events.

use crate::error::{GatewayError, GatewayResult};
use crate::truncate;
use async_trait::async_trait;
use rsvp_database::{ContactSnapshot, PersonalizedFields};
use serde_json::{json, Map, Value};
use std::time::Duration;

const LOOPS_API_URL: &str = "https://app.loops.so/api";
const PROVIDER: &str = "Loops";

/// Contact source recorded on every synced contact.
pub const CONTACT_SOURCE: &str = "event_registration";

/// Create-or-update of a directory contact, keyed by email.
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn upsert_contact(
        &self,
        contact: &ContactSnapshot,
        personalization: &PersonalizedFields,
    ) -> GatewayResult<()>;
}

/// Fire a named trigger in the marketing system.
#[async_trait]
pub trait LifecycleEvents: Send + Sync {
    async fn fire_event(
        &self,
        email: &str,
        trigger_name: &str,
        properties: &Map<String, Value>,
    ) -> GatewayResult<()>;
}

/// Loops API client.
#[derive(Clone, Debug)]
pub struct LoopsClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LoopsClient {
    /// Create a new client. Redirects are refused.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::custom(|attempt| {
                attempt.error("redirects are not followed")
            }))
            .build()?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: LOOPS_API_URL.to_string(),
        })
    }

    /// Point the client at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn request(&self, method: reqwest::Method, path: &str, body: &Value) -> GatewayResult<Value> {
        let response = self
            .http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        interpret_response(status, content_type.as_deref(), &body)
    }
}

/// Map a raw Loops response onto success or a typed error.
///
/// - 429 is `RateLimited` regardless of body
/// - a non-JSON body is an `Api` error carrying its first 200 chars
/// - non-2xx or `"success": false` is an `Api` error with the provider message
fn interpret_response(status: u16, content_type: Option<&str>, body: &str) -> GatewayResult<Value> {
    if status == 429 {
        return Err(GatewayError::RateLimited { provider: PROVIDER });
    }

    let is_json = content_type
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(GatewayError::Api {
            provider: PROVIDER,
            status,
            message: format!("non-JSON response: {}", truncate(body, 200)),
        });
    }

    let data: Value = serde_json::from_str(body)?;
    let ok = (200..300).contains(&status);
    if !ok || data.get("success") == Some(&Value::Bool(false)) {
        let message = data
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Loops API error: {status}"));
        return Err(GatewayError::Api {
            provider: PROVIDER,
            status,
            message,
        });
    }

    Ok(data)
}

/// Build the Loops contact body. Absent values are omitted.
pub fn contact_payload(contact: &ContactSnapshot, personalization: &PersonalizedFields) -> Map<String, Value> {
    let mut parts = contact.name.split_whitespace();
    let first_name = parts.next().unwrap_or_default().to_string();
    let last_name = parts.collect::<Vec<_>>().join(" ");

    let mut payload = Map::new();
    payload.insert("email".into(), json!(contact.email));
    payload.insert("firstName".into(), json!(first_name));
    insert_present(&mut payload, "lastName", Some(last_name.as_str()));
    payload.insert("source".into(), json!(CONTACT_SOURCE));
    insert_present(&mut payload, "userGroup", Some(contact.segment.as_str()));
    insert_present(&mut payload, "company", contact.company.as_deref());
    insert_present(&mut payload, "role", contact.role.as_deref());
    payload.insert("interests".into(), json!(contact.interests.join(", ")));
    payload.insert("personalizedIntro".into(), json!(personalization.intro));
    payload.insert("personalizedCta".into(), json!(personalization.cta));
    payload.insert("personalizedSubject".into(), json!(personalization.subject_line));
    insert_present(&mut payload, "eventName", Some(contact.event_name.as_str()));
    insert_present(&mut payload, "eventSlug", Some(contact.event_slug.as_str()));
    payload
}

fn insert_present(payload: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        payload.insert(key.to_string(), json!(value));
    }
}

#[async_trait]
impl ContactDirectory for LoopsClient {
    async fn upsert_contact(
        &self,
        contact: &ContactSnapshot,
        personalization: &PersonalizedFields,
    ) -> GatewayResult<()> {
        let body = Value::Object(contact_payload(contact, personalization));
        self.request(reqwest::Method::PUT, "/v1/contacts/update", &body)
            .await?;
        tracing::info!(email = %contact.email, "Contact synced to Loops");
        Ok(())
    }
}

#[async_trait]
impl LifecycleEvents for LoopsClient {
    async fn fire_event(
        &self,
        email: &str,
        trigger_name: &str,
        properties: &Map<String, Value>,
    ) -> GatewayResult<()> {
        let body = json!({
            "email": email,
            "eventName": trigger_name,
            "eventProperties": properties,
        });
        self.request(reqwest::Method::POST, "/v1/events/send", &body)
            .await?;
        tracing::info!(email = %email, trigger = %trigger_name, "Event fired in Loops");
        Ok(())
    }
}

//! Gemini API client for personalized follow-up content.

use crate::error::{GatewayError, GatewayResult};
use crate::truncate;
use crate::personalization::{AttendeeContext, EmailSeriesStep, EventContext, PersonalizationGenerator};
use async_trait::async_trait;
use rsvp_database::PersonalizedFields;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "gemini-2.0-flash";

/// Gemini client generating JSON-structured content.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Shape the model is asked to return for the single triple.
#[derive(Debug, Deserialize)]
struct PersonalizedResponse {
    personalized_intro: String,
    personalized_cta: String,
    personalized_subject_line: String,
}

impl GeminiClient {
    /// Create a new client with the given API key and request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: GEMINI_API_URL.to_string(),
        })
    }

    /// Point the client at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Send one prompt and return the model's text output.
    async fn generate_text(&self, prompt: String, schema: Value) -> GatewayResult<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            },
        };

        tracing::debug!(model = MODEL, "Sending generation request to Gemini");

        let response = self
            .http_client
            .post(format!("{}/models/{}:generateContent", self.base_url, MODEL))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(GatewayError::RateLimited { provider: "Gemini" });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body_len = body.len(), "Gemini API error");
            return Err(GatewayError::Api {
                provider: "Gemini",
                status: status.as_u16(),
                message: truncate(&body, 200),
            });
        }

        let completion: GenerateContentResponse = response.json().await?;
        let text = completion
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse("Gemini returned no text".to_string()))?;

        Ok(text)
    }
}

#[async_trait]
impl PersonalizationGenerator for GeminiClient {
    async fn generate(
        &self,
        attendee: &AttendeeContext,
        event: &EventContext,
    ) -> GatewayResult<PersonalizedFields> {
        let text = self
            .generate_text(personalization_prompt(attendee, event), personalization_schema())
            .await?;
        let fields = parse_personalization(&text)?;
        tracing::info!(email = %attendee.email, "Generated personalization");
        Ok(fields)
    }

    async fn generate_series(
        &self,
        attendee: &AttendeeContext,
        event: &EventContext,
    ) -> GatewayResult<Vec<EmailSeriesStep>> {
        let text = self
            .generate_text(series_prompt(attendee, event), series_schema())
            .await?;
        serde_json::from_str(strip_code_fence(&text))
            .map_err(|e| GatewayError::InvalidResponse(format!("series is not valid JSON: {e}")))
    }
}

fn parse_personalization(text: &str) -> GatewayResult<PersonalizedFields> {
    let parsed: PersonalizedResponse = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| GatewayError::InvalidResponse(format!("personalization is not valid JSON: {e}")))?;
    Ok(PersonalizedFields {
        subject_line: parsed.personalized_subject_line,
        intro: parsed.personalized_intro,
        cta: parsed.personalized_cta,
    })
}

/// Models sometimes wrap JSON in a markdown fence despite the mime type.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn attendee_block(attendee: &AttendeeContext, event: &EventContext) -> String {
    let interests = if attendee.interests.is_empty() {
        "General".to_string()
    } else {
        attendee.interests.join(", ")
    };
    let mut block = format!(
        "Attendee info:\n- Name: {}\n- Company: {}\n- Role: {}\n- Interests: {}\n- Event: {} on {}",
        attendee.name,
        attendee.company.as_deref().unwrap_or("Unknown"),
        attendee.role.as_deref().unwrap_or("Unknown"),
        interests,
        event.name,
        event.date.format("%A, %B %-d, %Y"),
    );
    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        block.push_str(&format!("\n- Event description: {description}"));
    }
    block
}

fn personalization_prompt(attendee: &AttendeeContext, event: &EventContext) -> String {
    format!(
        r#"You are a friendly sales development rep at {host} writing follow-up emails after {event} hosted by {host}.

{info}

Generate the following as a JSON object:
{{
  "personalized_intro": "A warm 1-2 sentence opener that references something specific about their role or company. Do NOT be generic.",
  "personalized_cta": "A specific, low-friction call to action tailored to their interest segment. For 'demo' suggest a 15-min walkthrough. For 'partnership' suggest a collaboration brainstorm. For 'learn-more' offer a relevant case study or resource.",
  "personalized_subject_line": "A short, curiosity-driven subject line that references the event and feels personal. No clickbait."
}}

Return ONLY valid JSON, no markdown, no explanation."#,
        host = event.company_name,
        event = event.name,
        info = attendee_block(attendee, event),
    )
}

fn series_prompt(attendee: &AttendeeContext, event: &EventContext) -> String {
    format!(
        r#"You are a friendly sales development rep at {host} writing a 3-email drip sequence for an attendee after {event}.

{info}

Generate a 3-email sequence as a JSON array. Each email should feel like a natural continuation, not repetitive. Be helpful and conversational, not salesy.

Email 1 (step: 1, send_day: 0): thank-you and brief recap, 2 paragraphs max.
Email 2 (step: 2, send_day: 3): value follow-up referencing their interests or role.
Email 3 (step: 3, send_day: 7): a direct but low-pressure ask based on their interest segment ('demo' walkthrough, 'partnership' call, 'learn-more' case study, otherwise an open "how can we help?").

For each email return: step (1/2/3), send_day (0/3/7), subject (under 60 chars), body (2-3 short paragraphs), cta (one closing call-to-action sentence).

Return ONLY a valid JSON array of 3 objects."#,
        host = event.company_name,
        event = event.name,
        info = attendee_block(attendee, event),
    )
}

fn personalization_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "personalized_intro": { "type": "STRING" },
            "personalized_cta": { "type": "STRING" },
            "personalized_subject_line": { "type": "STRING" }
        },
        "required": ["personalized_intro", "personalized_cta", "personalized_subject_line"]
    })
}

fn series_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "step": { "type": "INTEGER" },
                "send_day": { "type": "INTEGER" },
                "subject": { "type": "STRING" },
                "body": { "type": "STRING" },
                "cta": { "type": "STRING" }
            },
            "required": ["step", "send_day", "subject", "body", "cta"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn attendee() -> AttendeeContext {
        AttendeeContext {
            name: "Jane Smith".to_string(),
            email: "jane@x.com".to_string(),
            company: None,
            role: Some("CTO".to_string()),
            interests: vec![],
        }
    }

    fn event() -> EventContext {
        EventContext {
            name: "Hardtech Summit".to_string(),
            description: Some("Hiring for hardware teams".to_string()),
            date: Utc.with_ymd_and_hms(2025, 3, 14, 18, 0, 0).unwrap(),
            company_name: "Colare".to_string(),
        }
    }

    fn candidate(text: &str) -> Value {
        json!({ "candidates": [ { "content": { "parts": [ { "text": text } ] } } ] })
    }

    #[test]
    fn prompt_includes_attendee_and_event() {
        let prompt = personalization_prompt(&attendee(), &event());
        assert!(prompt.contains("- Name: Jane Smith"));
        assert!(prompt.contains("- Company: Unknown"));
        assert!(prompt.contains("- Interests: General"));
        assert!(prompt.contains("Friday, March 14, 2025"));
        assert!(prompt.contains("hosted by Colare"));
    }

    #[test]
    fn series_prompt_includes_description() {
        let prompt = series_prompt(&attendee(), &event());
        assert!(prompt.contains("- Event description: Hiring for hardware teams"));
    }

    #[test]
    fn parse_personalization_accepts_fenced_json() {
        let text = "```json\n{\"personalized_intro\":\"i\",\"personalized_cta\":\"c\",\"personalized_subject_line\":\"s\"}\n```";
        let fields = parse_personalization(text).unwrap();
        assert_eq!(fields.subject_line, "s");
        assert_eq!(fields.intro, "i");
        assert_eq!(fields.cta, "c");
    }

    #[test]
    fn parse_personalization_rejects_missing_fields() {
        let err = parse_personalization(r#"{"personalized_intro":"i"}"#).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn generate_reads_first_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate(
                r#"{"personalized_intro":"Hi Jane","personalized_cta":"Book a demo","personalized_subject_line":"Summit follow-up"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri());
        let fields = client.generate(&attendee(), &event()).await.unwrap();
        assert_eq!(fields.intro, "Hi Jane");
        assert_eq!(fields.subject_line, "Summit follow-up");
    }

    #[tokio::test]
    async fn empty_candidates_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("k", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri());
        let err = client.generate(&attendee(), &event()).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn connection_errors_do_not_carry_the_api_key() {
        let client = GeminiClient::new("SECRET-GEMINI-KEY", Duration::from_secs(2))
            .unwrap()
            .with_base_url("http://127.0.0.1:1");

        let err = client.generate(&attendee(), &event()).await.unwrap_err();

        assert!(matches!(err, GatewayError::Http(_)));
        let text = err.to_string();
        assert!(!text.contains("SECRET-GEMINI-KEY"), "{text}");
        assert!(!text.contains("127.0.0.1"), "{text}");
    }

    #[tokio::test]
    async fn rate_limit_is_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = GeminiClient::new("k", Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri());
        let err = client.generate_series(&attendee(), &event()).await.unwrap_err();
        assert!(err.is_rate_limited());
    }
}

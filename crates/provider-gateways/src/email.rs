//! Transactional email: registration confirmation via Resend.

use crate::error::{GatewayError, GatewayResult};
use crate::truncate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const RESEND_API_URL: &str = "https://api.resend.com";

/// Send one HTML email and return the provider's message id.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> GatewayResult<String>;
}

/// Confirmation email contents.
#[derive(Debug, Clone)]
pub struct ConfirmationEmail {
    pub attendee_name: String,
    pub attendee_email: String,
    pub event_name: String,
    pub event_date: DateTime<Utc>,
    pub company_name: String,
    pub personalized_subject: Option<String>,
}

impl ConfirmationEmail {
    /// Personalized subject when present, else a generic confirmation line.
    pub fn subject(&self) -> String {
        match self.personalized_subject.as_deref().map(str::trim) {
            Some(subject) if !subject.is_empty() => subject.to_string(),
            _ => format!("Registration confirmed: {}", self.event_name),
        }
    }

    /// HTML body. All interpolated values are escaped.
    pub fn html(&self) -> String {
        let name = escape_html(&self.attendee_name);
        let event = escape_html(&self.event_name);
        let company = escape_html(&self.company_name);
        let date = self.event_date.format("%A, %B %-d, %Y");

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; color: #333;">
  <div style="background: #5a67d8; padding: 30px; border-radius: 12px 12px 0 0; text-align: center;">
    <h1 style="color: white; margin: 0; font-size: 24px;">You're Registered!</h1>
  </div>
  <div style="background: #ffffff; padding: 30px; border: 1px solid #e0e0e0; border-top: none; border-radius: 0 0 12px 12px;">
    <p style="font-size: 16px;">Hi {name},</p>
    <p>Thank you for registering for <strong>{event}</strong>. We're excited to have you!</p>
    <table style="width: 100%; margin: 20px 0; border-collapse: collapse;">
      <tr><td style="padding: 8px 0; color: #666; font-weight: bold;">Event</td><td style="padding: 8px 0;">{event}</td></tr>
      <tr><td style="padding: 8px 0; color: #666; font-weight: bold;">Date</td><td style="padding: 8px 0;">{date}</td></tr>
      <tr><td style="padding: 8px 0; color: #666; font-weight: bold;">Hosted by</td><td style="padding: 8px 0;">{company}</td></tr>
    </table>
    <p>We'll send you more details as the event approaches. Stay tuned!</p>
    <hr style="border: none; border-top: 1px solid #eee; margin: 20px 0;" />
    <p style="color: #999; font-size: 12px; text-align: center;">
      This email was sent by {company}.<br/>
      If you did not register for this event, please disregard this message.
    </p>
  </div>
</body>
</html>"#
        )
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Resend API client.
#[derive(Clone, Debug)]
pub struct ResendClient {
    http_client: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ResendErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl ResendClient {
    pub fn new(
        api_key: impl Into<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_key: api_key.into(),
            from: from.into(),
            base_url: RESEND_API_URL.to_string(),
        })
    }

    /// Point the client at another endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EmailSender for ResendClient {
    async fn send(&self, to: &str, subject: &str, html: &str) -> GatewayResult<String> {
        let request = SendEmailRequest {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        let response = self
            .http_client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 429 {
            return Err(GatewayError::RateLimited { provider: "Resend" });
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ResendErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| truncate(&body, 200));
            tracing::error!(status, to = %to, "Resend send failed");
            return Err(GatewayError::Api {
                provider: "Resend",
                status,
                message,
            });
        }

        let sent: SendEmailResponse = response.json().await?;
        tracing::info!(email_id = %sent.id, to = %to, "Email sent");
        Ok(sent.id)
    }
}

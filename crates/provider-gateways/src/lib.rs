//! Outbound provider gateways.
//!
//! Each external capability sits behind a trait so the registration flow and
//! the sync worker can be driven by fakes:
//!
//! - [`PersonalizationGenerator`] (Gemini) with a [`PersonalizationCache`]
//! - [`ContactDirectory`] and [`LifecycleEvents`] (Loops)
//! - [`EmailSender`] (Resend)
//!
//! [`Gateways`] bundles them and applies [`RetryPolicy`] to every call.

mod email;
mod error;
mod gateways;
mod gemini;
mod loops;
mod personalization;
mod retry;

pub use email::{ConfirmationEmail, EmailSender, ResendClient};
pub use error::{GatewayError, GatewayResult};
pub use gateways::Gateways;
pub use gemini::GeminiClient;
pub use loops::{contact_payload, ContactDirectory, LifecycleEvents, LoopsClient, CONTACT_SOURCE};
pub use personalization::{
    default_series, AttendeeContext, EmailSeriesStep, EventContext, Personalization,
    PersonalizationCache, PersonalizationGenerator, PersonalizationService, PersonalizationSource,
};
pub use retry::{unavailable, with_retry, RetryPolicy};

/// First `max_chars` characters of a provider response body.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_counts_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}

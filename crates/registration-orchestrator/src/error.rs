//! Registration error types.

use crate::validation::FieldError;
use thiserror::Error;

/// Errors visible to the registration caller.
///
/// Integration failures after the attendee is stored never surface here.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Input rejected before any side effect
    #[error("Invalid registration: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// No event with this slug
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// Event exists but is not accepting registrations
    #[error("Event is not currently accepting registrations: {0}")]
    EventNotActive(String),

    /// Same email already registered for this event
    #[error("Already registered for this event: {0}")]
    AlreadyRegistered(String),

    /// Store failure on lookup or insert
    #[error("Failed to register: {0}")]
    Persistence(#[from] rsvp_database::DatabaseError),
}

impl RegistrationError {
    /// HTTP-style status for the public endpoint.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::EventNotActive(_) => 400,
            Self::EventNotFound(_) => 404,
            Self::AlreadyRegistered(_) => 409,
            Self::Persistence(_) => 500,
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using RegistrationError.
pub type RegistrationResult<T> = Result<T, RegistrationError>;

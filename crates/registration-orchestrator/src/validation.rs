//! Registration input normalization and validation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

const MAX_NAME: usize = 200;
const MAX_EMAIL: usize = 254;
const MAX_COMPANY: usize = 200;
const MAX_ROLE: usize = 100;
const MAX_INTERESTS: usize = 10;
const MAX_INTEREST: usize = 100;

/// Raw registration input as submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Input after trimming and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub interests: Vec<String>,
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@.]+$").expect("email pattern compiles")
    })
}

/// Normalize and validate input. Every violation is reported.
pub fn validate(input: &RegistrationInput) -> Result<ValidRegistration, Vec<FieldError>> {
    let mut errors = Vec::new();

    let name = input.name.trim().to_string();
    if name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    } else if name.chars().count() > MAX_NAME {
        errors.push(FieldError::new("name", format!("must be at most {MAX_NAME} characters")));
    }

    let email = input.email.trim().to_string();
    if email.is_empty() {
        errors.push(FieldError::new("email", "is required"));
    } else if email.chars().count() > MAX_EMAIL {
        errors.push(FieldError::new("email", format!("must be at most {MAX_EMAIL} characters")));
    } else if !email_pattern().is_match(&email) {
        errors.push(FieldError::new("email", "is not a valid email address"));
    }

    let company = optional(&input.company);
    if exceeds(&company, MAX_COMPANY) {
        errors.push(FieldError::new("company", format!("must be at most {MAX_COMPANY} characters")));
    }

    let role = optional(&input.role);
    if exceeds(&role, MAX_ROLE) {
        errors.push(FieldError::new("role", format!("must be at most {MAX_ROLE} characters")));
    }

    if input.interests.len() > MAX_INTERESTS {
        errors.push(FieldError::new("interests", format!("must have at most {MAX_INTERESTS} entries")));
    }
    let interests: Vec<String> = input
        .interests
        .iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    if interests.iter().any(|tag| tag.chars().count() > MAX_INTEREST) {
        errors.push(FieldError::new(
            "interests",
            format!("entries must be at most {MAX_INTEREST} characters"),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidRegistration {
        name,
        email,
        company,
        role,
        interests,
    })
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn exceeds(value: &Option<String>, max: usize) -> bool {
    value.as_ref().is_some_and(|v| v.chars().count() > max)
}

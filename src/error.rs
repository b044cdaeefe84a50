//! Error handling for the ClassVibes client

use std::fmt;
use thiserror::Error;

use classvibes_postgrest::PostgrestError;

use crate::auth::Role;
use crate::teachers::SagaStep;

/// Unified error type for the ClassVibes client
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors reported by the remote data service
    #[error("Database error: {0}")]
    Postgrest(#[from] PostgrestError),

    /// Session or saga log file errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A form field failed validation
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Wrong user or password")]
    InvalidCredentials,

    #[error("An account with email {0} already exists")]
    EmailTaken(String),

    #[error("Profile \"{0}\" not found in perfiles")]
    RoleNotFound(String),

    #[error("Could not find a free username for {base} after {attempts} attempts")]
    UsernameExhausted { base: String, attempts: u32 },

    /// A saga step failed; `compensated` tells whether every prior step was undone.
    #[error("Teacher onboarding failed at {step}: {source} ({})", compensation_note(.compensated))]
    OnboardingFailed {
        step: SagaStep,
        #[source]
        source: Box<Error>,
        compensated: bool,
    },

    #[error("Onboarding for {0} is already in progress; run recovery first")]
    SagaInProgress(String),

    #[error("{0} was already onboarded with different details")]
    OnboardingConflict(String),

    #[error("Course {0} not found")]
    CourseNotFound(i64),

    #[error("Teacher {0} not found")]
    TeacherNotFound(i64),

    #[error("Could not resolve the teacher id of the current user")]
    TeacherNotResolved,

    #[error("A payment is already being confirmed")]
    PaymentInFlight,
}

fn compensation_note(compensated: &bool) -> &'static str {
    if *compensated {
        "changes rolled back"
    } else {
        "rollback incomplete"
    }
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new validation error for `field`
    pub fn validation<T: fmt::Display>(field: &'static str, msg: T) -> Self {
        Error::Validation {
            field,
            message: msg.to_string(),
        }
    }

    /// A write that should have returned a row returned none
    pub(crate) fn missing_row(what: &str) -> Self {
        Error::Postgrest(PostgrestError::DeserializationError(format!(
            "{} returned no row",
            what
        )))
    }

    /// Create a role mismatch error
    pub(crate) fn wrong_role(expected: Role) -> Self {
        Error::Forbidden(format!("this action requires the {} role", expected))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

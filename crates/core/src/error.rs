//! Error taxonomy for a single redemption.
//!
//! Every failure is one of two kinds:
//! - [`Rejection`]: an expected business outcome. The respondent is told specifically what
//!   happened (code already used, study closed, ...).
//! - [`SystemFailure`]: something upstream or in our own data handling went wrong. The
//!   respondent only ever sees a generic message; the detail goes to the log.
//!
//! [`crate::translate`] switches on these variants to pick the message and status.

use crate::config::Service;

#[derive(Debug, thiserror::Error)]
pub enum RedemptionError {
    #[error(transparent)]
    Rejection(#[from] Rejection),
    #[error(transparent)]
    SystemFailure(#[from] SystemFailure),
}

impl RedemptionError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, RedemptionError::Rejection(_))
    }

    /// Convenience constructor for [`SystemFailure::InvalidPayload`].
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        SystemFailure::InvalidPayload(message.into()).into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("access code is malformed")]
    MalformedCode,
    #[error("access code was not recognised")]
    InvalidCode,
    #[error("access code has already been used")]
    CodeAlreadyUsed,
    #[error("collection exercise {collection_exercise_id} has ended")]
    ExerciseClosed { collection_exercise_id: String },
    #[error("unexpected sample unit type '{sample_unit_type}'")]
    UnexpectedSampleUnitType { sample_unit_type: String },
}

/// Why an upstream response could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadResponse {
    /// A 4xx status the caller has no specific handling for.
    Status(u16),
    /// The body was not the JSON we expected.
    InvalidBody(String),
    /// The body parsed but lacked a required field.
    MissingField(&'static str),
}

impl std::fmt::Display for BadResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BadResponse::Status(status) => write!(f, "status {status}"),
            BadResponse::InvalidBody(reason) => write!(f, "invalid body: {reason}"),
            BadResponse::MissingField(field) => write!(f, "{field} missing"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SystemFailure {
    #[error("{service} rejected our credentials ({status}) for {url}")]
    Unauthorized {
        service: Service,
        url: String,
        status: u16,
    },
    #[error("bad response from {service} for {url}: {reason}")]
    BadUpstreamResponse {
        service: Service,
        url: String,
        reason: BadResponse,
    },
    #[error("caseId missing from IAC response")]
    MissingCaseId,
    #[error("{0}")]
    InvalidPayload(String),
    #[error("{service} returned {status} for {url}")]
    UpstreamStatus {
        service: Service,
        url: String,
        status: u16,
    },
    #[error("failed to connect to {service} at {url}: {message}")]
    UpstreamConnection {
        service: Service,
        url: String,
        message: String,
    },
    #[error("failed to sign claims: {0}")]
    Signing(#[from] rh_signing::SigningError),
}

impl From<rh_signing::SigningError> for RedemptionError {
    fn from(err: rh_signing::SigningError) -> Self {
        RedemptionError::SystemFailure(err.into())
    }
}

pub type RedemptionResult<T> = std::result::Result<T, RedemptionError>;

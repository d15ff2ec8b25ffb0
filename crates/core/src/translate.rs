//! Maps redemption errors to what the respondent sees and what gets logged.
//!
//! [`translate`] is pure. [`log`] emits the matching log record; callers invoke both once, at the
//! point where a redemption is abandoned.

use crate::config::Service;
use crate::error::{BadResponse, RedemptionError, Rejection, SystemFailure};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageLevel {
    Error,
    Info,
}

impl MessageLevel {
    /// Lower-case name, used in CSS class names.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageLevel::Error => "error",
            MessageLevel::Info => "info",
        }
    }
}

/// A message panel shown above the access code form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserMessage {
    pub kind: &'static str,
    pub text: &'static str,
    pub level: MessageLevel,
    /// Whether the panel links back to the input that needs correcting.
    pub clickable: bool,
}

pub const BAD_CODE_MSG: UserMessage = UserMessage {
    kind: "BAD_CODE",
    text: "Please enter your access code.",
    level: MessageLevel::Error,
    clickable: true,
};

pub const BAD_CODE_TYPE_MSG: UserMessage = UserMessage {
    kind: "NOT_HOUSEHOLD_CODE",
    text: "Please re-enter your access code and try again.",
    level: MessageLevel::Error,
    clickable: true,
};

pub const BAD_RESPONSE_MSG: UserMessage = UserMessage {
    kind: "SYSTEM_RESPONSE_ERROR",
    text: "There was an error, please enter your access code and try again.",
    level: MessageLevel::Error,
    clickable: true,
};

pub const INVALID_CODE_MSG: UserMessage = UserMessage {
    kind: "INVALID_CODE",
    text: "Please re-enter your access code and try again.",
    level: MessageLevel::Error,
    clickable: true,
};

pub const NOT_AUTHORIZED_MSG: UserMessage = UserMessage {
    kind: "SYSTEM_AUTH_ERROR",
    text: "There was a problem connecting to this study. Please try again later.",
    level: MessageLevel::Error,
    clickable: false,
};

/// What to render for a failed redemption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    /// The access code form with a message panel.
    Panel(UserMessage),
    /// A standalone notice with a heading and one line of text.
    Notice {
        title: &'static str,
        text: &'static str,
    },
    /// The generic error page, with a short summary of what failed.
    Error { summary: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Translation {
    pub status: u16,
    pub page: Page,
}

impl Translation {
    fn panel(status: u16, message: UserMessage) -> Self {
        Self {
            status,
            page: Page::Panel(message),
        }
    }

    fn error(summary: &'static str) -> Self {
        Self {
            status: 500,
            page: Page::Error { summary },
        }
    }
}

pub fn translate(err: &RedemptionError) -> Translation {
    match err {
        RedemptionError::Rejection(rejection) => match rejection {
            Rejection::MalformedCode => Translation::panel(200, BAD_CODE_MSG),
            Rejection::InvalidCode => Translation::panel(202, INVALID_CODE_MSG),
            Rejection::CodeAlreadyUsed => Translation {
                status: 200,
                page: Page::Notice {
                    title: "Study complete",
                    text: "We have already received a response for this access code.",
                },
            },
            Rejection::ExerciseClosed { .. } => Translation {
                status: 200,
                page: Page::Notice {
                    title: "This study is now closed",
                    text: "Thank you for your interest. Responses to this study are no longer being accepted.",
                },
            },
            Rejection::UnexpectedSampleUnitType { .. } => {
                Translation::panel(200, BAD_CODE_TYPE_MSG)
            }
        },
        RedemptionError::SystemFailure(failure) => match failure {
            SystemFailure::Unauthorized { .. } => Translation::panel(200, NOT_AUTHORIZED_MSG),
            SystemFailure::BadUpstreamResponse {
                reason: BadResponse::InvalidBody(_),
                ..
            } => Translation::error("Server error"),
            SystemFailure::BadUpstreamResponse { .. } | SystemFailure::MissingCaseId => {
                Translation::panel(200, BAD_RESPONSE_MSG)
            }
            SystemFailure::InvalidPayload(_) => Translation::error("Failed to redirect to survey"),
            SystemFailure::UpstreamStatus { .. } => Translation::error("Server error"),
            SystemFailure::UpstreamConnection { .. } => {
                Translation::error("Service connection error")
            }
            SystemFailure::Signing(_) => Translation::error("Server error"),
        },
    }
}

/// Emits the log record for `err`. Rejections log at info or warn; system failures at error.
pub fn log(err: &RedemptionError) {
    match err {
        RedemptionError::Rejection(rejection) => match rejection {
            Rejection::MalformedCode => {
                tracing::warn!("Attempt to use a malformed access code");
            }
            Rejection::InvalidCode => {
                tracing::info!("Attempt to use an invalid access code");
            }
            Rejection::CodeAlreadyUsed => {
                tracing::info!("Attempt to use an inactive access code");
            }
            Rejection::ExerciseClosed {
                collection_exercise_id,
            } => {
                tracing::info!(
                    collex_id = %collection_exercise_id,
                    "Attempt to access collection exercise that has already ended"
                );
            }
            Rejection::UnexpectedSampleUnitType { sample_unit_type } => {
                tracing::warn!(
                    sample_unit_type = %sample_unit_type,
                    "Attempt to use unexpected sample unit type"
                );
            }
        },
        RedemptionError::SystemFailure(failure) => log_failure(failure),
    }
}

fn log_failure(failure: &SystemFailure) {
    match failure {
        SystemFailure::Unauthorized {
            service: Service::Iac,
            status,
            ..
        } => {
            tracing::info!(status = status, "Unauthorized access to IAC service attempted");
        }
        SystemFailure::Unauthorized {
            service,
            url,
            status,
        } => {
            tracing::error!(service = %service, url = %url, status = status, "Unauthorized access to service");
        }
        SystemFailure::BadUpstreamResponse {
            service,
            url,
            reason,
        } => match reason {
            BadResponse::Status(status) => {
                tracing::info!(service = %service, status = status, "Client error when accessing {service}");
            }
            BadResponse::InvalidBody(detail) => {
                tracing::error!(
                    service = %service,
                    url = %url,
                    detail = %detail,
                    "Service failed to return expected JSON payload"
                );
            }
            BadResponse::MissingField(field) => {
                tracing::error!(service = %service, url = %url, "{field} missing from {service} response");
            }
        },
        SystemFailure::MissingCaseId => {
            tracing::error!("caseId missing from IAC response");
        }
        SystemFailure::InvalidPayload(message) => {
            tracing::error!(message = %message, "Service failed to build eQ payload");
        }
        SystemFailure::UpstreamStatus {
            service,
            url,
            status,
        } => {
            tracing::error!(service = %service, url = %url, status_code = status, "Upstream request failed");
        }
        SystemFailure::UpstreamConnection {
            service: Service::Iac,
            url,
            message,
        } => {
            tracing::error!(url = %url, message = %message, "Client failed to connect to iac service");
        }
        SystemFailure::UpstreamConnection {
            service,
            url,
            message,
        } => {
            tracing::error!(service = %service, url = %url, message = %message, "Service connection error");
        }
        SystemFailure::Signing(err) => {
            tracing::error!(error = %err, "Failed to sign eQ claims");
        }
    }
}

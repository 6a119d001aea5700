use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::slots::SlotTransitionError;

/// Expected failure conditions of a scheduling request. Every kind ends in
/// a short status line for the user; none of them abort the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Classification,
    Extraction,
    PastDateTime,
    UnparsableDateTime,
    CalendarUnavailable,
    NoMatchFound,
    NoUpcomingMeetings,
    NoValidParticipants,
    MissingDetails,
    SchedulingConflict,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Classification => "classification_error",
            Self::Extraction => "extraction_error",
            Self::PastDateTime => "past_date_time",
            Self::UnparsableDateTime => "unparsable_date_time",
            Self::CalendarUnavailable => "calendar_unavailable",
            Self::NoMatchFound => "no_match_found",
            Self::NoUpcomingMeetings => "no_upcoming_meetings",
            Self::NoValidParticipants => "no_valid_participants",
            Self::MissingDetails => "missing_details",
            Self::SchedulingConflict => "scheduling_conflict",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    SlotTransition(#[from] SlotTransitionError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "Sorry, I could not process that request. Please rephrase and try again."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        match self {
            Self::Domain(error) => InterfaceError::BadRequest {
                message: error.to_string(),
                correlation_id: correlation_id.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::meeting::SlotName;
    use crate::errors::{ApplicationError, DomainError, FailureKind, InterfaceError};
    use crate::slots::SlotTransitionError;

    #[test]
    fn slot_transition_error_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::from(
            SlotTransitionError::AlreadyActive { pending: SlotName::Date },
        ))
        .into_interface("req-1");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
        assert_eq!(interface.correlation_id(), "req-1");
        assert_eq!(
            interface.user_message(),
            "Sorry, I could not process that request. Please rephrase and try again."
        );
    }

    #[test]
    fn failure_codes_are_stable_snake_case() {
        assert_eq!(FailureKind::Classification.code(), "classification_error");
        assert_eq!(FailureKind::NoMatchFound.code(), "no_match_found");
        assert_eq!(FailureKind::SchedulingConflict.code(), "scheduling_conflict");
        assert_eq!(
            serde_json::to_string(&FailureKind::SchedulingConflict).ok().as_deref(),
            Some("\"scheduling_conflict\"")
        );
    }
}

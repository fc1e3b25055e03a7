use thiserror::Error;

use crate::domain::complaint::{ComplaintId, ComplaintStatus};
use crate::permissions::Action;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("validation failed{}: {message}", context(.complaint_id))]
    Validation { complaint_id: Option<ComplaintId>, message: String },
    /// Deliberately carries no detail in its message.
    #[error("forbidden")]
    PermissionDenied { complaint_id: Option<ComplaintId>, action: Action },
    #[error("complaint `{complaint_id}` not found")]
    NotFound { complaint_id: ComplaintId },
    #[error("invalid transition for complaint `{complaint_id}` from {from} to {to}")]
    InvalidTransition { complaint_id: ComplaintId, from: ComplaintStatus, to: ComplaintStatus },
    #[error("reassignment rejected for complaint `{complaint_id}`: status {status} is terminal")]
    ClosedComplaint { complaint_id: ComplaintId, status: ComplaintStatus },
    #[error("concurrent update on complaint `{complaint_id}` (expected version {expected_version})")]
    Conflict { complaint_id: ComplaintId, expected_version: u32 },
    #[error("routing configuration failure: {0}")]
    Configuration(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

fn context(complaint_id: &Option<ComplaintId>) -> String {
    complaint_id.as_ref().map(|id| format!(" for complaint `{id}`")).unwrap_or_default()
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { complaint_id: None, message: message.into() }
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. } | Self::ClosedComplaint { .. })
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict { complaint_id, expected_version } => {
                Self::Conflict { complaint_id, expected_version }
            }
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden")]
    Forbidden { correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested complaint could not be found.",
            Self::Conflict { .. } => {
                "The complaint was changed by someone else. Refresh and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<WorkflowError> for InterfaceError {
    fn from(value: WorkflowError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            WorkflowError::Validation { .. }
            | WorkflowError::InvalidTransition { .. }
            | WorkflowError::ClosedComplaint { .. } => {
                Self::BadRequest { message: value.to_string(), correlation_id: unassigned() }
            }
            WorkflowError::PermissionDenied { .. } => Self::Forbidden { correlation_id: unassigned() },
            WorkflowError::NotFound { .. } => {
                Self::NotFound { message: value.to_string(), correlation_id: unassigned() }
            }
            WorkflowError::Conflict { .. } => {
                Self::Conflict { message: value.to_string(), correlation_id: unassigned() }
            }
            WorkflowError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            WorkflowError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::complaint::{ComplaintId, ComplaintStatus};
    use crate::errors::{InterfaceError, WorkflowError};
    use crate::permissions::Action;
    use crate::store::StoreError;

    #[test]
    fn invalid_transition_maps_to_bad_request_with_context() {
        let interface = WorkflowError::InvalidTransition {
            complaint_id: ComplaintId("C-1".to_owned()),
            from: ComplaintStatus::New,
            to: ComplaintStatus::Completed,
        }
        .into_interface("req-1");

        match interface {
            InterfaceError::BadRequest { ref message, ref correlation_id } => {
                assert_eq!(correlation_id, "req-1");
                assert!(message.contains("C-1"));
                assert!(message.contains("new"));
                assert!(message.contains("completed"));
            }
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn permission_denied_reveals_nothing_beyond_forbidden() {
        let error = WorkflowError::PermissionDenied {
            complaint_id: Some(ComplaintId("C-secret".to_owned())),
            action: Action::Advance,
        };
        assert_eq!(error.to_string(), "forbidden");

        let interface = error.into_interface("req-2");
        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.to_string(), "forbidden");
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn store_conflict_becomes_workflow_conflict() {
        let error = WorkflowError::from(StoreError::Conflict {
            complaint_id: ComplaintId("C-9".to_owned()),
            expected_version: 3,
        });

        assert!(matches!(error, WorkflowError::Conflict { expected_version: 3, .. }));
        assert!(matches!(error.into_interface("req-3"), InterfaceError::Conflict { .. }));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = WorkflowError::Configuration("department D has no default assignee".into())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface =
            WorkflowError::from(StoreError::Backend("database is locked".to_owned()))
                .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
    }
}

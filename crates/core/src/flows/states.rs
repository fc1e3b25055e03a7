use serde::{Deserialize, Serialize};

use crate::domain::complaint::{Complaint, ComplaintStatus};
use crate::domain::directory::{DepartmentId, UserId};
use crate::domain::history::HistoryEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Created,
    Advanced,
    Reassigned,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Advanced => "advanced",
            Self::Reassigned => "reassigned",
        }
    }
}

/// The fields a transition may change, as they were before it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousState {
    pub status: ComplaintStatus,
    pub assignee_id: UserId,
    pub department_id: DepartmentId,
}

impl From<&Complaint> for PreviousState {
    fn from(complaint: &Complaint) -> Self {
        Self {
            status: complaint.status,
            assignee_id: complaint.current_assignee_id.clone(),
            department_id: complaint.department_id.clone(),
        }
    }
}

/// A planned (and, once returned by the service, committed) transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub kind: TransitionKind,
    pub previous: Option<PreviousState>,
    pub complaint: Complaint,
    pub entry: HistoryEntry,
    pub actor_id: UserId,
}

impl TransitionOutcome {
    pub fn expected_version(&self) -> u32 {
        self.complaint.version.saturating_sub(1)
    }

    pub fn assignee_changed(&self) -> bool {
        self.previous
            .as_ref()
            .is_some_and(|previous| previous.assignee_id != self.complaint.current_assignee_id)
    }

    pub fn department_changed(&self) -> bool {
        self.previous
            .as_ref()
            .is_some_and(|previous| previous.department_id != self.complaint.department_id)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::complaint::{ComplaintId, ComplaintStatus};
use crate::domain::directory::{DepartmentId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryEntryId(pub String);

/// One write-once record per state-affecting event on a complaint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub complaint_id: ComplaintId,
    /// Complaint version produced by this event; unique per complaint.
    pub sequence: u32,
    pub status: ComplaintStatus,
    pub assigned_from: Option<UserId>,
    pub assigned_to: Option<UserId>,
    pub department_id: DepartmentId,
    pub actor_id: UserId,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

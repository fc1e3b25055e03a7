use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::complaint::{Complaint, ComplaintId, ComplaintStatus};
use crate::domain::directory::{DepartmentId, UserId};
use crate::domain::history::{HistoryEntry, HistoryEntryId};

/// Builds the history record for a transition. Persisting it is the store's job and
/// only happens together with the complaint mutation it describes.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuditTrailRecorder;

/// Everything a history entry captures about one transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordInput {
    pub complaint_id: ComplaintId,
    pub sequence: u32,
    pub status: ComplaintStatus,
    pub assigned_from: Option<UserId>,
    pub assigned_to: Option<UserId>,
    pub department_id: DepartmentId,
    pub actor_id: UserId,
    pub notes: Option<String>,
}

impl AuditTrailRecorder {
    pub fn record(&self, input: RecordInput, recorded_at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            id: HistoryEntryId(Uuid::new_v4().to_string()),
            complaint_id: input.complaint_id,
            sequence: input.sequence,
            status: input.status,
            assigned_from: input.assigned_from,
            assigned_to: input.assigned_to,
            department_id: input.department_id,
            actor_id: input.actor_id,
            notes: normalize_notes(input.notes),
            recorded_at,
        }
    }

    /// History entry describing the resulting state of `after`.
    pub fn record_for(
        &self,
        before_assignee: Option<&UserId>,
        after: &Complaint,
        actor_id: &UserId,
        notes: Option<String>,
    ) -> HistoryEntry {
        self.record(
            RecordInput {
                complaint_id: after.id.clone(),
                sequence: after.version,
                status: after.status,
                assigned_from: before_assignee.cloned(),
                assigned_to: Some(after.current_assignee_id.clone()),
                department_id: after.department_id.clone(),
                actor_id: actor_id.clone(),
                notes,
            },
            after.updated_at,
        )
    }
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

/// Newest first: timestamp descending, then sequence descending for equal timestamps.
pub fn newest_first(left: &HistoryEntry, right: &HistoryEntry) -> Ordering {
    right.recorded_at.cmp(&left.recorded_at).then_with(|| right.sequence.cmp(&left.sequence))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayedState {
    pub status: ComplaintStatus,
    pub assignee: Option<UserId>,
    pub department_id: DepartmentId,
    pub version: u32,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("history is empty")]
    Empty,
    #[error("history must start at status new, found {0}")]
    BadOrigin(ComplaintStatus),
    #[error("history skips from {from} to {to} at sequence {sequence}")]
    Skipped { from: ComplaintStatus, to: ComplaintStatus, sequence: u32 },
    #[error("history sequence {found} does not follow {previous}")]
    Sequence { previous: u32, found: u32 },
}

/// Folds a complaint's history (any order) back into its current state, checking that
/// every step is either a reassignment or a single forward move.
pub fn replay(entries: &[HistoryEntry]) -> Result<ReplayedState, ReplayError> {
    let mut ordered: Vec<&HistoryEntry> = entries.iter().collect();
    ordered.sort_by_key(|entry| entry.sequence);

    let mut iter = ordered.into_iter();
    let first = iter.next().ok_or(ReplayError::Empty)?;
    if first.status != ComplaintStatus::New {
        return Err(ReplayError::BadOrigin(first.status));
    }

    let mut state = ReplayedState {
        status: first.status,
        assignee: first.assigned_to.clone(),
        department_id: first.department_id.clone(),
        version: first.sequence,
    };

    for entry in iter {
        if entry.sequence != state.version + 1 {
            return Err(ReplayError::Sequence { previous: state.version, found: entry.sequence });
        }
        let forward = state.status.successor() == Some(entry.status);
        if entry.status != state.status && !forward {
            return Err(ReplayError::Skipped {
                from: state.status,
                to: entry.status,
                sequence: entry.sequence,
            });
        }
        state.status = entry.status;
        if entry.assigned_to.is_some() {
            state.assignee = entry.assigned_to.clone();
        }
        state.department_id = entry.department_id.clone();
        state.version = entry.sequence;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{newest_first, replay, AuditTrailRecorder, RecordInput, ReplayError};
    use crate::domain::complaint::{ComplaintId, ComplaintStatus};
    use crate::domain::directory::{DepartmentId, UserId};
    use crate::domain::history::HistoryEntry;

    fn entry(sequence: u32, status: ComplaintStatus, assignee: &str) -> HistoryEntry {
        AuditTrailRecorder.record(
            RecordInput {
                complaint_id: ComplaintId("C-1".to_owned()),
                sequence,
                status,
                assigned_from: None,
                assigned_to: Some(UserId(assignee.to_owned())),
                department_id: DepartmentId("support".to_owned()),
                actor_id: UserId("mgr".to_owned()),
                notes: Some("  ".to_owned()),
            },
            Utc::now() + Duration::seconds(i64::from(sequence)),
        )
    }

    #[test]
    fn blank_notes_are_not_stored() {
        assert_eq!(entry(1, ComplaintStatus::New, "e1").notes, None);
    }

    #[test]
    fn replay_reconstructs_status_and_latest_assignee() {
        let entries = vec![
            entry(3, ComplaintStatus::Assigned, "e2"),
            entry(1, ComplaintStatus::New, "e1"),
            entry(2, ComplaintStatus::Assigned, "e1"),
            entry(4, ComplaintStatus::InProgress, "e2"),
        ];

        let state = replay(&entries).expect("valid history");
        assert_eq!(state.status, ComplaintStatus::InProgress);
        assert_eq!(state.assignee, Some(UserId("e2".to_owned())));
        assert_eq!(state.version, 4);
    }

    #[test]
    fn replay_rejects_skipped_states() {
        let entries =
            vec![entry(1, ComplaintStatus::New, "e1"), entry(2, ComplaintStatus::Completed, "e1")];

        assert!(matches!(
            replay(&entries),
            Err(ReplayError::Skipped { from: ComplaintStatus::New, to: ComplaintStatus::Completed, .. })
        ));
        assert_eq!(replay(&[]), Err(ReplayError::Empty));
    }

    #[test]
    fn newest_first_breaks_timestamp_ties_by_sequence() {
        let mut older = entry(1, ComplaintStatus::New, "e1");
        let mut newer = entry(2, ComplaintStatus::Assigned, "e1");
        newer.recorded_at = older.recorded_at;
        older.recorded_at = newer.recorded_at;

        let mut entries = vec![older.clone(), newer.clone()];
        entries.sort_by(newest_first);
        assert_eq!(entries, vec![newer, older]);
    }
}

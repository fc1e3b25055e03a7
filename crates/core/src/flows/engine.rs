use chrono::{DateTime, Utc};

use crate::audit::AuditTrailRecorder;
use crate::domain::complaint::{Complaint, ComplaintId, ComplaintStatus, NewComplaint};
use crate::domain::directory::{DepartmentId, UserId};
use crate::domain::history::HistoryEntry;
use crate::errors::WorkflowError;
use crate::flows::states::{PreviousState, TransitionKind, TransitionOutcome};
use crate::routing::RoutingDecision;

/// Builds a `New` complaint and its first history entry. Required fields must already
/// have been validated.
pub fn plan_create(
    id: ComplaintId,
    client_id: UserId,
    fields: NewComplaint,
    routing: &RoutingDecision,
    actor_id: &UserId,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, WorkflowError> {
    let nature_type_id = fields
        .nature_type_id
        .ok_or_else(|| WorkflowError::validation("nature_type_id is required"))?;

    let complaint = Complaint {
        id,
        client_id,
        title: fields.title.trim().to_owned(),
        description: fields.description.trim().to_owned(),
        error_type: fields.error_type,
        error_screen: fields.error_screen,
        nature_type_id,
        remark: fields.remark,
        status: ComplaintStatus::New,
        department_id: routing.department.id.clone(),
        current_assignee_id: routing.assignee_id.clone(),
        first_assignee_id: routing.assignee_id.clone(),
        auto_routed: routing.auto_routed,
        attachments: fields.attachments,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    let entry = AuditTrailRecorder.record_for(None, &complaint, actor_id, None);

    Ok(TransitionOutcome {
        kind: TransitionKind::Created,
        previous: None,
        complaint,
        entry,
        actor_id: actor_id.clone(),
    })
}

/// Moves `current` exactly one step forward.
pub fn plan_advance(
    current: &Complaint,
    target: ComplaintStatus,
    actor_id: &UserId,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, WorkflowError> {
    if current.status.successor() != Some(target) {
        return Err(WorkflowError::InvalidTransition {
            complaint_id: current.id.clone(),
            from: current.status,
            to: target,
        });
    }

    let mut next = bump(current, now);
    next.status = target;
    let entry = AuditTrailRecorder.record_for(Some(&current.current_assignee_id), &next, actor_id, notes);

    Ok(outcome(TransitionKind::Advanced, current, next, entry, actor_id))
}

/// Changes assignee and optionally department; status is left alone.
pub fn plan_reassign(
    current: &Complaint,
    assignee_id: &UserId,
    department_id: Option<&DepartmentId>,
    actor_id: &UserId,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, WorkflowError> {
    if current.status.is_terminal() {
        return Err(WorkflowError::ClosedComplaint {
            complaint_id: current.id.clone(),
            status: current.status,
        });
    }

    let department_id = department_id.unwrap_or(&current.department_id);
    if &current.current_assignee_id == assignee_id && &current.department_id == department_id {
        return Err(WorkflowError::Validation {
            complaint_id: Some(current.id.clone()),
            message: format!("complaint is already assigned to `{assignee_id}` in `{department_id}`"),
        });
    }

    let mut next = bump(current, now);
    next.current_assignee_id = assignee_id.clone();
    next.department_id = department_id.clone();
    let entry = AuditTrailRecorder.record_for(Some(&current.current_assignee_id), &next, actor_id, notes);

    Ok(outcome(TransitionKind::Reassigned, current, next, entry, actor_id))
}

/// Next version of `current`; `updated_at` never moves backwards so history stays ordered.
fn bump(current: &Complaint, now: DateTime<Utc>) -> Complaint {
    let mut next = current.clone();
    next.version = current.version + 1;
    next.updated_at = now.max(current.updated_at);
    next
}

fn outcome(
    kind: TransitionKind,
    before: &Complaint,
    complaint: Complaint,
    entry: HistoryEntry,
    actor_id: &UserId,
) -> TransitionOutcome {
    TransitionOutcome {
        kind,
        previous: Some(PreviousState::from(before)),
        complaint,
        entry,
        actor_id: actor_id.clone(),
    }
}

//! Orchestrates authorization, planning, the versioned commit and the hand-off to
//! notification dispatch for every complaint operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::newest_first;
use crate::domain::complaint::{Complaint, ComplaintId, ComplaintStatus, NewComplaint};
use crate::domain::directory::{DepartmentId, Principal, Role, UserId};
use crate::domain::history::HistoryEntry;
use crate::errors::WorkflowError;
use crate::flows::engine::{plan_advance, plan_create, plan_reassign};
use crate::flows::states::TransitionOutcome;
use crate::notifications::{DispatchQueue, TransitionListener};
use crate::permissions::{Action, PermissionMatrix, ReassignTarget};
use crate::routing::RoutingResolver;
use crate::store::{
    Clock, ComplaintFilter, ComplaintStore, DirectoryStore, SettingsStore, StoreError, SystemClock,
};

pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

pub struct ComplaintService {
    complaints: Arc<dyn ComplaintStore>,
    directory: Arc<dyn DirectoryStore>,
    settings: Arc<dyn SettingsStore>,
    dispatch: Option<DispatchQueue>,
    clock: Arc<dyn Clock>,
    permissions: PermissionMatrix,
    routing: RoutingResolver,
    max_conflict_retries: u32,
}

impl ComplaintService {
    pub fn new(
        complaints: Arc<dyn ComplaintStore>,
        directory: Arc<dyn DirectoryStore>,
        settings: Arc<dyn SettingsStore>,
        permissions: PermissionMatrix,
    ) -> Self {
        Self {
            complaints,
            directory,
            settings,
            dispatch: None,
            clock: Arc::new(SystemClock),
            permissions,
            routing: RoutingResolver,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    /// Committed transitions are handed to `listener` on a background task. Must be
    /// called inside a Tokio runtime.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn TransitionListener>) -> Self {
        self.dispatch = Some(DispatchQueue::spawn(listener));
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn permissions(&self) -> &PermissionMatrix {
        &self.permissions
    }

    /// Waits until every transition committed so far has reached the listener.
    pub async fn flush_notifications(&self) {
        if let Some(dispatch) = &self.dispatch {
            dispatch.flush().await;
        }
    }

    fn notify(&self, outcome: &TransitionOutcome) {
        if let Some(dispatch) = &self.dispatch {
            dispatch.submit(outcome.clone());
        }
    }

    /// Registers a complaint for `client_id`, routes it and records the first history entry.
    pub async fn create(
        &self,
        fields: NewComplaint,
        client_id: &UserId,
        principal: &Principal,
    ) -> Result<Complaint, WorkflowError> {
        if !self.permissions.role_may(principal.role, Action::Create)
            || (principal.role == Role::Client && &principal.id != client_id)
        {
            return Err(WorkflowError::PermissionDenied { complaint_id: None, action: Action::Create });
        }

        let client = self.directory.find_user(client_id).await?;
        if !client.is_some_and(|user| user.is_active && user.role == Role::Client) {
            return Err(WorkflowError::validation(format!(
                "client `{client_id}` does not exist or is inactive"
            )));
        }

        let missing = fields.missing_required_fields();
        if !missing.is_empty() {
            return Err(WorkflowError::validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }
        if let Some(nature_type_id) = fields.nature_type_id.as_ref() {
            let nature_type = self.directory.find_nature_type(nature_type_id).await?;
            if !nature_type.is_some_and(|nature| nature.is_active) {
                return Err(WorkflowError::validation(format!(
                    "nature type `{}` does not exist or is inactive",
                    nature_type_id.0
                )));
            }
        }

        let routing_config = self.settings.auto_routing().await?;
        let stats = self.complaints.routing_stats().await?;
        let decision = self
            .routing
            .resolve(fields.department_id.as_ref(), &routing_config, &stats, self.directory.as_ref())
            .await?;

        let id = ComplaintId(Uuid::new_v4().to_string());
        let outcome =
            plan_create(id, client_id.clone(), fields, &decision, &principal.id, self.clock.now())?;
        self.complaints.insert(&outcome.complaint, &outcome.entry).await?;

        tracing::info!(
            event_name = "complaint.created",
            complaint_id = %outcome.complaint.id,
            client_id = %outcome.complaint.client_id,
            department_id = %outcome.complaint.department_id,
            assignee_id = %outcome.complaint.current_assignee_id,
            auto_routed = decision.auto_routed,
            actor_id = %principal.id,
            "complaint registered"
        );
        self.notify(&outcome);
        Ok(outcome.complaint)
    }

    /// Moves the complaint one step forward to `target`.
    pub async fn advance(
        &self,
        id: &ComplaintId,
        target: ComplaintStatus,
        principal: &Principal,
        notes: Option<String>,
    ) -> Result<Complaint, WorkflowError> {
        let outcome = self
            .commit_with_retry(id, principal, Action::Advance, |current, now| {
                plan_advance(current, target, &principal.id, notes.clone(), now)
            })
            .await?;
        Ok(outcome.complaint)
    }

    /// Hands the complaint to `assignee_id`, optionally moving it to `department_id`.
    pub async fn reassign(
        &self,
        id: &ComplaintId,
        assignee_id: &UserId,
        department_id: Option<&DepartmentId>,
        principal: &Principal,
        notes: Option<String>,
    ) -> Result<Complaint, WorkflowError> {
        // Existence, access and the terminal state are reported before anything about
        // the target.
        let current = self.load_authorized(id, principal, Action::Reassign).await?;
        if current.status.is_terminal() {
            return Err(WorkflowError::ClosedComplaint {
                complaint_id: current.id,
                status: current.status,
            });
        }

        let assignee = self
            .directory
            .find_user(assignee_id)
            .await?
            .filter(|user| user.is_active && user.role.is_staff())
            .ok_or_else(|| WorkflowError::Validation {
                complaint_id: Some(id.clone()),
                message: format!("assignee `{assignee_id}` is not an active staff member"),
            })?;
        if let Some(department_id) = department_id {
            let department = self.directory.find_department(department_id).await?;
            if !department.is_some_and(|department| department.is_active) {
                return Err(WorkflowError::Validation {
                    complaint_id: Some(id.clone()),
                    message: format!("department `{department_id}` does not exist or is inactive"),
                });
            }
        }

        let outcome = self
            .commit_with_retry(id, principal, Action::Reassign, |current, now| {
                let target_department = department_id.unwrap_or(&current.department_id);
                let target = ReassignTarget { assignee: &assignee, department_id: target_department };
                if !self.permissions.can_reassign_to(principal, target) {
                    return Err(WorkflowError::PermissionDenied {
                        complaint_id: Some(current.id.clone()),
                        action: Action::Reassign,
                    });
                }
                plan_reassign(current, assignee_id, department_id, &principal.id, notes.clone(), now)
            })
            .await?;
        Ok(outcome.complaint)
    }

    pub async fn get(&self, id: &ComplaintId, principal: &Principal) -> Result<Complaint, WorkflowError> {
        self.load_authorized(id, principal, Action::Read).await
    }

    /// Full history, newest first.
    pub async fn history(
        &self,
        id: &ComplaintId,
        principal: &Principal,
    ) -> Result<Vec<HistoryEntry>, WorkflowError> {
        self.load_authorized(id, principal, Action::Read).await?;
        let mut entries = self.complaints.list_history(id).await?;
        entries.sort_by(newest_first);
        Ok(entries)
    }

    /// Complaints the principal may read, narrowed further by `filter`.
    pub async fn list_visible(
        &self,
        principal: &Principal,
        filter: ComplaintFilter,
    ) -> Result<Vec<Complaint>, WorkflowError> {
        let Some(filter) = scope_filter(principal, filter) else {
            return Ok(Vec::new());
        };
        let mut complaints = self.complaints.query(&filter).await?;
        complaints.retain(|complaint| self.permissions.can_read(principal, complaint));
        complaints.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(complaints)
    }

    fn role_gate(
        &self,
        id: &ComplaintId,
        principal: &Principal,
        action: Action,
    ) -> Result<(), WorkflowError> {
        if self.permissions.role_may(principal.role, action) {
            Ok(())
        } else {
            Err(WorkflowError::PermissionDenied { complaint_id: Some(id.clone()), action })
        }
    }

    async fn load_authorized(
        &self,
        id: &ComplaintId,
        principal: &Principal,
        action: Action,
    ) -> Result<Complaint, WorkflowError> {
        self.role_gate(id, principal, action)?;
        let complaint = self
            .complaints
            .find_by_id(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound { complaint_id: id.clone() })?;
        self.permissions.authorize(principal, action, &complaint)?;
        Ok(complaint)
    }

    /// Load, authorize, plan, commit. A lost version race re-runs the whole sequence
    /// against the fresh state, so permissions and transition rules are rechecked.
    async fn commit_with_retry<F>(
        &self,
        id: &ComplaintId,
        principal: &Principal,
        action: Action,
        plan: F,
    ) -> Result<TransitionOutcome, WorkflowError>
    where
        F: Fn(&Complaint, DateTime<Utc>) -> Result<TransitionOutcome, WorkflowError>,
    {
        let mut attempt = 0;
        loop {
            let current = self.load_authorized(id, principal, action).await?;
            let outcome = plan(&current, self.clock.now())?;

            match self
                .complaints
                .commit_transition(current.version, &outcome.complaint, &outcome.entry)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        event_name = "complaint.transition.committed",
                        complaint_id = %id,
                        transition = outcome.kind.as_str(),
                        from_status = %current.status,
                        to_status = %outcome.complaint.status,
                        assignee_id = %outcome.complaint.current_assignee_id,
                        version = outcome.complaint.version,
                        actor_id = %principal.id,
                        "transition committed"
                    );
                    self.notify(&outcome);
                    return Ok(outcome);
                }
                Err(StoreError::Conflict { .. }) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    tracing::debug!(
                        event_name = "complaint.transition.conflict_retry",
                        complaint_id = %id,
                        expected_version = current.version,
                        attempt,
                        "version moved underneath; re-planning"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

/// Intersects the caller's filter with what the role may see. `None` when the two
/// cannot overlap.
fn scope_filter(principal: &Principal, mut filter: ComplaintFilter) -> Option<ComplaintFilter> {
    fn pin<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
        match slot {
            Some(existing) if *existing != value => false,
            _ => {
                *slot = Some(value);
                true
            }
        }
    }

    let compatible = match principal.role {
        Role::Admin => true,
        Role::Manager => match principal.department_id.clone() {
            Some(department_id) => pin(&mut filter.department_id, department_id),
            None => false,
        },
        Role::Employee => pin(&mut filter.current_assignee_id, principal.id.clone()),
        Role::Client => pin(&mut filter.client_id, principal.id.clone()),
    };
    compatible.then_some(filter)
}

#[cfg(test)]
mod tests {
    use super::scope_filter;
    use crate::domain::directory::{DepartmentId, Principal, Role, UserId};
    use crate::store::ComplaintFilter;

    #[test]
    fn client_filter_is_pinned_to_self() {
        let client = Principal::new("client-a", Role::Client, None);
        let scoped = scope_filter(&client, ComplaintFilter::default()).expect("scoped");
        assert_eq!(scoped.client_id, Some(UserId("client-a".to_owned())));

        let foreign =
            ComplaintFilter { client_id: Some(UserId("client-b".to_owned())), ..Default::default() };
        assert!(scope_filter(&client, foreign).is_none());
    }

    #[test]
    fn manager_without_department_sees_nothing() {
        let manager = Principal::new("mgr", Role::Manager, None);
        assert!(scope_filter(&manager, ComplaintFilter::default()).is_none());

        let scoped = scope_filter(&Principal::new("mgr", Role::Manager, Some("ops")), Default::default())
            .expect("scoped");
        assert_eq!(scoped.department_id, Some(DepartmentId("ops".to_owned())));
    }

    #[test]
    fn admin_filter_is_untouched() {
        let filter = ComplaintFilter {
            department_id: Some(DepartmentId("ops".to_owned())),
            ..Default::default()
        };
        assert_eq!(scope_filter(&Principal::new("root", Role::Admin, None), filter.clone()), Some(filter));
    }
}

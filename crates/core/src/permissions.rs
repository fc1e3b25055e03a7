//! Role/relationship permission matrix.
//!
//! Write permission is decided by the principal's relationship to the complaint,
//! not by role rank alone: a manager outranks an employee but still cannot touch a
//! complaint owned by another department.

use serde::{Deserialize, Serialize};

use crate::domain::complaint::Complaint;
use crate::domain::directory::{DepartmentId, Principal, Role, User};
use crate::errors::WorkflowError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    Create,
    Advance,
    Reassign,
}

/// How the principal relates to a specific complaint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Relationship {
    pub is_owner: bool,
    pub is_assignee: bool,
    pub same_department: bool,
}

impl Relationship {
    pub fn between(principal: &Principal, complaint: &Complaint) -> Self {
        Self {
            is_owner: complaint.client_id == principal.id,
            is_assignee: complaint.current_assignee_id == principal.id,
            same_department: principal.department_id.as_ref() == Some(&complaint.department_id),
        }
    }
}

/// Where a reassignment would leave the complaint.
#[derive(Clone, Copy, Debug)]
pub struct ReassignTarget<'a> {
    pub assignee: &'a User,
    pub department_id: &'a DepartmentId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PermissionMatrix {
    /// Lets an assigned employee hand a complaint to a colleague in the same department.
    pub employee_handoff_within_department: bool,
}

impl PermissionMatrix {
    pub fn new(employee_handoff_within_department: bool) -> Self {
        Self { employee_handoff_within_department }
    }

    /// Role-level gate that needs no resource; failing it never depends on whether the
    /// complaint exists.
    pub fn role_may(&self, role: Role, action: Action) -> bool {
        match (role, action) {
            (Role::Admin, _) => true,
            (Role::Client, Action::Read | Action::Create) => true,
            (Role::Client, _) => false,
            (Role::Manager, Action::Read | Action::Advance | Action::Reassign) => true,
            (Role::Employee, Action::Read | Action::Advance) => true,
            (Role::Employee, Action::Reassign) => self.employee_handoff_within_department,
            (Role::Manager | Role::Employee, Action::Create) => false,
        }
    }

    pub fn relationship_allows(&self, role: Role, action: Action, rel: Relationship) -> bool {
        if !self.role_may(role, action) {
            return false;
        }
        match role {
            Role::Admin => true,
            Role::Manager => rel.same_department,
            Role::Employee => rel.is_assignee,
            Role::Client => matches!(action, Action::Read) && rel.is_owner,
        }
    }

    pub fn can_perform(&self, principal: &Principal, action: Action, complaint: &Complaint) -> bool {
        self.relationship_allows(principal.role, action, Relationship::between(principal, complaint))
    }

    pub fn can_read(&self, principal: &Principal, complaint: &Complaint) -> bool {
        self.can_perform(principal, Action::Read, complaint)
    }

    /// Full gate for an action on an existing complaint.
    ///
    /// Complaints the principal cannot even read are reported as missing.
    pub fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        complaint: &Complaint,
    ) -> Result<(), WorkflowError> {
        if !self.role_may(principal.role, action) {
            return Err(WorkflowError::PermissionDenied {
                complaint_id: Some(complaint.id.clone()),
                action,
            });
        }
        if !self.can_read(principal, complaint) {
            return Err(WorkflowError::NotFound { complaint_id: complaint.id.clone() });
        }
        if !self.can_perform(principal, action, complaint) {
            return Err(WorkflowError::PermissionDenied {
                complaint_id: Some(complaint.id.clone()),
                action,
            });
        }
        Ok(())
    }

    /// Checks the destination of a reassignment once the action itself is allowed.
    pub fn can_reassign_to(&self, principal: &Principal, target: ReassignTarget<'_>) -> bool {
        match principal.role {
            Role::Admin => true,
            Role::Manager | Role::Employee => {
                let own_department = principal.department_id.as_ref();
                own_department == Some(target.department_id)
                    && target.assignee.department_id.as_ref() == own_department
            }
            Role::Client => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Action, PermissionMatrix, ReassignTarget, Relationship};
    use crate::domain::complaint::{Complaint, ComplaintId, ComplaintStatus};
    use crate::domain::directory::{DepartmentId, NatureTypeId, Principal, Role, User, UserId};
    use crate::errors::WorkflowError;

    fn complaint() -> Complaint {
        let now = Utc::now();
        Complaint {
            id: ComplaintId("C-1".to_owned()),
            client_id: UserId("client-a".to_owned()),
            title: "Invoice totals wrong".to_owned(),
            description: "Totals do not match line items".to_owned(),
            error_type: None,
            error_screen: None,
            nature_type_id: NatureTypeId("billing".to_owned()),
            remark: None,
            status: ComplaintStatus::Assigned,
            department_id: DepartmentId("finance".to_owned()),
            current_assignee_id: UserId("emp-1".to_owned()),
            first_assignee_id: UserId("emp-1".to_owned()),
            auto_routed: false,
            attachments: Vec::new(),
            version: 2,
            created_at: now,
            updated_at: now,
        }
    }

    fn user(id: &str, role: Role, department: Option<&str>) -> User {
        User {
            id: UserId(id.to_owned()),
            name: id.to_owned(),
            role,
            department_id: department.map(|value| DepartmentId(value.to_owned())),
            email: None,
            phone: None,
            is_active: true,
        }
    }

    #[test]
    fn admin_can_do_everything() {
        let matrix = PermissionMatrix::default();
        let admin = Principal::new("root", Role::Admin, None);
        for action in [Action::Read, Action::Create, Action::Advance, Action::Reassign] {
            assert!(matrix.can_perform(&admin, action, &complaint()), "{action:?}");
        }
    }

    #[test]
    fn manager_is_scoped_to_own_department() {
        let matrix = PermissionMatrix::default();
        let own = Principal::new("mgr-fin", Role::Manager, Some("finance"));
        let other = Principal::new("mgr-ops", Role::Manager, Some("operations"));

        assert!(matrix.can_perform(&own, Action::Advance, &complaint()));
        assert!(matrix.can_perform(&own, Action::Reassign, &complaint()));
        assert!(!matrix.can_perform(&other, Action::Read, &complaint()));
        assert!(!matrix.can_perform(&other, Action::Advance, &complaint()));
    }

    #[test]
    fn employee_needs_current_assignment() {
        let matrix = PermissionMatrix::default();
        let assignee = Principal::new("emp-1", Role::Employee, Some("finance"));
        let colleague = Principal::new("emp-2", Role::Employee, Some("finance"));

        assert!(matrix.can_perform(&assignee, Action::Advance, &complaint()));
        assert!(!matrix.can_perform(&assignee, Action::Reassign, &complaint()));
        assert!(!matrix.can_perform(&colleague, Action::Read, &complaint()));
    }

    #[test]
    fn employee_handoff_is_opt_in() {
        let matrix = PermissionMatrix::new(true);
        let assignee = Principal::new("emp-1", Role::Employee, Some("finance"));

        assert!(matrix.can_perform(&assignee, Action::Reassign, &complaint()));

        let teammate = user("emp-2", Role::Employee, Some("finance"));
        let outsider = user("emp-9", Role::Employee, Some("operations"));
        let finance = DepartmentId("finance".to_owned());
        let operations = DepartmentId("operations".to_owned());

        assert!(matrix.can_reassign_to(
            &assignee,
            ReassignTarget { assignee: &teammate, department_id: &finance }
        ));
        assert!(!matrix.can_reassign_to(
            &assignee,
            ReassignTarget { assignee: &outsider, department_id: &operations }
        ));
    }

    #[test]
    fn client_can_read_own_but_never_transition() {
        let matrix = PermissionMatrix::default();
        let owner = Principal::new("client-a", Role::Client, None);
        let stranger = Principal::new("client-b", Role::Client, None);

        assert!(matrix.can_perform(&owner, Action::Read, &complaint()));
        assert!(!matrix.can_perform(&owner, Action::Advance, &complaint()));
        assert!(!matrix.can_perform(&owner, Action::Reassign, &complaint()));
        assert!(!matrix.can_perform(&stranger, Action::Read, &complaint()));
        assert!(matrix.role_may(Role::Client, Action::Create));
    }

    #[test]
    fn authorize_hides_foreign_complaints_but_denies_forbidden_roles() {
        let matrix = PermissionMatrix::default();
        let owner = Principal::new("client-a", Role::Client, None);
        let stranger = Principal::new("client-b", Role::Client, None);

        assert!(matches!(
            matrix.authorize(&owner, Action::Advance, &complaint()),
            Err(WorkflowError::PermissionDenied { .. })
        ));
        assert!(matches!(
            matrix.authorize(&stranger, Action::Advance, &complaint()),
            Err(WorkflowError::PermissionDenied { .. })
        ));
        assert!(matches!(
            matrix.authorize(&stranger, Action::Read, &complaint()),
            Err(WorkflowError::NotFound { .. })
        ));
        assert!(matrix.authorize(&owner, Action::Read, &complaint()).is_ok());
    }

    #[test]
    fn relationship_is_derived_from_current_fields() {
        let principal = Principal::new("emp-1", Role::Employee, Some("finance"));
        let rel = Relationship::between(&principal, &complaint());
        assert_eq!(rel, Relationship { is_owner: false, is_assignee: true, same_department: true });
    }
}

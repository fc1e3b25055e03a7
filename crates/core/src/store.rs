//! Storage ports consumed by the workflow engine.
//!
//! Handles are constructed once at startup and injected as `Arc<dyn ...>`;
//! `casetrack-db` provides SQLite and in-memory implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::complaint::{Complaint, ComplaintId, ComplaintStatus};
use crate::domain::directory::{
    Department, DepartmentId, NatureType, NatureTypeId, User, UserId,
};
use crate::domain::history::HistoryEntry;
use crate::domain::notification::{DeliveryStatus, Notification, NotificationId};
use crate::routing::AutoRoutingConfig;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("version conflict on complaint `{complaint_id}` (expected {expected_version})")]
    Conflict { complaint_id: ComplaintId, expected_version: u32 },
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("decode failure: {0}")]
    Decode(String),
}

/// Indexed lookup filter; `None` fields are unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComplaintFilter {
    pub status: Option<ComplaintStatus>,
    pub client_id: Option<UserId>,
    pub department_id: Option<DepartmentId>,
    pub current_assignee_id: Option<UserId>,
}

impl ComplaintFilter {
    pub fn matches(&self, complaint: &Complaint) -> bool {
        self.status.map_or(true, |status| complaint.status == status)
            && self.client_id.as_ref().map_or(true, |id| &complaint.client_id == id)
            && self.department_id.as_ref().map_or(true, |id| &complaint.department_id == id)
            && self
                .current_assignee_id
                .as_ref()
                .map_or(true, |id| &complaint.current_assignee_id == id)
    }
}

/// Counts the routing strategies need, derived from persisted complaints only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingStats {
    pub total_complaints: u64,
    /// Complaints whose department came from auto-routing; the round-robin cursor.
    pub auto_routed_complaints: u64,
    pub open_by_department: HashMap<DepartmentId, u64>,
}

#[async_trait]
pub trait ComplaintStore: Send + Sync {
    /// Persists a new complaint together with its creation history entry.
    async fn insert(&self, complaint: &Complaint, entry: &HistoryEntry) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &ComplaintId) -> Result<Option<Complaint>, StoreError>;

    /// Atomically replaces the complaint and appends `entry`, provided the stored
    /// version still equals `expected_version`. Returns `StoreError::Conflict` otherwise
    /// and writes nothing.
    async fn commit_transition(
        &self,
        expected_version: u32,
        complaint: &Complaint,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_history(&self, id: &ComplaintId) -> Result<Vec<HistoryEntry>, StoreError>;

    async fn query(&self, filter: &ComplaintFilter) -> Result<Vec<Complaint>, StoreError>;

    async fn routing_stats(&self) -> Result<RoutingStats, StoreError>;
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    async fn find_department(&self, id: &DepartmentId) -> Result<Option<Department>, StoreError>;
    async fn find_nature_type(&self, id: &NatureTypeId)
        -> Result<Option<NatureType>, StoreError>;
    async fn save_user(&self, user: User) -> Result<(), StoreError>;
    async fn save_department(&self, department: Department) -> Result<(), StoreError>;
    async fn save_nature_type(&self, nature_type: NatureType) -> Result<(), StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts the batch, skipping rows that already exist for the same
    /// (complaint, sequence, user, channel). Returns the rows actually inserted.
    async fn enqueue(&self, notifications: Vec<Notification>)
        -> Result<Vec<Notification>, StoreError>;

    async fn find_by_id(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError>;

    /// The oldest pending notification of each (user, complaint) lane, by
    /// (sequence, channel), soonest `next_attempt_at` first. Callers decide which are due.
    async fn pending_lane_heads(&self, limit: u32) -> Result<Vec<Notification>, StoreError>;

    async fn list_by_status(
        &self,
        status: DeliveryStatus,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn list_for_complaint(&self, id: &ComplaintId)
        -> Result<Vec<Notification>, StoreError>;

    async fn update(&self, notification: &Notification) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Auto-routing policy from the `system` settings record; defaults when absent.
    async fn auto_routing(&self) -> Result<AutoRoutingConfig, StoreError>;
    async fn save_auto_routing(&self, config: &AutoRoutingConfig) -> Result<(), StoreError>;
}

/// Shared clock seam so retry timing can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

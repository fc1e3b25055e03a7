use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use casetrack_core::audit::newest_first;
use casetrack_core::domain::complaint::{Complaint, ComplaintId};
use casetrack_core::domain::directory::{
    Department, DepartmentId, NatureType, NatureTypeId, User, UserId,
};
use casetrack_core::domain::history::HistoryEntry;
use casetrack_core::domain::notification::{DeliveryStatus, Notification, NotificationId};
use casetrack_core::routing::AutoRoutingConfig;
use casetrack_core::store::{
    ComplaintFilter, ComplaintStore, DirectoryStore, NotificationStore, RoutingStats,
    SettingsStore, StoreError,
};

#[derive(Default)]
struct ComplaintState {
    complaints: HashMap<String, Complaint>,
    history: HashMap<String, Vec<HistoryEntry>>,
}

/// Complaint rows and their history behind one lock, so a transition commit is atomic.
#[derive(Default)]
pub struct InMemoryComplaintRepository {
    state: RwLock<ComplaintState>,
}

#[async_trait]
impl ComplaintStore for InMemoryComplaintRepository {
    async fn insert(&self, complaint: &Complaint, entry: &HistoryEntry) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.complaints.contains_key(&complaint.id.0) {
            return Err(StoreError::Duplicate(format!("complaint `{}`", complaint.id)));
        }
        state.complaints.insert(complaint.id.0.clone(), complaint.clone());
        state.history.insert(complaint.id.0.clone(), vec![entry.clone()]);
        Ok(())
    }

    async fn find_by_id(&self, id: &ComplaintId) -> Result<Option<Complaint>, StoreError> {
        let state = self.state.read().await;
        Ok(state.complaints.get(&id.0).cloned())
    }

    async fn commit_transition(
        &self,
        expected_version: u32,
        complaint: &Complaint,
        entry: &HistoryEntry,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let current_version = state.complaints.get(&complaint.id.0).map(|stored| stored.version);
        if current_version != Some(expected_version) {
            return Err(StoreError::Conflict {
                complaint_id: complaint.id.clone(),
                expected_version,
            });
        }

        let entries = state.history.entry(complaint.id.0.clone()).or_default();
        if entries.iter().any(|existing| existing.sequence == entry.sequence) {
            return Err(StoreError::Duplicate(format!(
                "history sequence {} for complaint `{}`",
                entry.sequence, complaint.id
            )));
        }
        entries.push(entry.clone());
        state.complaints.insert(complaint.id.0.clone(), complaint.clone());
        Ok(())
    }

    async fn list_history(&self, id: &ComplaintId) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.state.read().await;
        let mut entries = state.history.get(&id.0).cloned().unwrap_or_default();
        entries.sort_by(newest_first);
        Ok(entries)
    }

    async fn query(&self, filter: &ComplaintFilter) -> Result<Vec<Complaint>, StoreError> {
        let state = self.state.read().await;
        let mut complaints: Vec<Complaint> =
            state.complaints.values().filter(|complaint| filter.matches(complaint)).cloned().collect();
        complaints.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(complaints)
    }

    async fn routing_stats(&self) -> Result<RoutingStats, StoreError> {
        let state = self.state.read().await;
        let mut stats = RoutingStats {
            total_complaints: state.complaints.len() as u64,
            auto_routed_complaints: state
                .complaints
                .values()
                .filter(|complaint| complaint.auto_routed)
                .count() as u64,
            ..RoutingStats::default()
        };
        for complaint in state.complaints.values().filter(|complaint| complaint.status.is_open()) {
            *stats.open_by_department.entry(complaint.department_id.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }
}

#[derive(Default)]
pub struct InMemoryDirectoryRepository {
    users: RwLock<HashMap<String, User>>,
    departments: RwLock<HashMap<String, Department>>,
    nature_types: RwLock<HashMap<String, NatureType>>,
}

#[async_trait]
impl DirectoryStore for InMemoryDirectoryRepository {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn find_department(&self, id: &DepartmentId) -> Result<Option<Department>, StoreError> {
        let departments = self.departments.read().await;
        Ok(departments.get(&id.0).cloned())
    }

    async fn find_nature_type(&self, id: &NatureTypeId) -> Result<Option<NatureType>, StoreError> {
        let nature_types = self.nature_types.read().await;
        Ok(nature_types.get(&id.0).cloned())
    }

    async fn save_user(&self, user: User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }

    async fn save_department(&self, department: Department) -> Result<(), StoreError> {
        let mut departments = self.departments.write().await;
        departments.insert(department.id.0.clone(), department);
        Ok(())
    }

    async fn save_nature_type(&self, nature_type: NatureType) -> Result<(), StoreError> {
        let mut nature_types = self.nature_types.write().await;
        nature_types.insert(nature_type.id.0.clone(), nature_type);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<Vec<Notification>>,
}

#[async_trait]
impl NotificationStore for InMemoryNotificationRepository {
    async fn enqueue(&self, notifications: Vec<Notification>) -> Result<Vec<Notification>, StoreError> {
        let mut stored = self.notifications.write().await;
        let mut inserted = Vec::with_capacity(notifications.len());
        for notification in notifications {
            let duplicate = stored.iter().any(|existing| {
                existing.complaint_id == notification.complaint_id
                    && existing.sequence == notification.sequence
                    && existing.user_id == notification.user_id
                    && existing.channel == notification.channel
            });
            if !duplicate {
                stored.push(notification.clone());
                inserted.push(notification);
            }
        }
        Ok(inserted)
    }

    async fn find_by_id(&self, id: &NotificationId) -> Result<Option<Notification>, StoreError> {
        let stored = self.notifications.read().await;
        Ok(stored.iter().find(|notification| &notification.id == id).cloned())
    }

    async fn pending_lane_heads(&self, limit: u32) -> Result<Vec<Notification>, StoreError> {
        let stored = self.notifications.read().await;
        let mut heads: HashMap<(UserId, ComplaintId), &Notification> = HashMap::new();
        for notification in stored.iter().filter(|n| n.status == DeliveryStatus::Pending) {
            let key = (notification.user_id.clone(), notification.complaint_id.clone());
            let replace = heads
                .get(&key)
                .map_or(true, |current| notification.order_key() < current.order_key());
            if replace {
                heads.insert(key, notification);
            }
        }

        let mut heads: Vec<Notification> = heads.into_values().cloned().collect();
        heads.sort_by(|left, right| {
            left.next_attempt_at
                .cmp(&right.next_attempt_at)
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        heads.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(heads)
    }

    async fn list_by_status(
        &self,
        status: DeliveryStatus,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        let stored = self.notifications.read().await;
        let mut matching: Vec<Notification> =
            stored.iter().filter(|notification| notification.status == status).cloned().collect();
        matching.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        matching.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(matching)
    }

    async fn list_for_complaint(&self, id: &ComplaintId) -> Result<Vec<Notification>, StoreError> {
        let stored = self.notifications.read().await;
        let mut matching: Vec<Notification> =
            stored.iter().filter(|notification| &notification.complaint_id == id).cloned().collect();
        matching.sort_by(|left, right| {
            (left.sequence, &left.user_id, left.channel).cmp(&(right.sequence, &right.user_id, right.channel))
        });
        Ok(matching)
    }

    async fn update(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut stored = self.notifications.write().await;
        if let Some(existing) = stored.iter_mut().find(|existing| existing.id == notification.id) {
            *existing = notification.clone();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySettingsRepository {
    auto_routing: RwLock<Option<AutoRoutingConfig>>,
}

#[async_trait]
impl SettingsStore for InMemorySettingsRepository {
    async fn auto_routing(&self) -> Result<AutoRoutingConfig, StoreError> {
        let config = self.auto_routing.read().await;
        Ok(config.clone().unwrap_or_default())
    }

    async fn save_auto_routing(&self, config: &AutoRoutingConfig) -> Result<(), StoreError> {
        let mut stored = self.auto_routing.write().await;
        *stored = Some(config.clone());
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::directory::{DepartmentId, Principal, Role, User, UserId};
use crate::domain::notification::{DeliveryStatus, Notification, NotificationId};
use crate::flows::states::TransitionOutcome;
use crate::notifications::delivery::DeliveryPolicy;
use crate::notifications::recipients::{build_notifications, recipient_ids, ChannelToggles};
use crate::notifications::TransitionListener;
use crate::store::{Clock, DirectoryStore, NotificationStore, StoreError};

/// Turns committed transitions into pending notifications.
///
/// Runs after the transition is durable; every failure here is logged and dropped.
pub struct NotificationDispatcher {
    directory: Arc<dyn DirectoryStore>,
    notifications: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
    toggles: ChannelToggles,
}

impl NotificationDispatcher {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        notifications: Arc<dyn NotificationStore>,
        clock: Arc<dyn Clock>,
        toggles: ChannelToggles,
    ) -> Self {
        Self { directory, notifications, clock, toggles }
    }

    async fn manager_of(&self, department_id: &DepartmentId) -> Result<Option<UserId>, StoreError> {
        Ok(self
            .directory
            .find_department(department_id)
            .await?
            .and_then(|department| department.manager_id))
    }

    async fn dispatch(&self, outcome: &TransitionOutcome) -> Result<Vec<Notification>, StoreError> {
        let mut managers = Vec::new();
        if let Some(manager) = self.manager_of(&outcome.complaint.department_id).await? {
            managers.push(manager);
        }
        if let Some(previous) = outcome.previous.as_ref().filter(|_| outcome.department_changed()) {
            if let Some(manager) = self.manager_of(&previous.department_id).await? {
                managers.push(manager);
            }
        }

        let mut recipients: Vec<User> = Vec::new();
        for user_id in recipient_ids(outcome, &managers) {
            match self.directory.find_user(&user_id).await? {
                Some(user) => recipients.push(user),
                None => tracing::debug!(
                    event_name = "notification.recipient.unknown",
                    complaint_id = %outcome.complaint.id,
                    user_id = %user_id,
                    "recipient not in directory; skipped"
                ),
            }
        }

        let pending = build_notifications(outcome, &recipients, self.toggles, self.clock.now());
        self.notifications.enqueue(pending).await
    }
}

#[async_trait]
impl TransitionListener for NotificationDispatcher {
    async fn on_transition(&self, outcome: &TransitionOutcome) {
        match self.dispatch(outcome).await {
            Ok(enqueued) => tracing::info!(
                event_name = "notification.dispatch.enqueued",
                complaint_id = %outcome.complaint.id,
                transition = outcome.kind.as_str(),
                sequence = outcome.entry.sequence,
                count = enqueued.len(),
                "notifications enqueued"
            ),
            Err(error) => tracing::warn!(
                event_name = "notification.dispatch.failed",
                complaint_id = %outcome.complaint.id,
                transition = outcome.kind.as_str(),
                error = %error,
                "could not enqueue notifications; transition already committed"
            ),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationAdminError {
    #[error("forbidden")]
    Forbidden,
    #[error("notification `{0}` not found")]
    NotFound(NotificationId),
    #[error("notification `{id}` is {status} and cannot be retried")]
    NotRetryable { id: NotificationId, status: DeliveryStatus },
    #[error("notification `{id}` cannot be retried: `{sent_after}` in the same lane was already sent")]
    OutOfOrder { id: NotificationId, sent_after: NotificationId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Operator view over the outbound queue. Admin only.
pub struct NotificationAdmin {
    notifications: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
    policy: DeliveryPolicy,
}

impl NotificationAdmin {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        clock: Arc<dyn Clock>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self { notifications, clock, policy }
    }

    pub async fn list_failed(
        &self,
        principal: &Principal,
        limit: u32,
    ) -> Result<Vec<Notification>, NotificationAdminError> {
        require_admin(principal)?;
        Ok(self.notifications.list_by_status(DeliveryStatus::Failed, limit).await?)
    }

    pub async fn retry(
        &self,
        principal: &Principal,
        id: &NotificationId,
    ) -> Result<Notification, NotificationAdminError> {
        require_admin(principal)?;
        let notification = self
            .notifications
            .find_by_id(id)
            .await?
            .ok_or_else(|| NotificationAdminError::NotFound(id.clone()))?;
        let status = notification.status;
        if status == DeliveryStatus::Failed {
            if let Some(later) = self.later_sent_in_lane(&notification).await? {
                return Err(NotificationAdminError::OutOfOrder { id: id.clone(), sent_after: later });
            }
        }
        let reset = self
            .policy
            .reset(notification, self.clock.now())
            .ok_or_else(|| NotificationAdminError::NotRetryable { id: id.clone(), status })?;

        self.notifications.update(&reset).await?;
        tracing::info!(
            event_name = "notification.retry.requested",
            notification_id = %id,
            actor_id = %principal.id,
            "failed notification re-queued"
        );
        Ok(reset)
    }

    /// A message behind `notification` in its lane that already went out. Requeueing
    /// would deliver the older message after it.
    async fn later_sent_in_lane(
        &self,
        notification: &Notification,
    ) -> Result<Option<NotificationId>, StoreError> {
        Ok(self
            .notifications
            .list_for_complaint(&notification.complaint_id)
            .await?
            .into_iter()
            .find(|other| {
                other.lane() == notification.lane()
                    && other.order_key() > notification.order_key()
                    && other.status == DeliveryStatus::Sent
            })
            .map(|other| other.id))
    }
}

fn require_admin(principal: &Principal) -> Result<(), NotificationAdminError> {
    if principal.role == Role::Admin {
        Ok(())
    } else {
        Err(NotificationAdminError::Forbidden)
    }
}

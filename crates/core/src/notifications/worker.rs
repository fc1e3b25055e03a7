//! Background delivery loop.
//!
//! All state lives in the notification store, so a restarted worker simply picks up
//! whatever is still pending.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::domain::complaint::ComplaintId;
use crate::domain::directory::UserId;
use crate::domain::notification::{DeliveryStatus, Notification};
use crate::notifications::delivery::{DeliveryPolicy, DeliveryTransport};
use crate::store::{Clock, NotificationStore, StoreError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub attempted: usize,
    pub sent: usize,
    pub rescheduled: usize,
    pub failed: usize,
    /// Lanes whose head was not due yet.
    pub deferred: usize,
}

pub struct DeliveryWorker {
    store: Arc<dyn NotificationStore>,
    transport: Arc<dyn DeliveryTransport>,
    clock: Arc<dyn Clock>,
    policy: DeliveryPolicy,
    batch_size: u32,
    poll_interval: Duration,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        transport: Arc<dyn DeliveryTransport>,
        clock: Arc<dyn Clock>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            policy,
            batch_size: 100,
            poll_interval: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// One pass over the queue. Only the oldest pending message of each
    /// (recipient, complaint) lane is attempted, so a message is never delivered
    /// ahead of an earlier one for the same recipient and complaint.
    pub async fn run_once(&self) -> Result<TickSummary, StoreError> {
        let pending = self.store.pending_lane_heads(self.batch_size).await?;
        let now = self.clock.now();
        let mut summary = TickSummary::default();

        for head in lane_heads(pending) {
            if !self.policy.is_due(&head, now) {
                summary.deferred += 1;
                continue;
            }

            summary.attempted += 1;
            let updated = match self.transport.send(&head).await {
                Ok(()) => self.policy.mark_sent(head, self.clock.now()),
                Err(error) => {
                    tracing::warn!(
                        event_name = "notification.delivery.attempt_failed",
                        notification_id = %head.id,
                        complaint_id = %head.complaint_id,
                        channel = head.channel.as_str(),
                        attempt = head.attempts + 1,
                        error = %error,
                        "delivery attempt failed"
                    );
                    self.policy.mark_failed(head, &error, self.clock.now())
                }
            };

            match updated.status {
                DeliveryStatus::Sent => summary.sent += 1,
                DeliveryStatus::Pending => summary.rescheduled += 1,
                DeliveryStatus::Failed => {
                    summary.failed += 1;
                    tracing::error!(
                        event_name = "notification.delivery.failed",
                        notification_id = %updated.id,
                        attempts = updated.attempts,
                        "notification gave up; admin retry required"
                    );
                }
            }
            self.store.update(&updated).await?;
        }

        Ok(summary)
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            event_name = "notification.worker.start",
            poll_interval_ms = u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX),
            batch_size = self.batch_size,
            "delivery worker started"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(summary) if summary.attempted > 0 => tracing::debug!(
                            event_name = "notification.worker.tick",
                            attempted = summary.attempted,
                            sent = summary.sent,
                            rescheduled = summary.rescheduled,
                            failed = summary.failed,
                            "delivery tick"
                        ),
                        Ok(_) => {}
                        Err(error) => tracing::error!(
                            event_name = "notification.worker.error",
                            error = %error,
                            "delivery tick failed"
                        ),
                    }
                }
            }
        }

        tracing::info!(event_name = "notification.worker.stop", "delivery worker stopped");
    }
}

/// Earliest pending message per lane; guards against stores returning more than heads.
fn lane_heads(pending: Vec<Notification>) -> Vec<Notification> {
    let mut heads: BTreeMap<(UserId, ComplaintId), Notification> = BTreeMap::new();
    for notification in pending.into_iter().filter(|n| n.status == DeliveryStatus::Pending) {
        let key = (notification.user_id.clone(), notification.complaint_id.clone());
        match heads.get(&key) {
            Some(current) if current.order_key() <= notification.order_key() => {}
            _ => {
                heads.insert(key, notification);
            }
        }
    }
    heads.into_values().collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::lane_heads;
    use crate::domain::complaint::ComplaintId;
    use crate::domain::directory::UserId;
    use crate::domain::notification::{Channel, DeliveryStatus, Notification, NotificationId};

    fn message(id: &str, user: &str, complaint: &str, sequence: u32, channel: Channel) -> Notification {
        let now = Utc::now();
        Notification {
            id: NotificationId(id.to_owned()),
            user_id: UserId(user.to_owned()),
            complaint_id: ComplaintId(complaint.to_owned()),
            sequence,
            channel,
            destination: "dest".to_owned(),
            body: "body".to_owned(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
            sent_at: None,
        }
    }

    #[test]
    fn one_head_per_lane_in_sequence_then_channel_order() {
        let heads = lane_heads(vec![
            message("n3", "e1", "C-1", 3, Channel::Email),
            message("n2", "e1", "C-1", 2, Channel::Whatsapp),
            message("n1", "e1", "C-1", 2, Channel::Email),
            message("n4", "e1", "C-2", 5, Channel::Email),
            message("n5", "e2", "C-1", 4, Channel::Email),
        ]);

        let ids: Vec<&str> = heads.iter().map(|n| n.id.0.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n4", "n5"]);
    }
}

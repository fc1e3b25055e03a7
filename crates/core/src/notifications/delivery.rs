//! Delivery state machine for a single notification.
//!
//! `pending --send ok--> sent`
//! `pending --transient error, attempts left--> pending (backoff)`
//! `pending --permanent error | attempts exhausted--> failed`
//! `failed --admin retry--> pending (attempts reset)`

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::domain::notification::{DeliveryStatus, Notification};

/// Retry tuning for outbound delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Total attempts before a message is marked failed.
    pub max_attempts: u32,
    /// Base delay in seconds between retries
    pub base_delay_seconds: i64,
    /// Backoff multiplier for retries
    pub backoff_multiplier: u32,
    /// Upper bound on a single backoff step.
    pub max_delay_seconds: i64,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay_seconds: 5, backoff_multiplier: 2, max_delay_seconds: 900 }
    }
}

/// Policy for handling failures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry with exponential backoff
    Retry,
    /// Mark as failed, no more retries
    FailTerminal,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Transient(_) => RetryPolicy::Retry,
            Self::Permanent(_) => RetryPolicy::FailTerminal,
        }
    }
}

/// Outbound channel adapter (email gateway, messaging relay, ...).
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

impl DeliveryPolicy {
    /// `base * multiplier^retry`, capped at `max_delay_seconds`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = i64::from(self.backoff_multiplier.max(1)).checked_pow(retry).unwrap_or(i64::MAX);
        let seconds = self.base_delay_seconds.saturating_mul(factor).min(self.max_delay_seconds);
        Duration::seconds(seconds.max(0))
    }

    pub fn is_due(&self, notification: &Notification, now: DateTime<Utc>) -> bool {
        notification.status == DeliveryStatus::Pending && notification.next_attempt_at <= now
    }

    pub fn mark_sent(&self, mut notification: Notification, now: DateTime<Utc>) -> Notification {
        notification.attempts += 1;
        notification.status = DeliveryStatus::Sent;
        notification.sent_at = Some(now);
        notification.last_error = None;
        notification
    }

    /// Records a failed attempt, either scheduling the next one or giving up.
    pub fn mark_failed(
        &self,
        mut notification: Notification,
        error: &DeliveryError,
        now: DateTime<Utc>,
    ) -> Notification {
        let retry = notification.attempts;
        notification.attempts += 1;
        notification.last_error = Some(error.to_string());

        let attempts_left = notification.attempts < self.max_attempts;
        if matches!(error.retry_policy(), RetryPolicy::Retry) && attempts_left {
            notification.next_attempt_at = now + self.backoff(retry);
        } else {
            notification.status = DeliveryStatus::Failed;
        }
        notification
    }

    /// Puts a failed notification back in the queue. `None` unless it is failed.
    pub fn reset(&self, mut notification: Notification, now: DateTime<Utc>) -> Option<Notification> {
        if notification.status != DeliveryStatus::Failed {
            return None;
        }
        notification.status = DeliveryStatus::Pending;
        notification.attempts = 0;
        notification.next_attempt_at = now;
        Some(notification)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{DeliveryError, DeliveryPolicy};
    use crate::domain::complaint::ComplaintId;
    use crate::domain::directory::UserId;
    use crate::domain::notification::{Channel, DeliveryStatus, Notification, NotificationId};

    fn pending() -> Notification {
        let now = Utc::now();
        Notification {
            id: NotificationId("N-1".to_owned()),
            user_id: UserId("e1".to_owned()),
            complaint_id: ComplaintId("C-1".to_owned()),
            sequence: 1,
            channel: Channel::Email,
            destination: "e1@example.com".to_owned(),
            body: "hello".to_owned(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            created_at: now,
            sent_at: None,
        }
    }

    #[test]
    fn transient_failures_back_off_until_attempts_run_out() {
        let policy = DeliveryPolicy { max_attempts: 3, ..DeliveryPolicy::default() };
        let now = Utc::now();
        let error = DeliveryError::Transient("timeout".to_owned());

        let first = policy.mark_failed(pending(), &error, now);
        assert_eq!(first.status, DeliveryStatus::Pending);
        assert_eq!(first.attempts, 1);
        assert_eq!(first.next_attempt_at, now + Duration::seconds(5));

        let second = policy.mark_failed(first, &error, now);
        assert_eq!(second.status, DeliveryStatus::Pending);
        assert_eq!(second.next_attempt_at, now + Duration::seconds(10));

        let third = policy.mark_failed(second, &error, now);
        assert_eq!(third.status, DeliveryStatus::Failed);
        assert_eq!(third.attempts, 3);
        assert_eq!(third.last_error.as_deref(), Some("transient delivery failure: timeout"));
    }

    #[test]
    fn permanent_failure_is_terminal_immediately() {
        let failed = DeliveryPolicy::default().mark_failed(
            pending(),
            &DeliveryError::Permanent("bad address".to_owned()),
            Utc::now(),
        );
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.attempts, 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = DeliveryPolicy { max_delay_seconds: 60, ..DeliveryPolicy::default() };
        assert_eq!(policy.backoff(0), Duration::seconds(5));
        assert_eq!(policy.backoff(3), Duration::seconds(40));
        assert_eq!(policy.backoff(10), Duration::seconds(60));
        assert_eq!(policy.backoff(200), Duration::seconds(60));
    }

    #[test]
    fn only_failed_notifications_can_be_reset() {
        let policy = DeliveryPolicy::default();
        let now = Utc::now();
        let sent = policy.mark_sent(pending(), now);
        assert_eq!(sent.sent_at, Some(now));
        assert!(policy.reset(sent, now).is_none());

        let failed =
            policy.mark_failed(pending(), &DeliveryError::Permanent("nope".to_owned()), now);
        let retried = policy.reset(failed, now).expect("failed can be retried");
        assert_eq!(retried.status, DeliveryStatus::Pending);
        assert_eq!(retried.attempts, 0);
        assert!(policy.is_due(&retried, now));
    }
}

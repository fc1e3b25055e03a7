use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::directory::{User, UserId};
use crate::domain::notification::{Channel, DeliveryStatus, Notification, NotificationId};
use crate::flows::states::{TransitionKind, TransitionOutcome};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelToggles {
    pub email: bool,
    pub whatsapp: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self { email: true, whatsapp: true }
    }
}

/// Affected parties of a transition, deduplicated, in a stable order, without the actor.
///
/// `managers` are the managers of the departments the complaint is leaving or entering.
pub fn recipient_ids(outcome: &TransitionOutcome, managers: &[UserId]) -> Vec<UserId> {
    let complaint = &outcome.complaint;
    let mut candidates = Vec::with_capacity(4 + managers.len());
    if let Some(previous) = &outcome.previous {
        candidates.push(previous.assignee_id.clone());
    }
    candidates.push(complaint.current_assignee_id.clone());
    candidates.push(complaint.client_id.clone());
    candidates.extend(managers.iter().cloned());

    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .filter(|id| id != &outcome.actor_id)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

pub fn render_body(outcome: &TransitionOutcome) -> String {
    let complaint = &outcome.complaint;
    let mut body = match (&outcome.kind, &outcome.previous) {
        (TransitionKind::Created, _) | (_, None) => format!(
            "Complaint {} \"{}\" was registered and assigned to {}.",
            complaint.id, complaint.title, complaint.current_assignee_id
        ),
        (TransitionKind::Advanced, Some(previous)) => format!(
            "Complaint {} \"{}\" moved from {} to {}.",
            complaint.id, complaint.title, previous.status, complaint.status
        ),
        (TransitionKind::Reassigned, Some(previous)) => format!(
            "Complaint {} \"{}\" was reassigned from {} to {} ({}).",
            complaint.id,
            complaint.title,
            previous.assignee_id,
            complaint.current_assignee_id,
            complaint.department_id
        ),
    };
    if let Some(notes) = &outcome.entry.notes {
        body.push_str(" Notes: ");
        body.push_str(notes);
    }
    body
}

/// One pending notification per (recipient, channel) with a destination on file.
/// Inactive users and users without contact details are skipped.
pub fn build_notifications(
    outcome: &TransitionOutcome,
    recipients: &[User],
    toggles: ChannelToggles,
    now: DateTime<Utc>,
) -> Vec<Notification> {
    let body = render_body(outcome);
    let mut notifications = Vec::new();

    for user in recipients.iter().filter(|user| user.is_active) {
        let destinations = [
            (Channel::Email, toggles.email, user.email.as_deref()),
            (Channel::Whatsapp, toggles.whatsapp, user.phone.as_deref()),
        ];
        for (channel, enabled, destination) in destinations {
            let Some(destination) = destination.map(str::trim).filter(|value| !value.is_empty())
            else {
                continue;
            };
            if !enabled {
                continue;
            }
            notifications.push(Notification {
                id: NotificationId(Uuid::new_v4().to_string()),
                user_id: user.id.clone(),
                complaint_id: outcome.complaint.id.clone(),
                sequence: outcome.entry.sequence,
                channel,
                destination: destination.to_owned(),
                body: body.clone(),
                status: DeliveryStatus::Pending,
                attempts: 0,
                next_attempt_at: now,
                last_error: None,
                created_at: now,
                sent_at: None,
            });
        }
    }

    notifications
}

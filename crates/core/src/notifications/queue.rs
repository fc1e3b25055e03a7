//! Hands committed transitions to the listener on a background task.
//!
//! The service only pushes onto an unbounded channel, so a slow or stuck listener can
//! never hold up a transition. One task drains the channel in order, which keeps
//! enqueue order equal to commit order within a process.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::flows::states::TransitionOutcome;
use crate::notifications::TransitionListener;

enum DispatchCommand {
    Transition(Box<TransitionOutcome>),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl DispatchQueue {
    /// Spawns the drain task on the current Tokio runtime.
    pub fn spawn(listener: Arc<dyn TransitionListener>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(listener, rx));
        Self { tx }
    }

    /// Fire-and-forget.
    pub fn submit(&self, outcome: TransitionOutcome) {
        let complaint_id = outcome.complaint.id.clone();
        if self.tx.send(DispatchCommand::Transition(Box::new(outcome))).is_err() {
            tracing::warn!(
                event_name = "notification.dispatch.closed",
                complaint_id = %complaint_id,
                "dispatch task is gone; transition will not be notified"
            );
        }
    }

    /// Resolves once every transition submitted before the call has been handed to
    /// the listener.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(DispatchCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn drain(
    listener: Arc<dyn TransitionListener>,
    mut rx: mpsc::UnboundedReceiver<DispatchCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            DispatchCommand::Transition(outcome) => listener.on_transition(&outcome).await,
            DispatchCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Semaphore;

    use super::DispatchQueue;
    use crate::domain::complaint::{ComplaintId, NewComplaint};
    use crate::domain::directory::{Department, DepartmentId, NatureTypeId, UserId};
    use crate::flows::engine::plan_create;
    use crate::flows::states::TransitionOutcome;
    use crate::notifications::TransitionListener;
    use crate::routing::RoutingDecision;

    struct GatedListener {
        gate: Semaphore,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TransitionListener for GatedListener {
        async fn on_transition(&self, outcome: &TransitionOutcome) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(outcome.complaint.id.0.clone());
            }
        }
    }

    fn outcome(id: &str) -> TransitionOutcome {
        let routing = RoutingDecision {
            department: Department {
                id: DepartmentId("ops".to_owned()),
                name: "Ops".to_owned(),
                manager_id: None,
                default_assignee_id: Some(UserId("e1".to_owned())),
                is_active: true,
            },
            assignee_id: UserId("e1".to_owned()),
            auto_routed: false,
        };
        let fields = NewComplaint {
            title: "t".to_owned(),
            description: "d".to_owned(),
            nature_type_id: Some(NatureTypeId("bug".to_owned())),
            ..NewComplaint::default()
        };
        plan_create(
            ComplaintId(id.to_owned()),
            UserId("client".to_owned()),
            fields,
            &routing,
            &UserId("client".to_owned()),
            Utc::now(),
        )
        .expect("plan")
    }

    #[tokio::test]
    async fn submit_returns_while_listener_is_blocked_and_order_is_kept() {
        let listener = Arc::new(GatedListener { gate: Semaphore::new(0), seen: Mutex::new(Vec::new()) });
        let queue = DispatchQueue::spawn(listener.clone());

        queue.submit(outcome("C-1"));
        queue.submit(outcome("C-2"));
        assert!(listener.seen.lock().expect("lock").is_empty());

        listener.gate.add_permits(2);
        queue.flush().await;

        assert_eq!(*listener.seen.lock().expect("lock"), vec!["C-1".to_owned(), "C-2".to_owned()]);
    }
}

//! Post-transition notification fan-out and delivery.
//!
//! ```text
//! ComplaintService ──commit──► DispatchQueue ──task──► TransitionListener (NotificationDispatcher)
//!                                                           │ enqueue pending rows
//!                                                           ▼
//!                                    NotificationStore ◄── DeliveryWorker ──► DeliveryTransport
//! ```
//!
//! Nothing here can fail or hold up a transition. The service only pushes onto the
//! dispatch queue; the dispatcher logs and drops its own errors. Delivery runs on its
//! own task and reads only persisted state.

pub mod delivery;
pub mod dispatcher;
pub mod queue;
pub mod recipients;
pub mod worker;

use async_trait::async_trait;

use crate::flows::states::TransitionOutcome;

pub use delivery::{DeliveryError, DeliveryPolicy, DeliveryTransport};
pub use dispatcher::{NotificationAdmin, NotificationDispatcher};
pub use queue::DispatchQueue;
pub use recipients::{recipient_ids, render_body, ChannelToggles};
pub use worker::{DeliveryWorker, TickSummary};

/// Receives committed transitions. Implementations must not fail or block the caller
/// on delivery problems.
#[async_trait]
pub trait TransitionListener: Send + Sync {
    async fn on_transition(&self, outcome: &TransitionOutcome);
}

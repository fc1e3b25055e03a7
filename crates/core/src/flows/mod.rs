pub mod engine;
pub mod service;
pub mod states;

pub use engine::{plan_advance, plan_create, plan_reassign};
pub use service::ComplaintService;
pub use states::{PreviousState, TransitionKind, TransitionOutcome};

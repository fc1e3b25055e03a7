pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod notifications;
pub mod permissions;
pub mod routing;
pub mod store;

pub use chrono;

pub use audit::{replay, AuditTrailRecorder, ReplayError, ReplayedState};
pub use domain::complaint::{Attachment, Complaint, ComplaintId, ComplaintStatus, NewComplaint};
pub use domain::directory::{
    Department, DepartmentId, NatureType, NatureTypeId, Principal, Role, User, UserId,
};
pub use domain::history::{HistoryEntry, HistoryEntryId};
pub use domain::notification::{Channel, DeliveryStatus, Notification, NotificationId};
pub use errors::{InterfaceError, WorkflowError};
pub use flows::{ComplaintService, TransitionKind, TransitionOutcome};
pub use notifications::dispatcher::NotificationAdminError;
pub use notifications::{
    DeliveryError, DeliveryPolicy, DeliveryTransport, DeliveryWorker, NotificationAdmin,
    NotificationDispatcher, TransitionListener,
};
pub use permissions::{Action, PermissionMatrix};
pub use routing::{AutoRoutingConfig, RoutingDecision, RoutingResolver, RoutingStrategy};
pub use store::{
    Clock, ComplaintFilter, ComplaintStore, DirectoryStore, NotificationStore, RoutingStats,
    SettingsStore, StoreError, SystemClock,
};

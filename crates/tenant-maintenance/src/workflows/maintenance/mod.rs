//! Maintenance request workflow: renter intake, owner notification, contractor selection,
//! appointment scheduling and completion, with an append-only audit trail.

mod audit;
pub mod domain;
mod locks;
pub mod matcher;
pub mod memory;
pub mod notifier;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod tokens;
pub mod views;

#[cfg(test)]
mod tests;

pub use domain::{
    AvailabilityWindow, ContractorId, ContractorProfile, LogEntryId, MaintenanceRequest,
    Notification, NotificationId, NotificationKind, Priority, Property, PropertyId, RequestId,
    RequestStatus, Role, Schedule, ScheduleId, ScheduleStatus, User, UserId, UserSummary,
    WorkflowLogEntry, WorkflowStep,
};
pub use memory::InMemoryStore;
pub use notifier::{
    ActionLink, CalendarLinks, DeliveryError, LogOnlyMailer, MailQueue, MailTransport,
    MailWorker, OutboundEmail, SmtpMailer,
};
pub use repository::{MaintenanceStore, PartyFilter, StoreError};
pub use router::{maintenance_router, Caller, CALLER_HEADER};
pub use scheduler::{Clock, SystemClock};
pub use service::{
    CreateRequestInput, ErrorKind, MaintenanceWorkflowService, ScheduleInput, WorkflowError,
};
pub use tokens::{IssuedToken, TokenPurpose};
pub use views::{RequestDetailView, SelectionOutcome, TokenContextView};

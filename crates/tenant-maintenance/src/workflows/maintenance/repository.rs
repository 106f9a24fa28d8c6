use chrono::{DateTime, Utc};

use super::domain::{
    ContractorProfile, MaintenanceRequest, NewLogEntry, NewMaintenanceRequest,
    NewNotification, NewSchedule, Notification, NotificationId, Property, PropertyId, RequestId,
    Role, Schedule, User, UserId, WorkflowLogEntry,
};
use super::tokens::{AccessToken, NewAccessToken, TokenDigest};

/// Error enumeration for persistence failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Restricts list queries to the records a participant may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartyFilter {
    pub user_id: UserId,
    pub role: Role,
}

/// Users, properties and contractor profiles. Maintained outside the workflow.
pub trait DirectoryStore: Send + Sync {
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    fn fetch_property(&self, id: PropertyId) -> Result<Option<Property>, StoreError>;
    fn fetch_contractor_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<ContractorProfile>, StoreError>;
    fn active_contractors(&self) -> Result<Vec<ContractorProfile>, StoreError>;
}

pub trait RequestStore: Send + Sync {
    fn insert_request(
        &self,
        request: NewMaintenanceRequest,
    ) -> Result<MaintenanceRequest, StoreError>;
    fn fetch_request(&self, id: RequestId) -> Result<Option<MaintenanceRequest>, StoreError>;
    fn update_request(&self, request: &MaintenanceRequest) -> Result<(), StoreError>;
    /// Undo an insert whose creation could not be audited.
    fn discard_request(&self, id: RequestId) -> Result<(), StoreError>;
    /// Newest first.
    fn list_requests(&self, filter: PartyFilter) -> Result<Vec<MaintenanceRequest>, StoreError>;

    fn insert_schedule(&self, schedule: NewSchedule) -> Result<Schedule, StoreError>;
    fn update_schedule(&self, schedule: &Schedule) -> Result<(), StoreError>;
    /// Creation order, oldest first.
    fn schedules_for_request(&self, id: RequestId) -> Result<Vec<Schedule>, StoreError>;
    /// Ordered by appointment time.
    fn list_schedules(&self, filter: PartyFilter) -> Result<Vec<Schedule>, StoreError>;
}

/// Append-only workflow log; entries are never updated or deleted.
pub trait AuditStore: Send + Sync {
    fn append_log(&self, entry: NewLogEntry) -> Result<WorkflowLogEntry, StoreError>;
    /// Creation order, oldest first.
    fn logs_for_request(&self, id: RequestId) -> Result<Vec<WorkflowLogEntry>, StoreError>;
}

pub trait NotificationStore: Send + Sync {
    fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError>;
    /// Newest first, at most `limit` rows.
    fn notifications_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError>;
    fn unread_count(&self, user_id: UserId) -> Result<usize, StoreError>;
    fn mark_read(&self, id: NotificationId, user_id: UserId) -> Result<(), StoreError>;
    fn mark_all_read(&self, user_id: UserId) -> Result<usize, StoreError>;
}

pub trait TokenStore: Send + Sync {
    fn insert_token(&self, token: NewAccessToken) -> Result<AccessToken, StoreError>;
    /// Lookup must compare digests in constant time.
    fn find_token(&self, digest: &TokenDigest) -> Result<Option<AccessToken>, StoreError>;
    fn mark_consumed(&self, token: &AccessToken, at: DateTime<Utc>) -> Result<(), StoreError>;
    /// Revoke every live token of the request, returning how many were revoked.
    fn revoke_tokens(&self, request_id: RequestId, at: DateTime<Utc>)
        -> Result<usize, StoreError>;
}

/// Everything the workflow engine persists through.
pub trait MaintenanceStore:
    DirectoryStore + RequestStore + AuditStore + NotificationStore + TokenStore
{
}

impl<T> MaintenanceStore for T where
    T: DirectoryStore + RequestStore + AuditStore + NotificationStore + TokenStore
{
}

/// Most recently created schedule, which is the one shown on request detail.
pub fn latest_schedule(schedules: &[Schedule]) -> Option<&Schedule> {
    schedules
        .iter()
        .max_by_key(|schedule| (schedule.created_at, schedule.id))
}

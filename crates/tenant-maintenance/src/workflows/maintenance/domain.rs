use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of any platform user (renter, owner, broker or contractor).
    UserId
);
numeric_id!(PropertyId);
numeric_id!(RequestId);
numeric_id!(ScheduleId);
numeric_id!(
    /// Identifier of a contractor profile, distinct from the contractor's user id.
    ContractorId
);
numeric_id!(LogEntryId);
numeric_id!(NotificationId);
numeric_id!(TokenId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Renter,
    Owner,
    Broker,
    Contractor,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Renter => "renter",
            Self::Owner => "owner",
            Self::Broker => "broker",
            Self::Contractor => "contractor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
}

/// Public subset of a user embedded in request detail responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub address: String,
    pub owner_id: UserId,
    pub renter_id: Option<UserId>,
    pub broker_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractorProfile {
    pub id: ContractorId,
    pub user_id: UserId,
    pub company_name: String,
    pub specialties: Vec<String>,
    pub rating: f32,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Position of a maintenance request in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    NotifiedOwner,
    ContractorSelected,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::NotifiedOwner => "notified_owner",
            Self::ContractorSelected => "contractor_selected",
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Position along the forward path; cancellation sits outside it.
    pub const fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::NotifiedOwner => Some(1),
            Self::ContractorSelected => Some(2),
            Self::Scheduled => Some(3),
            Self::InProgress => Some(4),
            Self::Completed => Some(5),
            Self::Cancelled => None,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Self-loops are allowed for contractor reassignment and rescheduling; everything else
    /// moves forward exactly one step, except cancellation which is reachable from any
    /// non-terminal state.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::NotifiedOwner)
            | (Self::NotifiedOwner, Self::ContractorSelected)
            | (Self::ContractorSelected, Self::ContractorSelected)
            | (Self::ContractorSelected, Self::Scheduled)
            | (Self::Scheduled, Self::Scheduled)
            | (Self::Scheduled, Self::InProgress)
            | (Self::InProgress, Self::Completed) => true,
            (from, Self::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Renter supplied slot during which the property is accessible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub id: RequestId,
    pub property_id: PropertyId,
    pub renter_id: UserId,
    pub owner_id: UserId,
    pub broker_id: UserId,
    pub contractor_id: Option<UserId>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub availability: Vec<AvailabilityWindow>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaintenanceRequest {
    /// Relationship of `user` to this request, if any.
    pub fn party_role(&self, user: UserId) -> Option<Role> {
        if user == self.renter_id {
            Some(Role::Renter)
        } else if user == self.owner_id {
            Some(Role::Owner)
        } else if user == self.broker_id {
            Some(Role::Broker)
        } else if self.contractor_id == Some(user) {
            Some(Role::Contractor)
        } else {
            None
        }
    }

    pub fn parties(&self) -> Vec<UserId> {
        let mut parties = vec![self.renter_id, self.owner_id, self.broker_id];
        parties.extend(self.contractor_id);
        parties
    }
}

/// Fields required to persist a new request; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMaintenanceRequest {
    pub property_id: PropertyId,
    pub renter_id: UserId,
    pub owner_id: UserId,
    pub broker_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub status: RequestStatus,
    pub availability: Vec<AvailabilityWindow>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub request_id: RequestId,
    pub contractor_id: UserId,
    pub renter_id: UserId,
    pub scheduled_for: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub request_id: RequestId,
    pub contractor_id: UserId,
    pub renter_id: UserId,
    pub scheduled_for: DateTime<Utc>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Vocabulary of audit steps recorded against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    RequestCreated,
    BrokerNotified,
    OwnerNotified,
    ContractorAutoSelected,
    ContractorSelected,
    AppointmentAutoScheduled,
    AppointmentScheduled,
    WorkStarted,
    RequestCompleted,
    RequestCancelled,
}

impl WorkflowStep {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestCreated => "request_created",
            Self::BrokerNotified => "broker_notified",
            Self::OwnerNotified => "owner_notified",
            Self::ContractorAutoSelected => "contractor_auto_selected",
            Self::ContractorSelected => "contractor_selected",
            Self::AppointmentAutoScheduled => "appointment_auto_scheduled",
            Self::AppointmentScheduled => "appointment_scheduled",
            Self::WorkStarted => "work_started",
            Self::RequestCompleted => "request_completed",
            Self::RequestCancelled => "request_cancelled",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowLogEntry {
    pub id: LogEntryId,
    pub request_id: RequestId,
    pub step: WorkflowStep,
    pub actor_id: Option<UserId>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub request_id: RequestId,
    pub step: WorkflowStep,
    pub actor_id: Option<UserId>,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMaintenanceRequest,
    ContractorAssigned,
    ContractorSelected,
    AppointmentScheduled,
    AppointmentAutoScheduled,
    StatusChanged,
    RequestCancelled,
}

impl NotificationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewMaintenanceRequest => "new_maintenance_request",
            Self::ContractorAssigned => "contractor_assigned",
            Self::ContractorSelected => "contractor_selected",
            Self::AppointmentScheduled => "appointment_scheduled",
            Self::AppointmentAutoScheduled => "appointment_auto_scheduled",
            Self::StatusChanged => "status_changed",
            Self::RequestCancelled => "request_cancelled",
        }
    }

    /// Kinds that announce an appointment and therefore carry calendar links.
    pub const fn announces_appointment(self) -> bool {
        matches!(
            self,
            Self::AppointmentScheduled | Self::AppointmentAutoScheduled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_request_id: Option<RequestId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub related_request_id: Option<RequestId>,
    pub created_at: DateTime<Utc>,
}

use serde::Serialize;

use super::domain::{
    ContractorProfile, MaintenanceRequest, Property, RequestId, RequestStatus, Schedule,
    UserSummary, WorkflowLogEntry,
};
use super::tokens::TokenPurpose;

/// Request detail as shown to one of its parties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDetailView {
    pub request: MaintenanceRequest,
    pub property: Option<Property>,
    pub renter: Option<UserSummary>,
    pub contractor: Option<UserSummary>,
    /// Oldest entry first.
    pub workflow_log: Vec<WorkflowLogEntry>,
    /// Most recently created schedule, active or not.
    pub latest_schedule: Option<Schedule>,
}

/// What a token link holder sees before acting on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenContextView {
    pub purpose: TokenPurpose,
    pub request_id: RequestId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: RequestStatus,
    pub property_address: Option<String>,
    /// Candidates for selection links, best match first. Empty for scheduling links.
    pub contractors: Vec<ContractorProfile>,
}

/// Result of a contractor selection, including the appointment when one was chained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionOutcome {
    pub request: MaintenanceRequest,
    pub schedule: Option<Schedule>,
}

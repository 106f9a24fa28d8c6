use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::audit::AuditLog;
use super::domain::{
    AvailabilityWindow, ContractorProfile, MaintenanceRequest, NewMaintenanceRequest,
    Notification, NotificationId, NotificationKind, Priority, PropertyId, RequestId,
    RequestStatus, Role, Schedule, ScheduleStatus, User, UserId, UserSummary, WorkflowStep,
};
use super::locks::RequestLocks;
use super::matcher::{best_match, covers};
use super::notifier::{MailQueue, Notice, Notifier};
use super::repository::{latest_schedule, MaintenanceStore, PartyFilter, StoreError};
use super::scheduler::{
    plan_automatic, plan_manual, Clock, Rebooking, SchedulePlan, SchedulingError, SystemClock,
};
use super::tokens::{IssuedToken, TokenDigest, TokenIssuer, TokenPurpose};
use super::views::{RequestDetailView, SelectionOutcome, TokenContextView};
use crate::config::{WorkflowConfig, WorkflowMode};

/// Notifications returned per listing call.
pub const NOTIFICATION_PAGE: usize = 50;

/// Parties allowed to start or finish the work.
const WORK_ROLES: &[Role] = &[Role::Contractor, Role::Broker];
/// Parties allowed to cancel a request.
const CANCEL_ROLES: &[Role] = &[Role::Renter, Role::Owner, Role::Broker];

/// Payload a renter submits to open a request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateRequestInput {
    pub property_id: PropertyId,
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub availability: Vec<AvailabilityWindow>,
}

impl CreateRequestInput {
    fn validate(&self) -> Result<(), WorkflowError> {
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("category", &self.category),
        ] {
            if value.trim().is_empty() {
                return Err(WorkflowError::InvalidInput(format!("{field} is required")));
            }
        }
        if self
            .availability
            .iter()
            .any(|window| window.ends_at <= window.starts_at)
        {
            return Err(WorkflowError::InvalidInput(
                "availability window must end after it starts".to_string(),
            ));
        }
        Ok(())
    }
}

/// Appointment time supplied by a broker or the assigned contractor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleInput {
    #[serde(rename = "scheduled_date")]
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Drives maintenance requests through their lifecycle.
///
/// Every mutating operation runs under the per-request lock, persists the new status, appends
/// the audit entry and only then notifies. Store and audit failures abort the operation;
/// notification failures never do.
pub struct MaintenanceWorkflowService<S> {
    store: Arc<S>,
    notifier: Notifier<S>,
    audit: AuditLog<S>,
    issuer: TokenIssuer,
    locks: RequestLocks,
    clock: Arc<dyn Clock>,
    config: WorkflowConfig,
}

impl<S> MaintenanceWorkflowService<S>
where
    S: MaintenanceStore + 'static,
{
    pub fn new(store: Arc<S>, config: WorkflowConfig, mail: Option<MailQueue>) -> Self {
        Self::with_clock(store, config, mail, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        config: WorkflowConfig,
        mail: Option<MailQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifier: Notifier::new(store.clone(), config.public_url.clone(), mail),
            audit: AuditLog::new(store.clone()),
            issuer: TokenIssuer::new(config.token_ttl()),
            locks: RequestLocks::new(),
            store,
            clock,
            config,
        }
    }

    /// Open a request for the calling renter.
    ///
    /// In automatic mode the owner is notified straight away and the best matching contractor
    /// is assigned (and booked, with auto-scheduling on). Staged mode stops at `pending`.
    pub fn create_request(
        &self,
        actor_id: UserId,
        input: CreateRequestInput,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let renter = self.require_role(
            actor_id,
            &[Role::Renter],
            "only renters can create maintenance requests",
        )?;
        input.validate()?;

        let property = self
            .store
            .fetch_property(input.property_id)?
            .ok_or_else(|| WorkflowError::NotFound("property not found".to_string()))?;
        if property
            .renter_id
            .is_some_and(|tenant| tenant != renter.id)
        {
            return Err(WorkflowError::Forbidden(
                "property is let to another renter".to_string(),
            ));
        }

        let clock = self.clock.now();
        let now = clock.with_timezone(&Utc);
        let request = self.store.insert_request(NewMaintenanceRequest {
            property_id: property.id,
            renter_id: renter.id,
            owner_id: property.owner_id,
            broker_id: property.broker_id,
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            category: input.category.trim().to_string(),
            priority: input.priority,
            status: RequestStatus::Pending,
            availability: input.availability,
            created_at: now,
        })?;

        self.locks
            .run(request.id, || self.open_request(request, clock))
    }

    fn open_request(
        &self,
        mut request: MaintenanceRequest,
        clock: DateTime<FixedOffset>,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let now = clock.with_timezone(&Utc);
        let created = self.audit.record(
            request.id,
            WorkflowStep::RequestCreated,
            Some(request.renter_id),
            format!("Renter created {} request: {}", request.category, request.title),
            now,
        );
        if let Err(err) = created {
            if let Err(undo) = self.store.discard_request(request.id) {
                warn!(request_id = %request.id, error = %undo, "unaudited request left in store");
            }
            return Err(err.into());
        }

        self.notifier.notify(
            Notice::about(
                &request,
                request.broker_id,
                NotificationKind::NewMaintenanceRequest,
                "New Maintenance Request",
                format!(
                    "New {} request from renter: {}",
                    request.category, request.title
                ),
            ),
            now,
        );
        self.audit.record(
            request.id,
            WorkflowStep::BrokerNotified,
            Some(request.broker_id),
            "Broker notified of new request",
            now,
        )?;

        if self.config.mode == WorkflowMode::Staged {
            return Ok(request);
        }

        let broker = request.broker_id;
        self.enter_owner_stage(
            &mut request,
            Some(broker),
            "Owner automatically notified of new request",
            now,
        )?;
        if self.auto_select(&mut request, now)? && self.config.auto_schedule {
            self.auto_schedule(&mut request, clock)?;
        }
        Ok(request)
    }

    /// Broker hands a pending request to the owner, issuing the selection link.
    pub fn notify_owner(
        &self,
        actor_id: UserId,
        request_id: RequestId,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let broker = self.require_role(
            actor_id,
            &[Role::Broker],
            "only brokers can notify owners",
        )?;

        self.locks.run(request_id, || {
            let mut request = self.load_for(request_id, broker.id)?;
            let now = self.now();
            self.enter_owner_stage(
                &mut request,
                Some(broker.id),
                "Broker notified owner of maintenance request",
                now,
            )?;
            Ok(request)
        })
    }

    /// Owner picks a contractor from the authenticated portal.
    pub fn select_contractor(
        &self,
        actor_id: UserId,
        request_id: RequestId,
        contractor: UserId,
    ) -> Result<SelectionOutcome, WorkflowError> {
        let owner = self.require_role(
            actor_id,
            &[Role::Owner],
            "only property owners can select contractors",
        )?;

        self.locks.run(request_id, || {
            let mut request = self.load_for(request_id, owner.id)?;
            self.apply_selection(&mut request, contractor, owner.id, self.clock.now())
        })
    }

    /// Owner picks a contractor through the emailed selection link.
    pub fn select_contractor_with_token(
        &self,
        token: &str,
        contractor: UserId,
    ) -> Result<SelectionOutcome, WorkflowError> {
        self.redeem(token, TokenPurpose::SelectContractor, |request, clock| {
            let owner = request.owner_id;
            self.apply_selection(request, contractor, owner, clock)
        })
    }

    /// Broker or assigned contractor books (or rebooks) the appointment.
    pub fn schedule_appointment(
        &self,
        actor_id: UserId,
        request_id: RequestId,
        input: ScheduleInput,
    ) -> Result<Schedule, WorkflowError> {
        let actor = self.require_role(
            actor_id,
            &[Role::Broker, Role::Contractor],
            "only brokers or the assigned contractor can schedule appointments",
        )?;

        self.locks.run(request_id, || {
            let mut request = self.load_for(request_id, actor.id)?;
            if !matches!(
                request.party_role(actor.id),
                Some(Role::Broker | Role::Contractor)
            ) {
                return Err(WorkflowError::Forbidden(
                    "only brokers or the assigned contractor can schedule appointments"
                        .to_string(),
                ));
            }
            let now = self.now();
            self.apply_manual_schedule(&mut request, actor.id, input, now)
        })
    }

    /// Contractor books the appointment through the emailed scheduling link.
    pub fn schedule_appointment_with_token(
        &self,
        token: &str,
        input: ScheduleInput,
    ) -> Result<Schedule, WorkflowError> {
        self.redeem(token, TokenPurpose::ScheduleAppointment, |request, clock| {
            let contractor = request
                .contractor_id
                .ok_or(WorkflowError::NoContractorAssigned)?;
            self.apply_manual_schedule(request, contractor, input, clock.with_timezone(&Utc))
        })
    }

    /// Validate a token link without consuming it and describe what it unlocks.
    pub fn token_context(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<TokenContextView, WorkflowError> {
        let now = self.now();
        let stored = self.store.find_token(&TokenDigest::of(token))?;
        let request = match &stored {
            Some(stored) => self.store.fetch_request(stored.request_id)?,
            None => None,
        }
        .ok_or(WorkflowError::InvalidOrExpiredToken)?;

        if let Err(reason) = TokenIssuer::check(stored.as_ref(), purpose, request.status, now) {
            debug!(request_id = %request.id, ?reason, "token link refused");
            return Err(WorkflowError::InvalidOrExpiredToken);
        }

        let property_address = self
            .store
            .fetch_property(request.property_id)?
            .map(|property| property.address);
        let contractors = match purpose {
            TokenPurpose::SelectContractor => {
                selection_candidates(&request.category, self.store.active_contractors()?)
            }
            TokenPurpose::ScheduleAppointment => Vec::new(),
        };

        Ok(TokenContextView {
            purpose,
            request_id: request.id,
            title: request.title,
            description: request.description,
            category: request.category,
            status: request.status,
            property_address,
            contractors,
        })
    }

    /// Move a request to `in_progress`, `completed` or `cancelled`.
    ///
    /// Every other status is reached through its dedicated operation and is refused here.
    pub fn update_status(
        &self,
        actor_id: UserId,
        request_id: RequestId,
        target: RequestStatus,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        let actor = self.require_user(actor_id)?;

        self.locks.run(request_id, || {
            let mut request = self.load_for(request_id, actor.id)?;
            let role = request
                .party_role(actor.id)
                .ok_or_else(request_not_found)?;

            let (step, permitted) = match target {
                RequestStatus::InProgress => (WorkflowStep::WorkStarted, WORK_ROLES),
                RequestStatus::Completed => (WorkflowStep::RequestCompleted, WORK_ROLES),
                RequestStatus::Cancelled => (WorkflowStep::RequestCancelled, CANCEL_ROLES),
                other => {
                    return Err(WorkflowError::InvalidTransition {
                        from: request.status,
                        to: other,
                    })
                }
            };
            if !permitted.contains(&role) {
                return Err(WorkflowError::Forbidden(format!(
                    "a {} cannot mark a request {target}",
                    role.label()
                )));
            }

            let now = self.now();
            let details = format!("Status changed from {} to {target}", request.status);
            self.advance(&mut request, target, step, Some(actor.id), details, now)?;
            self.settle_schedules(request.id, target)?;
            if target == RequestStatus::Cancelled {
                self.store.revoke_tokens(request.id, now)?;
            }

            let kind = if target == RequestStatus::Cancelled {
                NotificationKind::RequestCancelled
            } else {
                NotificationKind::StatusChanged
            };
            for party in request.parties() {
                if party == actor.id {
                    continue;
                }
                self.notifier.notify(
                    Notice::about(
                        &request,
                        party,
                        kind,
                        "Request Status Updated",
                        format!("'{}' is now {target}", request.title),
                    ),
                    now,
                );
            }
            Ok(request)
        })
    }

    pub fn request_detail(
        &self,
        actor_id: UserId,
        request_id: RequestId,
    ) -> Result<RequestDetailView, WorkflowError> {
        let actor = self.require_user(actor_id)?;
        let request = self.load_for(request_id, actor.id)?;

        let property = self.store.fetch_property(request.property_id)?;
        let renter = self.summary(Some(request.renter_id))?;
        let contractor = self.summary(request.contractor_id)?;
        let workflow_log = self.audit.trail(request.id)?;
        let schedules = self.store.schedules_for_request(request.id)?;
        let latest_schedule = latest_schedule(&schedules).cloned();

        Ok(RequestDetailView {
            request,
            property,
            renter,
            contractor,
            workflow_log,
            latest_schedule,
        })
    }

    /// Requests the caller is a party to, newest first.
    pub fn list_requests(
        &self,
        actor_id: UserId,
    ) -> Result<Vec<MaintenanceRequest>, WorkflowError> {
        let actor = self.require_user(actor_id)?;
        Ok(self.store.list_requests(party_filter(&actor))?)
    }

    pub fn list_contractors(&self) -> Result<Vec<ContractorProfile>, WorkflowError> {
        Ok(self.store.active_contractors()?)
    }

    /// Schedules on the caller's requests, soonest first.
    pub fn list_schedules(&self, actor_id: UserId) -> Result<Vec<Schedule>, WorkflowError> {
        let actor = self.require_user(actor_id)?;
        Ok(self.store.list_schedules(party_filter(&actor))?)
    }

    pub fn notifications(&self, actor_id: UserId) -> Result<Vec<Notification>, WorkflowError> {
        let actor = self.require_user(actor_id)?;
        Ok(self
            .store
            .notifications_for_user(actor.id, NOTIFICATION_PAGE)?)
    }

    pub fn unread_count(&self, actor_id: UserId) -> Result<usize, WorkflowError> {
        let actor = self.require_user(actor_id)?;
        Ok(self.store.unread_count(actor.id)?)
    }

    pub fn mark_read(
        &self,
        actor_id: UserId,
        notification_id: NotificationId,
    ) -> Result<(), WorkflowError> {
        let actor = self.require_user(actor_id)?;
        self.store
            .mark_read(notification_id, actor.id)
            .map_err(|err| match err {
                StoreError::NotFound => {
                    WorkflowError::NotFound("notification not found".to_string())
                }
                other => other.into(),
            })
    }

    pub fn mark_all_read(&self, actor_id: UserId) -> Result<usize, WorkflowError> {
        let actor = self.require_user(actor_id)?;
        Ok(self.store.mark_all_read(actor.id)?)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    fn require_user(&self, actor_id: UserId) -> Result<User, WorkflowError> {
        self.store
            .fetch_user(actor_id)?
            .ok_or_else(|| WorkflowError::Forbidden("unknown user".to_string()))
    }

    fn require_role(
        &self,
        actor_id: UserId,
        roles: &[Role],
        message: &str,
    ) -> Result<User, WorkflowError> {
        let user = self.require_user(actor_id)?;
        if roles.contains(&user.role) {
            Ok(user)
        } else {
            Err(WorkflowError::Forbidden(message.to_string()))
        }
    }

    /// Load a request the caller is a party to. Strangers get the same answer as for a
    /// missing request.
    fn load_for(
        &self,
        request_id: RequestId,
        actor_id: UserId,
    ) -> Result<MaintenanceRequest, WorkflowError> {
        self.store
            .fetch_request(request_id)?
            .filter(|request| request.party_role(actor_id).is_some())
            .ok_or_else(request_not_found)
    }

    fn summary(&self, user: Option<UserId>) -> Result<Option<UserSummary>, WorkflowError> {
        let Some(id) = user else {
            return Ok(None);
        };
        Ok(self.store.fetch_user(id)?.as_ref().map(UserSummary::from))
    }

    /// Validate, record, then persist. A failed audit write leaves the stored request as it was.
    fn advance(
        &self,
        request: &mut MaintenanceRequest,
        next: RequestStatus,
        step: WorkflowStep,
        actor: Option<UserId>,
        details: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.ensure_transition(request, next)?;
        self.audit.record(request.id, step, actor, details, now)?;
        self.persist_status(request, next, now)
    }

    fn persist_status(
        &self,
        request: &mut MaintenanceRequest,
        next: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let previous = request.status;
        request.status = next;
        request.updated_at = now;
        self.store.update_request(request)?;
        debug!(request_id = %request.id, from = %previous, to = %next, "request status changed");
        Ok(())
    }

    /// Revoke whatever links are still live for the request and mint a new one.
    fn issue_token(
        &self,
        request_id: RequestId,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, WorkflowError> {
        let revoked = self.store.revoke_tokens(request_id, now)?;
        let (issued, record) = self.issuer.issue(request_id, purpose, now);
        self.store.insert_token(record)?;
        debug!(
            request_id = %request_id,
            purpose = purpose.path_segment(),
            revoked,
            "action token issued"
        );
        Ok(issued)
    }

    fn enter_owner_stage(
        &self,
        request: &mut MaintenanceRequest,
        actor: Option<UserId>,
        details: &str,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        self.advance(
            request,
            RequestStatus::NotifiedOwner,
            WorkflowStep::OwnerNotified,
            actor,
            details,
            now,
        )?;
        let token = self.issue_token(request.id, TokenPurpose::SelectContractor, now)?;

        self.notifier.notify(
            Notice::about(
                request,
                request.owner_id,
                NotificationKind::NewMaintenanceRequest,
                "New Maintenance Request",
                format!("New {} request: {}", request.category, request.title),
            )
            .with_token(&token),
            now,
        );
        Ok(())
    }

    /// Assign the best matching contractor. `false` leaves the request with the owner.
    fn auto_select(
        &self,
        request: &mut MaintenanceRequest,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        let contractors = self.store.active_contractors()?;
        let Some(profile) = best_match(&request.category, &contractors) else {
            info!(
                request_id = %request.id,
                category = %request.category,
                "no contractor covers category; request stays with owner"
            );
            return Ok(false);
        };

        let contractor = profile.user_id;
        let details = format!(
            "{} automatically selected based on category: {}",
            profile.company_name, request.category
        );
        let token = self.assign_contractor(
            request,
            contractor,
            WorkflowStep::ContractorAutoSelected,
            None,
            details,
            now,
        )?;

        self.notifier.notify(
            Notice::about(
                request,
                contractor,
                NotificationKind::ContractorAssigned,
                "New Job Assignment",
                format!("You have been automatically assigned to: {}", request.title),
            )
            .with_token(&token),
            now,
        );
        Ok(true)
    }

    fn assign_contractor(
        &self,
        request: &mut MaintenanceRequest,
        contractor: UserId,
        step: WorkflowStep,
        actor: Option<UserId>,
        details: String,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, WorkflowError> {
        request.contractor_id = Some(contractor);
        self.advance(
            request,
            RequestStatus::ContractorSelected,
            step,
            actor,
            details,
            now,
        )?;
        self.issue_token(request.id, TokenPurpose::ScheduleAppointment, now)
    }

    fn apply_selection(
        &self,
        request: &mut MaintenanceRequest,
        contractor: UserId,
        owner: UserId,
        clock: DateTime<FixedOffset>,
    ) -> Result<SelectionOutcome, WorkflowError> {
        let now = clock.with_timezone(&Utc);
        let profile = self
            .store
            .fetch_contractor_by_user(contractor)?
            .filter(|profile| profile.active)
            .ok_or_else(|| WorkflowError::NotFound("contractor not found".to_string()))?;

        let token = self.assign_contractor(
            request,
            contractor,
            WorkflowStep::ContractorSelected,
            Some(owner),
            format!("Owner selected contractor: {}", profile.company_name),
            now,
        )?;

        self.notifier.notify(
            Notice::about(
                request,
                contractor,
                NotificationKind::ContractorAssigned,
                "New Job Assignment",
                format!("You have been assigned to: {}", request.title),
            )
            .with_token(&token),
            now,
        );
        for recipient in [request.renter_id, request.broker_id] {
            self.notifier.notify(
                Notice::about(
                    request,
                    recipient,
                    NotificationKind::ContractorSelected,
                    "Contractor Selected",
                    format!(
                        "{} has been selected for: {}",
                        profile.company_name, request.title
                    ),
                ),
                now,
            );
        }

        let schedule = if self.config.auto_schedule {
            self.auto_schedule(request, clock)?
        } else {
            None
        };
        Ok(SelectionOutcome {
            request: request.clone(),
            schedule,
        })
    }

    /// Book the default appointment unless an active schedule already exists.
    ///
    /// Returns the schedule created by this call, `None` when it was a no-op.
    fn auto_schedule(
        &self,
        request: &mut MaintenanceRequest,
        clock: DateTime<FixedOffset>,
    ) -> Result<Option<Schedule>, WorkflowError> {
        let now = clock.with_timezone(&Utc);
        let existing = self.store.schedules_for_request(request.id)?;
        let plan = plan_automatic(request, &existing, clock)?;

        let pending = match plan {
            SchedulePlan::AlreadyScheduled(active) => {
                debug!(
                    request_id = %request.id,
                    schedule_id = %active.id,
                    "active schedule exists; auto-schedule skipped"
                );
                return Ok(None);
            }
            SchedulePlan::Create(schedule) => schedule,
        };
        self.ensure_transition(request, RequestStatus::Scheduled)?;
        self.audit.record(
            request.id,
            WorkflowStep::AppointmentAutoScheduled,
            None,
            format!(
                "Appointment automatically scheduled for {}",
                appointment_label(pending.scheduled_for)
            ),
            now,
        )?;

        let schedule = self.store.insert_schedule(pending)?;
        self.persist_status(request, RequestStatus::Scheduled, now)?;
        self.announce_appointment(
            request,
            &schedule,
            NotificationKind::AppointmentAutoScheduled,
            now,
        );
        Ok(Some(schedule))
    }

    fn apply_manual_schedule(
        &self,
        request: &mut MaintenanceRequest,
        actor: UserId,
        input: ScheduleInput,
        now: DateTime<Utc>,
    ) -> Result<Schedule, WorkflowError> {
        let existing = self.store.schedules_for_request(request.id)?;
        let Rebooking {
            schedule: pending,
            supersedes,
        } = plan_manual(
            request,
            &existing,
            input.scheduled_for,
            input.notes.unwrap_or_default(),
            now,
        )?;
        self.ensure_transition(request, RequestStatus::Scheduled)?;
        self.audit.record(
            request.id,
            WorkflowStep::AppointmentScheduled,
            Some(actor),
            format!(
                "Appointment scheduled for {}",
                appointment_label(pending.scheduled_for)
            ),
            now,
        )?;

        for mut previous in supersedes {
            previous.status = ScheduleStatus::Cancelled;
            self.store.update_schedule(&previous)?;
        }
        let schedule = self.store.insert_schedule(pending)?;
        self.persist_status(request, RequestStatus::Scheduled, now)?;
        self.announce_appointment(
            request,
            &schedule,
            NotificationKind::AppointmentScheduled,
            now,
        );
        Ok(schedule)
    }

    fn ensure_transition(
        &self,
        request: &MaintenanceRequest,
        next: RequestStatus,
    ) -> Result<(), WorkflowError> {
        if request.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                from: request.status,
                to: next,
            })
        }
    }

    /// Tell all four parties. The broker's copy carries `broker_kind`.
    fn announce_appointment(
        &self,
        request: &MaintenanceRequest,
        schedule: &Schedule,
        broker_kind: NotificationKind,
        now: DateTime<Utc>,
    ) {
        let message = format!(
            "Appointment for '{}' scheduled for {}",
            request.title,
            appointment_label(schedule.scheduled_for)
        );
        for party in request.parties() {
            let kind = if party == request.broker_id {
                broker_kind
            } else {
                NotificationKind::AppointmentScheduled
            };
            self.notifier.notify(
                Notice::about(request, party, kind, "Appointment Scheduled", message.clone()),
                now,
            );
        }
    }

    /// Carry the active schedule along with a lifecycle change.
    fn settle_schedules(
        &self,
        request_id: RequestId,
        target: RequestStatus,
    ) -> Result<(), WorkflowError> {
        let next = match target {
            RequestStatus::InProgress => ScheduleStatus::Confirmed,
            RequestStatus::Completed => ScheduleStatus::Completed,
            RequestStatus::Cancelled => ScheduleStatus::Cancelled,
            _ => return Ok(()),
        };
        for mut schedule in self.store.schedules_for_request(request_id)? {
            if schedule.status.is_active() && schedule.status != next {
                schedule.status = next;
                self.store.update_schedule(&schedule)?;
            }
        }
        Ok(())
    }

    /// Run `action` on behalf of a token holder. The token is consumed only when the action
    /// succeeds.
    fn redeem<T>(
        &self,
        token: &str,
        purpose: TokenPurpose,
        action: impl FnOnce(
            &mut MaintenanceRequest,
            DateTime<FixedOffset>,
        ) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        let digest = TokenDigest::of(token);
        let Some(found) = self.store.find_token(&digest)? else {
            debug!(purpose = purpose.path_segment(), "unknown token presented");
            return Err(WorkflowError::InvalidOrExpiredToken);
        };

        self.locks.run(found.request_id, || {
            let clock = self.clock.now();
            let now = clock.with_timezone(&Utc);
            let stored = self.store.find_token(&digest)?;
            let mut request = self
                .store
                .fetch_request(found.request_id)?
                .ok_or(WorkflowError::InvalidOrExpiredToken)?;

            if let Err(reason) = TokenIssuer::check(stored.as_ref(), purpose, request.status, now)
            {
                debug!(request_id = %request.id, ?reason, "token refused");
                return Err(WorkflowError::InvalidOrExpiredToken);
            }

            let value = action(&mut request, clock)?;
            if let Some(stored) = &stored {
                self.store
                    .mark_consumed(stored, now)
                    .map_err(|err| match err {
                        StoreError::Conflict => WorkflowError::InvalidOrExpiredToken,
                        other => other.into(),
                    })?;
            }
            Ok(value)
        })
    }
}

fn party_filter(actor: &User) -> PartyFilter {
    PartyFilter {
        user_id: actor.id,
        role: actor.role,
    }
}

fn request_not_found() -> WorkflowError {
    WorkflowError::NotFound("maintenance request not found".to_string())
}

fn appointment_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Active contractors ordered for a selection page: those covering the category first, then
/// by rating.
fn selection_candidates(
    category: &str,
    mut contractors: Vec<ContractorProfile>,
) -> Vec<ContractorProfile> {
    contractors.sort_by(|a, b| {
        covers(b, category)
            .cmp(&covers(a, category))
            .then_with(|| b.rating.total_cmp(&a.rating))
            .then_with(|| a.id.cmp(&b.id))
    });
    contractors
}

/// Broad classification of [`WorkflowError`] used by transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidOrExpiredToken,
    NoContractorAssigned,
    InvalidTransition,
    InvalidInput,
    PersistenceFailure,
}

/// Error raised by the workflow service.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("no contractor assigned to this request")]
    NoContractorAssigned,
    #[error("cannot move request from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::InvalidOrExpiredToken => ErrorKind::InvalidOrExpiredToken,
            Self::NoContractorAssigned => ErrorKind::NoContractorAssigned,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }
}

impl From<SchedulingError> for WorkflowError {
    fn from(error: SchedulingError) -> Self {
        match error {
            SchedulingError::NoContractorAssigned => Self::NoContractorAssigned,
            SchedulingError::InPast => {
                Self::InvalidInput("appointment time must be in the future".to_string())
            }
        }
    }
}

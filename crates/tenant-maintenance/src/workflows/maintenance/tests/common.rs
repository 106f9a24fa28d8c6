use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::WorkflowConfig;
use crate::workflows::maintenance::domain::{
    ContractorProfile, MaintenanceRequest, NewLogEntry, NewMaintenanceRequest, NewNotification,
    NewSchedule, Notification, NotificationId, Priority, Property, PropertyId, RequestId, Role,
    Schedule, User, UserId, WorkflowLogEntry, WorkflowStep,
};
use crate::workflows::maintenance::notifier::{ActionLink, MailQueue, OutboundEmail};
use crate::workflows::maintenance::repository::{
    AuditStore, DirectoryStore, NotificationStore, PartyFilter, RequestStore, StoreError,
    TokenStore,
};
use crate::workflows::maintenance::scheduler::Clock;
use crate::workflows::maintenance::service::{
    CreateRequestInput, MaintenanceWorkflowService, ScheduleInput,
};
use crate::workflows::maintenance::tokens::{
    AccessToken, NewAccessToken, TokenDigest, TokenPurpose,
};
use crate::workflows::maintenance::InMemoryStore;

/// Manually advanced clock at UTC+2.
pub(super) struct TestClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl TestClock {
    pub(super) fn new() -> Self {
        let now = FixedOffset::east_opt(2 * 3600)
            .expect("valid offset")
            .with_ymd_and_hms(2025, 10, 14, 9, 0, 0)
            .single()
            .expect("valid time");
        Self {
            now: Mutex::new(now),
        }
    }

    pub(super) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock mutex");
        *now += by;
    }

    pub(super) fn utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().expect("clock mutex")
    }
}

/// Default appointment for the test clock: two days out at 10:00 local.
pub(super) fn expected_auto_appointment() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 16, 8, 0, 0)
        .single()
        .expect("valid time")
}

pub(super) struct Parties {
    pub(super) renter: User,
    pub(super) owner: User,
    pub(super) broker: User,
    pub(super) plumber: User,
    pub(super) plumber_profile: ContractorProfile,
    pub(super) electrician: User,
    pub(super) stranger: User,
    pub(super) property: Property,
}

pub(super) fn seeded_store() -> (Arc<InMemoryStore>, Parties) {
    let store = InMemoryStore::new();
    let renter = store
        .add_user("Michael Vander Haegen", "renter@demo.com", Role::Renter, None)
        .expect("renter");
    let owner = store
        .add_user("Jean Pierre Callant", "owner@demo.com", Role::Owner, None)
        .expect("owner");
    let broker = store
        .add_user(
            "Partners & Vastgoed",
            "broker@partners-vastgoed.com",
            Role::Broker,
            Some("+32 57 00 00 00"),
        )
        .expect("broker");
    let plumber = store
        .add_user("Vanhoutte Sanitair", "plumber@demo.com", Role::Contractor, None)
        .expect("plumber");
    let electrician = store
        .add_user("Lux Elektro", "electrician@demo.com", Role::Contractor, None)
        .expect("electrician");
    let stranger = store
        .add_user("Other Renter", "other@demo.com", Role::Renter, None)
        .expect("stranger");

    let plumber_profile = store
        .add_contractor(plumber.id, "Vanhoutte Sanitair", &["plumbing", "heating"], 4.5)
        .expect("plumber profile");
    store
        .add_contractor(electrician.id, "Lux Elektro", &["electrical"], 4.8)
        .expect("electrician profile");

    let property = store
        .add_property(
            "Omlooptstraat 2B, 8900 Ieper",
            owner.id,
            Some(renter.id),
            broker.id,
        )
        .expect("property");

    (
        Arc::new(store),
        Parties {
            renter,
            owner,
            broker,
            plumber,
            plumber_profile,
            electrician,
            stranger,
            property,
        },
    )
}

pub(super) struct Harness {
    pub(super) service: Arc<MaintenanceWorkflowService<InMemoryStore>>,
    pub(super) store: Arc<InMemoryStore>,
    pub(super) clock: Arc<TestClock>,
    pub(super) parties: Parties,
    mail: UnboundedReceiver<OutboundEmail>,
}

impl Harness {
    /// Emails queued since the last call.
    pub(super) fn drain_emails(&mut self) -> Vec<OutboundEmail> {
        let mut emails = Vec::new();
        while let Ok(email) = self.mail.try_recv() {
            emails.push(email);
        }
        emails
    }
}

pub(super) fn automatic() -> WorkflowConfig {
    WorkflowConfig {
        public_url: "https://portal.example.com".to_string(),
        ..WorkflowConfig::automatic()
    }
}

pub(super) fn staged() -> WorkflowConfig {
    WorkflowConfig {
        public_url: "https://portal.example.com".to_string(),
        ..WorkflowConfig::staged()
    }
}

pub(super) fn build_service(config: WorkflowConfig) -> Harness {
    let (store, parties) = seeded_store();
    let clock = Arc::new(TestClock::new());
    let (queue, mail) = MailQueue::channel();
    let service = MaintenanceWorkflowService::with_clock(
        store.clone(),
        config,
        Some(queue),
        clock.clone(),
    );
    Harness {
        service: Arc::new(service),
        store,
        clock,
        parties,
        mail,
    }
}

pub(super) fn plumbing_request(property: PropertyId) -> CreateRequestInput {
    CreateRequestInput {
        property_id: property,
        title: "Leaking kitchen tap".to_string(),
        description: "Water drips constantly under the sink".to_string(),
        category: "plumbing".to_string(),
        priority: Priority::High,
        availability: Vec::new(),
    }
}

pub(super) fn schedule_input(days_out: i64) -> ScheduleInput {
    ScheduleInput {
        scheduled_for: Utc
            .with_ymd_and_hms(2025, 10, 14, 12, 0, 0)
            .single()
            .expect("valid time")
            + Duration::days(days_out),
        notes: Some("Ring the bell twice".to_string()),
    }
}

/// Raw token carried by the most recent email linking to `purpose`.
pub(super) fn token_in(emails: &[OutboundEmail], purpose: TokenPurpose) -> Option<String> {
    emails
        .iter()
        .rev()
        .filter_map(|email| match (&email.action, purpose) {
            (Some(ActionLink::SelectContractor(url)), TokenPurpose::SelectContractor)
            | (Some(ActionLink::ScheduleAppointment(url)), TokenPurpose::ScheduleAppointment) => {
                Some(url.clone())
            }
            _ => None,
        })
        .next()
        .and_then(|url| url.rsplit('/').next().map(str::to_string))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store whose audit writes fail while everything else works.
pub(super) struct FailingAuditStore {
    inner: Arc<InMemoryStore>,
    fail_on: Option<WorkflowStep>,
}

impl FailingAuditStore {
    /// Every audit write fails.
    pub(super) fn wrap(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            fail_on: None,
        }
    }

    /// Only audit writes for `step` fail.
    pub(super) fn failing_on(inner: Arc<InMemoryStore>, step: WorkflowStep) -> Self {
        Self {
            inner,
            fail_on: Some(step),
        }
    }
}

impl DirectoryStore for FailingAuditStore {
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        self.inner.fetch_user(id)
    }

    fn fetch_property(&self, id: PropertyId) -> Result<Option<Property>, StoreError> {
        self.inner.fetch_property(id)
    }

    fn fetch_contractor_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<ContractorProfile>, StoreError> {
        self.inner.fetch_contractor_by_user(user_id)
    }

    fn active_contractors(&self) -> Result<Vec<ContractorProfile>, StoreError> {
        self.inner.active_contractors()
    }
}

impl RequestStore for FailingAuditStore {
    fn insert_request(
        &self,
        request: NewMaintenanceRequest,
    ) -> Result<MaintenanceRequest, StoreError> {
        self.inner.insert_request(request)
    }

    fn fetch_request(&self, id: RequestId) -> Result<Option<MaintenanceRequest>, StoreError> {
        self.inner.fetch_request(id)
    }

    fn update_request(&self, request: &MaintenanceRequest) -> Result<(), StoreError> {
        self.inner.update_request(request)
    }

    fn discard_request(&self, id: RequestId) -> Result<(), StoreError> {
        self.inner.discard_request(id)
    }

    fn list_requests(&self, filter: PartyFilter) -> Result<Vec<MaintenanceRequest>, StoreError> {
        self.inner.list_requests(filter)
    }

    fn insert_schedule(&self, schedule: NewSchedule) -> Result<Schedule, StoreError> {
        self.inner.insert_schedule(schedule)
    }

    fn update_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        self.inner.update_schedule(schedule)
    }

    fn schedules_for_request(&self, id: RequestId) -> Result<Vec<Schedule>, StoreError> {
        self.inner.schedules_for_request(id)
    }

    fn list_schedules(&self, filter: PartyFilter) -> Result<Vec<Schedule>, StoreError> {
        self.inner.list_schedules(filter)
    }
}

impl AuditStore for FailingAuditStore {
    fn append_log(&self, entry: NewLogEntry) -> Result<WorkflowLogEntry, StoreError> {
        match self.fail_on {
            Some(step) if step != entry.step => self.inner.append_log(entry),
            _ => Err(StoreError::Unavailable("audit table locked".to_string())),
        }
    }

    fn logs_for_request(&self, id: RequestId) -> Result<Vec<WorkflowLogEntry>, StoreError> {
        self.inner.logs_for_request(id)
    }
}

impl NotificationStore for FailingAuditStore {
    fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        self.inner.insert_notification(notification)
    }

    fn notifications_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        self.inner.notifications_for_user(user_id, limit)
    }

    fn unread_count(&self, user_id: UserId) -> Result<usize, StoreError> {
        self.inner.unread_count(user_id)
    }

    fn mark_read(&self, id: NotificationId, user_id: UserId) -> Result<(), StoreError> {
        self.inner.mark_read(id, user_id)
    }

    fn mark_all_read(&self, user_id: UserId) -> Result<usize, StoreError> {
        self.inner.mark_all_read(user_id)
    }
}

impl TokenStore for FailingAuditStore {
    fn insert_token(&self, token: NewAccessToken) -> Result<AccessToken, StoreError> {
        self.inner.insert_token(token)
    }

    fn find_token(&self, digest: &TokenDigest) -> Result<Option<AccessToken>, StoreError> {
        self.inner.find_token(digest)
    }

    fn mark_consumed(&self, token: &AccessToken, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.mark_consumed(token, at)
    }

    fn revoke_tokens(
        &self,
        request_id: RequestId,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.inner.revoke_tokens(request_id, at)
    }
}

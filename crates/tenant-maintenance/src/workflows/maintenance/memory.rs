use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    ContractorId, ContractorProfile, LogEntryId, MaintenanceRequest, NewLogEntry,
    NewMaintenanceRequest, NewNotification, NewSchedule, Notification, NotificationId, Property,
    PropertyId, RequestId, Role, Schedule, ScheduleId, ScheduleStatus, TokenId, User, UserId,
    WorkflowLogEntry,
};
use super::repository::{
    AuditStore, DirectoryStore, NotificationStore, PartyFilter, RequestStore, StoreError,
    TokenStore,
};
use super::tokens::{AccessToken, NewAccessToken, TokenDigest};

#[derive(Default)]
struct Tables {
    next_id: u64,
    users: BTreeMap<UserId, User>,
    properties: BTreeMap<PropertyId, Property>,
    contractors: BTreeMap<ContractorId, ContractorProfile>,
    requests: BTreeMap<RequestId, MaintenanceRequest>,
    schedules: BTreeMap<ScheduleId, Schedule>,
    logs: Vec<WorkflowLogEntry>,
    notifications: BTreeMap<NotificationId, Notification>,
    tokens: Vec<AccessToken>,
}

impl Tables {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Process-local store backing the service and the test suites.
///
/// Ids come from one shared sequence, so ids of different entity kinds never collide.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    pub fn add_user(
        &self,
        name: &str,
        email: &str,
        role: Role,
        phone: Option<&str>,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        if tables
            .users
            .values()
            .any(|user| user.email.eq_ignore_ascii_case(email))
        {
            return Err(StoreError::Conflict);
        }
        let user = User {
            id: UserId(tables.allocate()),
            name: name.to_string(),
            email: email.to_string(),
            role,
            phone: phone.map(str::to_string),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    pub fn add_property(
        &self,
        address: &str,
        owner_id: UserId,
        renter_id: Option<UserId>,
        broker_id: UserId,
    ) -> Result<Property, StoreError> {
        let mut tables = self.tables()?;
        let property = Property {
            id: PropertyId(tables.allocate()),
            address: address.to_string(),
            owner_id,
            renter_id,
            broker_id,
        };
        tables.properties.insert(property.id, property.clone());
        Ok(property)
    }

    pub fn add_contractor(
        &self,
        user_id: UserId,
        company_name: &str,
        specialties: &[&str],
        rating: f32,
    ) -> Result<ContractorProfile, StoreError> {
        let mut tables = self.tables()?;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        let profile = ContractorProfile {
            id: ContractorId(tables.allocate()),
            user_id,
            company_name: company_name.to_string(),
            specialties: specialties.iter().map(|s| s.to_string()).collect(),
            rating,
            active: true,
        };
        tables.contractors.insert(profile.id, profile.clone());
        Ok(profile)
    }

    pub fn set_contractor_active(&self, id: ContractorId, active: bool) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let profile = tables.contractors.get_mut(&id).ok_or(StoreError::NotFound)?;
        profile.active = active;
        Ok(())
    }
}

fn visible_to(request: &MaintenanceRequest, filter: PartyFilter) -> bool {
    match filter.role {
        Role::Renter => request.renter_id == filter.user_id,
        Role::Owner => request.owner_id == filter.user_id,
        Role::Broker => request.broker_id == filter.user_id,
        Role::Contractor => request.contractor_id == Some(filter.user_id),
    }
}

impl DirectoryStore for InMemoryStore {
    fn fetch_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.get(&id).cloned())
    }

    fn fetch_property(&self, id: PropertyId) -> Result<Option<Property>, StoreError> {
        Ok(self.tables()?.properties.get(&id).cloned())
    }

    fn fetch_contractor_by_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<ContractorProfile>, StoreError> {
        Ok(self
            .tables()?
            .contractors
            .values()
            .find(|profile| profile.user_id == user_id)
            .cloned())
    }

    fn active_contractors(&self) -> Result<Vec<ContractorProfile>, StoreError> {
        Ok(self
            .tables()?
            .contractors
            .values()
            .filter(|profile| profile.active)
            .cloned()
            .collect())
    }
}

impl RequestStore for InMemoryStore {
    fn insert_request(
        &self,
        request: NewMaintenanceRequest,
    ) -> Result<MaintenanceRequest, StoreError> {
        let mut tables = self.tables()?;
        if !tables.properties.contains_key(&request.property_id) {
            return Err(StoreError::NotFound);
        }
        let stored = MaintenanceRequest {
            id: RequestId(tables.allocate()),
            property_id: request.property_id,
            renter_id: request.renter_id,
            owner_id: request.owner_id,
            broker_id: request.broker_id,
            contractor_id: None,
            title: request.title,
            description: request.description,
            category: request.category,
            priority: request.priority,
            status: request.status,
            availability: request.availability,
            created_at: request.created_at,
            updated_at: request.created_at,
        };
        tables.requests.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn fetch_request(&self, id: RequestId) -> Result<Option<MaintenanceRequest>, StoreError> {
        Ok(self.tables()?.requests.get(&id).cloned())
    }

    fn update_request(&self, request: &MaintenanceRequest) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let slot = tables
            .requests
            .get_mut(&request.id)
            .ok_or(StoreError::NotFound)?;
        *slot = request.clone();
        Ok(())
    }

    fn discard_request(&self, id: RequestId) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        tables
            .requests
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn list_requests(&self, filter: PartyFilter) -> Result<Vec<MaintenanceRequest>, StoreError> {
        let tables = self.tables()?;
        let mut requests: Vec<_> = tables
            .requests
            .values()
            .filter(|request| visible_to(request, filter))
            .cloned()
            .collect();
        requests.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(requests)
    }

    fn insert_schedule(&self, schedule: NewSchedule) -> Result<Schedule, StoreError> {
        let mut tables = self.tables()?;
        if !tables.requests.contains_key(&schedule.request_id) {
            return Err(StoreError::NotFound);
        }
        let stored = Schedule {
            id: ScheduleId(tables.allocate()),
            request_id: schedule.request_id,
            contractor_id: schedule.contractor_id,
            renter_id: schedule.renter_id,
            scheduled_for: schedule.scheduled_for,
            status: ScheduleStatus::Pending,
            notes: schedule.notes,
            created_at: schedule.created_at,
        };
        tables.schedules.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn update_schedule(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let slot = tables
            .schedules
            .get_mut(&schedule.id)
            .ok_or(StoreError::NotFound)?;
        *slot = schedule.clone();
        Ok(())
    }

    fn schedules_for_request(&self, id: RequestId) -> Result<Vec<Schedule>, StoreError> {
        Ok(self
            .tables()?
            .schedules
            .values()
            .filter(|schedule| schedule.request_id == id)
            .cloned()
            .collect())
    }

    fn list_schedules(&self, filter: PartyFilter) -> Result<Vec<Schedule>, StoreError> {
        let tables = self.tables()?;
        let mut schedules: Vec<_> = tables
            .schedules
            .values()
            .filter(|schedule| {
                tables
                    .requests
                    .get(&schedule.request_id)
                    .is_some_and(|request| visible_to(request, filter))
            })
            .cloned()
            .collect();
        schedules.sort_by_key(|schedule| (schedule.scheduled_for, schedule.id));
        Ok(schedules)
    }
}

impl AuditStore for InMemoryStore {
    fn append_log(&self, entry: NewLogEntry) -> Result<WorkflowLogEntry, StoreError> {
        let mut tables = self.tables()?;
        let stored = WorkflowLogEntry {
            id: LogEntryId(tables.allocate()),
            request_id: entry.request_id,
            step: entry.step,
            actor_id: entry.actor_id,
            details: entry.details,
            created_at: entry.created_at,
        };
        tables.logs.push(stored.clone());
        Ok(stored)
    }

    fn logs_for_request(&self, id: RequestId) -> Result<Vec<WorkflowLogEntry>, StoreError> {
        let tables = self.tables()?;
        let mut logs: Vec<_> = tables
            .logs
            .iter()
            .filter(|entry| entry.request_id == id)
            .cloned()
            .collect();
        logs.sort_by_key(|entry| (entry.created_at, entry.id));
        Ok(logs)
    }
}

impl NotificationStore for InMemoryStore {
    fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        let mut tables = self.tables()?;
        let stored = Notification {
            id: NotificationId(tables.allocate()),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            related_request_id: notification.related_request_id,
            read: false,
            created_at: notification.created_at,
        };
        tables.notifications.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn notifications_for_user(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        let tables = self.tables()?;
        let mut notifications: Vec<_> = tables
            .notifications
            .values()
            .filter(|notification| notification.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        notifications.truncate(limit);
        Ok(notifications)
    }

    fn unread_count(&self, user_id: UserId) -> Result<usize, StoreError> {
        Ok(self
            .tables()?
            .notifications
            .values()
            .filter(|notification| notification.user_id == user_id && !notification.read)
            .count())
    }

    fn mark_read(&self, id: NotificationId, user_id: UserId) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        match tables.notifications.get_mut(&id) {
            Some(notification) if notification.user_id == user_id => {
                notification.read = true;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    fn mark_all_read(&self, user_id: UserId) -> Result<usize, StoreError> {
        let mut tables = self.tables()?;
        let mut updated = 0;
        for notification in tables.notifications.values_mut() {
            if notification.user_id == user_id && !notification.read {
                notification.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

impl TokenStore for InMemoryStore {
    fn insert_token(&self, token: NewAccessToken) -> Result<AccessToken, StoreError> {
        let mut tables = self.tables()?;
        let stored = AccessToken {
            id: TokenId(tables.allocate()),
            request_id: token.request_id,
            purpose: token.purpose,
            digest: token.digest,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            consumed_at: None,
            revoked_at: None,
        };
        tables.tokens.push(stored.clone());
        Ok(stored)
    }

    fn find_token(&self, digest: &TokenDigest) -> Result<Option<AccessToken>, StoreError> {
        let tables = self.tables()?;
        // Every row is compared so the scan length never depends on the presented value.
        let mut found = None;
        for token in &tables.tokens {
            if token.digest.ct_eq(digest) {
                found = Some(token.clone());
            }
        }
        Ok(found)
    }

    fn mark_consumed(&self, token: &AccessToken, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let slot = tables
            .tokens
            .iter_mut()
            .find(|stored| stored.id == token.id)
            .ok_or(StoreError::NotFound)?;
        if slot.consumed_at.is_some() {
            return Err(StoreError::Conflict);
        }
        slot.consumed_at = Some(at);
        Ok(())
    }

    fn revoke_tokens(
        &self,
        request_id: RequestId,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut tables = self.tables()?;
        let mut revoked = 0;
        for token in tables.tokens.iter_mut() {
            if token.request_id == request_id
                && token.consumed_at.is_none()
                && token.revoked_at.is_none()
            {
                token.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

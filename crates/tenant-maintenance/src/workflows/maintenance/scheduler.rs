use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, Utc};

use super::domain::{MaintenanceRequest, NewSchedule, Schedule, UserId};

/// Days between contractor assignment and the default appointment.
pub const AUTO_SCHEDULE_LEAD_DAYS: i64 = 2;
/// Local hour of the default appointment.
pub const AUTO_SCHEDULE_HOUR: i64 = 10;
/// Length assumed for calendar entries.
pub const APPOINTMENT_LENGTH_MINUTES: i64 = 60;

pub const AUTO_SCHEDULE_NOTE: &str =
    "Automatically scheduled - please confirm or reschedule if needed";

/// Source of "now", carrying the local offset used for default appointment times.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Default appointment: two days out at 10:00 in the caller's local offset.
pub fn default_appointment(now: DateTime<FixedOffset>) -> DateTime<Utc> {
    let day = now.date_naive() + Duration::days(AUTO_SCHEDULE_LEAD_DAYS);
    let local = day.and_time(NaiveTime::default()) + Duration::hours(AUTO_SCHEDULE_HOUR);
    let offset = Duration::seconds(i64::from(now.offset().local_minus_utc()));
    DateTime::<Utc>::from_naive_utc_and_offset(local - offset, Utc)
}

pub fn appointment_end(start: DateTime<Utc>) -> DateTime<Utc> {
    start + Duration::minutes(APPOINTMENT_LENGTH_MINUTES)
}

/// Outcome of the automatic scheduling check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulePlan {
    Create(NewSchedule),
    /// An active schedule already exists and the automatic path leaves it alone.
    AlreadyScheduled(Schedule),
}

/// Manual booking: insert `schedule` after cancelling every row in `supersedes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebooking {
    pub schedule: NewSchedule,
    pub supersedes: Vec<Schedule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingError {
    NoContractorAssigned,
    InPast,
}

/// Assigned contractor, or the error that blocks scheduling.
pub fn assigned_contractor(request: &MaintenanceRequest) -> Result<UserId, SchedulingError> {
    request
        .contractor_id
        .ok_or(SchedulingError::NoContractorAssigned)
}

pub fn active_schedule(existing: &[Schedule]) -> Option<&Schedule> {
    existing
        .iter()
        .filter(|schedule| schedule.status.is_active())
        .max_by_key(|schedule| (schedule.created_at, schedule.id))
}

/// System initiated scheduling. Idempotent: any active schedule wins.
pub fn plan_automatic(
    request: &MaintenanceRequest,
    existing: &[Schedule],
    now: DateTime<FixedOffset>,
) -> Result<SchedulePlan, SchedulingError> {
    let contractor_id = assigned_contractor(request)?;
    if let Some(active) = active_schedule(existing) {
        return Ok(SchedulePlan::AlreadyScheduled(active.clone()));
    }

    Ok(SchedulePlan::Create(NewSchedule {
        request_id: request.id,
        contractor_id,
        renter_id: request.renter_id,
        scheduled_for: default_appointment(now),
        notes: AUTO_SCHEDULE_NOTE.to_string(),
        created_at: now.with_timezone(&Utc),
    }))
}

/// Broker or contractor supplied time. Reschedules by superseding every active schedule.
pub fn plan_manual(
    request: &MaintenanceRequest,
    existing: &[Schedule],
    scheduled_for: DateTime<Utc>,
    notes: String,
    now: DateTime<Utc>,
) -> Result<Rebooking, SchedulingError> {
    let contractor_id = assigned_contractor(request)?;
    if scheduled_for <= now {
        return Err(SchedulingError::InPast);
    }

    let supersedes = existing
        .iter()
        .filter(|schedule| schedule.status.is_active())
        .cloned()
        .collect();

    Ok(Rebooking {
        schedule: NewSchedule {
            request_id: request.id,
            contractor_id,
            renter_id: request.renter_id,
            scheduled_for,
            notes,
            created_at: now,
        },
        supersedes,
    })
}

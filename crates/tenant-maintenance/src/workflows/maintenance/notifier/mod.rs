//! In-app notifications plus best-effort email.
//!
//! The in-app row is written first and synchronously. Email is rendered on the caller's thread
//! and handed to the [`MailQueue`]; nothing about delivery can fail the workflow step that
//! triggered it.

pub mod links;
pub mod mailer;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::domain::{
    MaintenanceRequest, NewNotification, Notification, NotificationKind, Schedule, User, UserId,
};
use super::repository::{latest_schedule, MaintenanceStore, StoreError};
use super::tokens::IssuedToken;
pub use links::{ActionLink, CalendarLinks};
pub use mailer::{
    DeliveryError, LogOnlyMailer, MailQueue, MailTransport, MailWorker, OutboundEmail, SmtpMailer,
};

/// A message for one recipient about one request.
#[derive(Debug, Clone)]
pub struct Notice<'a> {
    pub recipient: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub request: Option<&'a MaintenanceRequest>,
    /// Raw token to embed when the recipient is the party it was issued for.
    pub token: Option<&'a IssuedToken>,
}

impl<'a> Notice<'a> {
    pub fn about(
        request: &'a MaintenanceRequest,
        recipient: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            kind,
            title: title.into(),
            message: message.into(),
            request: Some(request),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &'a IssuedToken) -> Self {
        self.token = Some(token);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationDeliveryFailure {
    #[error("in-app notification not stored: {0}")]
    InApp(StoreError),
    #[error("recipient lookup failed: {0}")]
    Recipient(StoreError),
    #[error("appointment context unavailable: {0}")]
    Appointment(String),
}

pub struct Notifier<S> {
    store: Arc<S>,
    public_url: String,
    mail: Option<MailQueue>,
}

impl<S> Notifier<S>
where
    S: MaintenanceStore + 'static,
{
    pub fn new(store: Arc<S>, public_url: impl Into<String>, mail: Option<MailQueue>) -> Self {
        Self {
            store,
            public_url: public_url.into(),
            mail,
        }
    }

    /// Store the in-app notification, then queue the email. Failures are logged and absorbed.
    pub fn notify(&self, notice: Notice<'_>, now: DateTime<Utc>) -> Option<Notification> {
        let stored = match self.store_in_app(&notice, now) {
            Ok(stored) => Some(stored),
            Err(err) => {
                warn!(
                    recipient = %notice.recipient,
                    kind = notice.kind.as_str(),
                    error = %err,
                    "notification dropped"
                );
                None
            }
        };

        if let Some(queue) = &self.mail {
            match self.render_email(&notice) {
                Ok(Some(email)) => {
                    if !queue.enqueue(email) {
                        warn!(
                            recipient = %notice.recipient,
                            "mail worker unavailable; email dropped"
                        );
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(
                    recipient = %notice.recipient,
                    kind = notice.kind.as_str(),
                    error = %err,
                    "email not queued"
                ),
            }
        }

        stored
    }

    fn store_in_app(
        &self,
        notice: &Notice<'_>,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotificationDeliveryFailure> {
        self.store
            .insert_notification(NewNotification {
                user_id: notice.recipient,
                kind: notice.kind,
                title: notice.title.clone(),
                message: notice.message.clone(),
                related_request_id: notice.request.map(|request| request.id),
                created_at: now,
            })
            .map_err(NotificationDeliveryFailure::InApp)
    }

    /// Build the outbound email, or `None` for an unknown recipient.
    pub fn render_email(
        &self,
        notice: &Notice<'_>,
    ) -> Result<Option<OutboundEmail>, NotificationDeliveryFailure> {
        let Some(recipient) = self
            .store
            .fetch_user(notice.recipient)
            .map_err(NotificationDeliveryFailure::Recipient)?
        else {
            debug!(recipient = %notice.recipient, "no user record; skipping email");
            return Ok(None);
        };

        let action = notice.request.map(|request| {
            ActionLink::resolve(
                &self.public_url,
                request,
                request.party_role(recipient.id),
                notice.token,
            )
        });

        let calendar = match notice.request {
            Some(request) if notice.kind.announces_appointment() => {
                self.calendar_links(request)?
            }
            _ => None,
        };

        Ok(Some(compose(&recipient, notice, action, calendar)))
    }

    fn calendar_links(
        &self,
        request: &MaintenanceRequest,
    ) -> Result<Option<CalendarLinks>, NotificationDeliveryFailure> {
        let schedules = self
            .store
            .schedules_for_request(request.id)
            .map_err(|err| NotificationDeliveryFailure::Appointment(err.to_string()))?;
        let Some(schedule) = latest_schedule(&schedules) else {
            return Ok(None);
        };

        let address = self
            .store
            .fetch_property(request.property_id)
            .map_err(|err| NotificationDeliveryFailure::Appointment(err.to_string()))?
            .map(|property| property.address)
            .unwrap_or_default();

        appointment_links(request, schedule, &address)
            .map(Some)
            .map_err(|err| NotificationDeliveryFailure::Appointment(err.to_string()))
    }
}

fn appointment_links(
    request: &MaintenanceRequest,
    schedule: &Schedule,
    address: &str,
) -> Result<CalendarLinks, url::ParseError> {
    let title = format!("Maintenance: {}", request.title);
    let details = if schedule.notes.is_empty() {
        request.description.clone()
    } else {
        format!("{}\n\n{}", request.description, schedule.notes)
    };
    CalendarLinks::for_appointment(&title, &details, address, schedule.scheduled_for)
}

fn compose(
    recipient: &User,
    notice: &Notice<'_>,
    action: Option<ActionLink>,
    calendar: Option<CalendarLinks>,
) -> OutboundEmail {
    OutboundEmail {
        to: recipient.email.clone(),
        recipient_name: recipient.name.clone(),
        kind: notice.kind,
        subject: notice.title.clone(),
        message: notice.message.clone(),
        request_id: notice.request.map(|request| request.id),
        action,
        calendar,
    }
}

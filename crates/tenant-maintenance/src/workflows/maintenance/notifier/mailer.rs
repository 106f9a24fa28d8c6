use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::links::{ActionLink, CalendarLinks};
use crate::config::MailConfig;
use crate::workflows::maintenance::domain::{NotificationKind, RequestId};

/// Fully rendered message waiting for out-of-band delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub recipient_name: String,
    pub kind: NotificationKind,
    pub subject: String,
    pub message: String,
    pub request_id: Option<RequestId>,
    pub action: Option<ActionLink>,
    pub calendar: Option<CalendarLinks>,
}

impl OutboundEmail {
    pub fn text_body(&self) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "Hello {},", self.recipient_name);
        body.push('\n');
        let _ = writeln!(body, "{}", self.message);

        if let Some(action) = &self.action {
            body.push('\n');
            let _ = writeln!(body, "{}: {}", action.label(), action.url());
        }

        if let Some(calendar) = &self.calendar {
            body.push('\n');
            let _ = writeln!(body, "Add to Google Calendar: {}", calendar.google);
            let _ = writeln!(body, "Add to Outlook: {}", calendar.outlook);
        }

        body
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("invalid mailbox '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("unable to build message: {0}")]
    Build(String),
    #[error("mail transport failed: {0}")]
    Transport(String),
}

/// Out-of-band delivery channel.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), DeliveryError>;
}

/// Used when no SMTP relay is configured: records what would have been sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyMailer;

#[async_trait]
impl MailTransport for LogOnlyMailer {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        info!(
            to = %email.to,
            kind = email.kind.as_str(),
            subject = %email.subject,
            "smtp not configured; email logged only"
        );
        Ok(())
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, DeliveryError> {
        let from = parse_mailbox(&config.from)?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|err| DeliveryError::Transport(err.to_string()))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, DeliveryError> {
    raw.parse::<Mailbox>()
        .map_err(|err| DeliveryError::Address {
            address: raw.to_string(),
            reason: err.to_string(),
        })
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), DeliveryError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&email.to)?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.text_body())
            .map_err(|err| DeliveryError::Build(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;
        Ok(())
    }
}

/// Producer side of the outbound mail queue. Enqueueing never blocks.
#[derive(Debug, Clone)]
pub struct MailQueue {
    sender: mpsc::UnboundedSender<OutboundEmail>,
}

impl MailQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEmail>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Returns `false` when the worker is gone and the message was dropped.
    pub fn enqueue(&self, email: OutboundEmail) -> bool {
        self.sender.send(email).is_ok()
    }
}

/// Drains the mail queue on its own task; delivery failures are logged and dropped.
pub struct MailWorker;

impl MailWorker {
    pub fn spawn(
        mut receiver: mpsc::UnboundedReceiver<OutboundEmail>,
        transport: Arc<dyn MailTransport>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(email) = receiver.recv().await {
                match transport.deliver(&email).await {
                    Ok(()) => debug!(to = %email.to, kind = email.kind.as_str(), "email delivered"),
                    Err(err) => warn!(
                        to = %email.to,
                        kind = email.kind.as_str(),
                        error = %err,
                        "email delivery failed"
                    ),
                }
            }
            debug!("mail queue closed; worker exiting");
        })
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::workflows::maintenance::domain::{MaintenanceRequest, Role};
use crate::workflows::maintenance::scheduler::appointment_end;
use crate::workflows::maintenance::tokens::{IssuedToken, TokenPurpose};

/// Call to action attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum ActionLink {
    SelectContractor(String),
    ScheduleAppointment(String),
    ViewRequest(String),
}

impl ActionLink {
    /// Choose the link for `recipient_role` given the request as it stands now.
    ///
    /// Token links are only offered to the party the token is meant for and only while the
    /// request sits in the stage the token unlocks; everybody else gets the authenticated view.
    pub fn resolve(
        public_url: &str,
        request: &MaintenanceRequest,
        recipient_role: Option<Role>,
        token: Option<&IssuedToken>,
    ) -> Self {
        let live = token.filter(|token| token.purpose.unlocks_in(request.status));
        match (recipient_role, live) {
            (Some(Role::Owner), Some(token)) if token.purpose == TokenPurpose::SelectContractor => {
                Self::SelectContractor(token.url(public_url))
            }
            (Some(Role::Contractor), Some(token))
                if token.purpose == TokenPurpose::ScheduleAppointment =>
            {
                Self::ScheduleAppointment(token.url(public_url))
            }
            _ => Self::ViewRequest(format!("{public_url}/requests/{}", request.id)),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::SelectContractor(url)
            | Self::ScheduleAppointment(url)
            | Self::ViewRequest(url) => url,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::SelectContractor(_) => "Select a contractor",
            Self::ScheduleAppointment(_) => "Schedule the appointment",
            Self::ViewRequest(_) => "View request",
        }
    }
}

/// "Add to calendar" deep links for an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarLinks {
    pub google: String,
    pub outlook: String,
}

impl CalendarLinks {
    pub fn for_appointment(
        title: &str,
        details: &str,
        address: &str,
        start: DateTime<Utc>,
    ) -> Result<Self, url::ParseError> {
        let end = appointment_end(start);
        let google_dates = format!(
            "{}/{}",
            start.format("%Y%m%dT%H%M%SZ"),
            end.format("%Y%m%dT%H%M%SZ")
        );
        let google = Url::parse_with_params(
            "https://calendar.google.com/calendar/render",
            &[
                ("action", "TEMPLATE"),
                ("text", title),
                ("dates", google_dates.as_str()),
                ("details", details),
                ("location", address),
            ],
        )?;

        let start_iso = start.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let end_iso = end.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let outlook = Url::parse_with_params(
            "https://outlook.live.com/calendar/0/deeplink/compose",
            &[
                ("path", "/calendar/action/compose"),
                ("rru", "addevent"),
                ("subject", title),
                ("startdt", start_iso.as_str()),
                ("enddt", end_iso.as_str()),
                ("body", details),
                ("location", address),
            ],
        )?;

        Ok(Self {
            google: google.into(),
            outlook: outlook.into(),
        })
    }
}

use super::common::*;
use std::sync::Arc;

use crate::workflows::maintenance::domain::{NotificationKind, UserId};
use crate::workflows::maintenance::notifier::{ActionLink, MailQueue, Notice, Notifier};
use crate::workflows::maintenance::repository::NotificationStore;
use crate::workflows::maintenance::service::MaintenanceWorkflowService;

#[test]
fn appointment_emails_carry_calendar_links() {
    let mut harness = build_service(automatic());
    let parties = &harness.parties;
    harness
        .service
        .create_request(parties.renter.id, plumbing_request(parties.property.id))
        .expect("request created");

    let emails = harness.drain_emails();
    let renter_mail = emails
        .iter()
        .find(|email| {
            email.to == "renter@demo.com" && email.kind == NotificationKind::AppointmentScheduled
        })
        .expect("renter hears about the appointment");
    let calendar = renter_mail.calendar.as_ref().expect("calendar links");
    assert!(calendar
        .google
        .contains("dates=20251016T080000Z%2F20251016T090000Z"));
    assert!(calendar
        .google
        .contains("location=Omlooptstraat+2B%2C+8900+Ieper"));
    assert!(calendar.outlook.contains("startdt=2025-10-16T08%3A00%3A00Z"));
    assert!(matches!(renter_mail.action, Some(ActionLink::ViewRequest(_))));

    let broker_mail = emails
        .iter()
        .find(|email| {
            email.to == "broker@partners-vastgoed.com"
                && email.kind == NotificationKind::AppointmentAutoScheduled
        })
        .expect("broker hears about the automatic booking");
    assert!(broker_mail.calendar.is_some());
}

#[test]
fn action_links_follow_recipient_and_stage() {
    let mut harness = build_service(staged());
    let parties = &harness.parties;
    let request = harness
        .service
        .create_request(parties.renter.id, plumbing_request(parties.property.id))
        .expect("request created");
    harness
        .service
        .notify_owner(parties.broker.id, request.id)
        .expect("owner notified");

    let emails = harness.drain_emails();
    let broker_mail = emails
        .iter()
        .find(|email| email.to == "broker@partners-vastgoed.com")
        .expect("broker email");
    assert_eq!(
        broker_mail.action,
        Some(ActionLink::ViewRequest(format!(
            "https://portal.example.com/requests/{}",
            request.id
        )))
    );
    assert!(broker_mail.calendar.is_none());

    let owner_mail = emails
        .iter()
        .find(|email| email.to == "owner@demo.com")
        .expect("owner email");
    match &owner_mail.action {
        Some(ActionLink::SelectContractor(url)) => {
            assert!(url.starts_with("https://portal.example.com/select-contractor/"));
            assert!(owner_mail.text_body().contains(url.as_str()));
        }
        other => panic!("expected selection link, got {other:?}"),
    }
}

#[test]
fn closed_mail_queue_does_not_affect_the_workflow() {
    let (store, parties) = seeded_store();
    let (queue, receiver) = MailQueue::channel();
    drop(receiver);
    let service = MaintenanceWorkflowService::with_clock(
        store.clone(),
        automatic(),
        Some(queue),
        Arc::new(TestClock::new()),
    );

    let request = service
        .create_request(parties.renter.id, plumbing_request(parties.property.id))
        .expect("workflow succeeds without mail");

    let inbox = store
        .notifications_for_user(parties.broker.id, 10)
        .expect("broker notifications");
    assert!(inbox
        .iter()
        .any(|n| n.related_request_id == Some(request.id)));
}

#[test]
fn unknown_recipients_get_no_email_but_keep_the_in_app_row() {
    let (store, _) = seeded_store();
    let (queue, mut receiver) = MailQueue::channel();
    let notifier = Notifier::new(store.clone(), "https://portal.example.com", Some(queue));

    let notice = Notice {
        recipient: UserId(9_999),
        kind: NotificationKind::StatusChanged,
        title: "Heads up".to_string(),
        message: "Nothing to see".to_string(),
        request: None,
        token: None,
    };

    assert!(matches!(notifier.render_email(&notice), Ok(None)));
    let stored = notifier
        .notify(notice, TestClock::new().utc())
        .expect("in-app row stored");
    assert_eq!(stored.user_id, UserId(9_999));
    assert!(receiver.try_recv().is_err());
}

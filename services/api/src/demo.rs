use crate::infra::{seed_demo_data, DemoParties};
use clap::Args;
use std::sync::Arc;
use tenant_maintenance::config::WorkflowConfig;
use tenant_maintenance::error::AppError;
use tenant_maintenance::workflows::maintenance::{
    CreateRequestInput, InMemoryStore, MaintenanceWorkflowService, Priority, RequestDetailView,
    RequestId, RequestStatus, WorkflowError,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Stop after intake and let the broker and owner drive each step
    #[arg(long)]
    pub(crate) staged: bool,
    /// Category reported by the renter
    #[arg(long, default_value = "plumbing")]
    pub(crate) category: String,
    /// Carry the request through to completion
    #[arg(long)]
    pub(crate) complete: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = if args.staged {
        WorkflowConfig::staged()
    } else {
        WorkflowConfig::automatic()
    };

    let store = Arc::new(InMemoryStore::new());
    let parties = seed_demo_data(&store).map_err(WorkflowError::from)?;
    let service = MaintenanceWorkflowService::new(store, config, None);

    println!("Maintenance workflow demo");
    println!(
        "  property: {} (broker {}, owner {})",
        parties.property.address, parties.broker.name, parties.owner.name
    );

    let request = service.create_request(
        parties.renter.id,
        CreateRequestInput {
            property_id: parties.property.id,
            title: "Leaking kitchen tap".to_string(),
            description: "Water drips constantly under the sink".to_string(),
            category: args.category.clone(),
            priority: Priority::High,
            availability: Vec::new(),
        },
    )?;
    println!(
        "\nRenter {} reported '{}' ({})",
        parties.renter.name, request.title, request.category
    );
    print_status(&service, &parties, request.id)?;

    if args.staged {
        service.notify_owner(parties.broker.id, request.id)?;
        println!("\nBroker forwarded the request to the owner");
        print_status(&service, &parties, request.id)?;

        let outcome =
            service.select_contractor(parties.owner.id, request.id, parties.contractor.id)?;
        println!(
            "\nOwner selected {} ({})",
            parties.contractor.name, outcome.request.status
        );
        print_status(&service, &parties, request.id)?;
    }

    if args.complete {
        let detail = service.request_detail(parties.broker.id, request.id)?;
        if detail.request.status == RequestStatus::Scheduled {
            let worker = detail.request.contractor_id.unwrap_or(parties.broker.id);
            service.update_status(worker, request.id, RequestStatus::InProgress)?;
            service.update_status(worker, request.id, RequestStatus::Completed)?;
            println!("\nContractor finished the job");
            print_status(&service, &parties, request.id)?;
        } else {
            println!(
                "\nRequest is {}; nothing to complete yet",
                detail.request.status
            );
        }
    }

    let detail = service.request_detail(parties.broker.id, request.id)?;
    print_audit_trail(&detail);

    println!("\nUnread notifications");
    for (label, user) in [
        ("renter", &parties.renter),
        ("owner", &parties.owner),
        ("broker", &parties.broker),
        ("contractor", &parties.contractor),
    ] {
        println!("  {:<11} {}", label, service.unread_count(user.id)?);
    }

    Ok(())
}

fn print_status(
    service: &MaintenanceWorkflowService<InMemoryStore>,
    parties: &DemoParties,
    request_id: RequestId,
) -> Result<(), WorkflowError> {
    let detail = service.request_detail(parties.broker.id, request_id)?;
    println!("  status: {}", detail.request.status);
    if let Some(contractor) = &detail.contractor {
        println!("  contractor: {}", contractor.name);
    }
    if let Some(schedule) = &detail.latest_schedule {
        println!(
            "  appointment: {} ({:?})",
            schedule.scheduled_for.format("%Y-%m-%d %H:%M UTC"),
            schedule.status
        );
    }
    Ok(())
}

fn print_audit_trail(detail: &RequestDetailView) {
    println!("\nAudit trail for request #{}", detail.request.id);
    for entry in &detail.workflow_log {
        let actor = entry
            .actor_id
            .map(|id| format!("user {id}"))
            .unwrap_or_else(|| "system".to_string());
        println!(
            "  {} {:<28} {:<10} {}",
            entry.created_at.format("%H:%M:%S"),
            entry.step.as_str(),
            actor,
            entry.details
        );
    }
}

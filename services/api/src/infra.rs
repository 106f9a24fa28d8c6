use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tenant_maintenance::workflows::maintenance::{
    InMemoryStore, Property, Role, StoreError, User,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Accounts and property loaded by `--seed-demo` and the CLI demo.
#[derive(Debug, Clone)]
pub(crate) struct DemoParties {
    pub(crate) broker: User,
    pub(crate) owner: User,
    pub(crate) renter: User,
    pub(crate) contractor: User,
    pub(crate) property: Property,
}

pub(crate) const DEMO_SPECIALTIES: [&str; 5] =
    ["plumbing", "electrical", "heating", "structural", "appliances"];

pub(crate) fn seed_demo_data(store: &InMemoryStore) -> Result<DemoParties, StoreError> {
    let broker = store.add_user(
        "Partners & Vastgoed",
        "broker@partners-vastgoed.com",
        Role::Broker,
        Some("+32 57 20 00 00"),
    )?;
    let owner = store.add_user(
        "Jean Pierre Callant",
        "owner@demo.com",
        Role::Owner,
        None,
    )?;
    let renter = store.add_user(
        "Michael Vander Haegen",
        "renter@demo.com",
        Role::Renter,
        None,
    )?;
    let contractor = store.add_user(
        "MVH - All round works",
        "contractor@demo.com",
        Role::Contractor,
        None,
    )?;
    store.add_contractor(
        contractor.id,
        "MVH - All round works",
        &DEMO_SPECIALTIES,
        4.5,
    )?;
    let property = store.add_property(
        "Omlooptstraat 2B, 8900 Ieper",
        owner.id,
        Some(renter.id),
        broker.id,
    )?;

    Ok(DemoParties {
        broker,
        owner,
        renter,
        contractor,
        property,
    })
}

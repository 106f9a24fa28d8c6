use crate::cli::ServeArgs;
use crate::infra::{seed_demo_data, AppState};
use crate::routes::with_maintenance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tenant_maintenance::config::AppConfig;
use tenant_maintenance::error::AppError;
use tenant_maintenance::telemetry;
use tenant_maintenance::workflows::maintenance::{
    InMemoryStore, LogOnlyMailer, MailQueue, MailTransport, MailWorker,
    MaintenanceWorkflowService, SmtpMailer, WorkflowError,
};
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let transport: Arc<dyn MailTransport> = match config.mail.as_ref() {
        Some(mail) => match SmtpMailer::from_config(mail) {
            Ok(mailer) => {
                info!(host = %mail.host, port = mail.port, "smtp relay configured");
                Arc::new(mailer)
            }
            Err(err) => {
                warn!(error = %err, "smtp relay unusable; emails will be logged only");
                Arc::new(LogOnlyMailer)
            }
        },
        None => Arc::new(LogOnlyMailer),
    };
    let (mail_queue, mail_receiver) = MailQueue::channel();
    MailWorker::spawn(mail_receiver, transport);

    let store = Arc::new(InMemoryStore::new());
    if args.seed_demo {
        let parties = seed_demo_data(&store).map_err(WorkflowError::from)?;
        info!(
            property = %parties.property.address,
            renter = %parties.renter.id,
            broker = %parties.broker.id,
            "demo data seeded"
        );
    }

    let service = Arc::new(MaintenanceWorkflowService::new(
        store,
        config.workflow.clone(),
        Some(mail_queue),
    ));

    let app = with_maintenance_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        mode = ?config.workflow.mode,
        "maintenance workflow engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{NotificationId, RequestId, RequestStatus, UserId};
use super::repository::MaintenanceStore;
use super::service::{
    CreateRequestInput, ErrorKind, MaintenanceWorkflowService, ScheduleInput, WorkflowError,
};
use super::tokens::TokenPurpose;

/// Header carrying the authenticated caller, set by the upstream auth layer.
pub const CALLER_HEADER: &str = "x-user-id";

/// Authenticated caller taken from [`CALLER_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub UserId);

#[axum::async_trait]
impl<St> FromRequestParts<St> for Caller
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(|id| Caller(UserId(id)))
            .ok_or_else(|| {
                let payload = json!({ "error": "missing or invalid caller identity" });
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContractorChoice {
    contractor_id: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChange {
    status: RequestStatus,
}

type SharedService<S> = State<Arc<MaintenanceWorkflowService<S>>>;

/// Router builder exposing the maintenance workflow over HTTP.
pub fn maintenance_router<S>(service: Arc<MaintenanceWorkflowService<S>>) -> Router
where
    S: MaintenanceStore + 'static,
{
    Router::new()
        .route(
            "/api/maintenance",
            post(create_handler::<S>).get(list_handler::<S>),
        )
        .route("/api/maintenance/:request_id", get(detail_handler::<S>))
        .route(
            "/api/maintenance/:request_id/notify-owner",
            post(notify_owner_handler::<S>),
        )
        .route(
            "/api/maintenance/:request_id/select-contractor",
            post(select_handler::<S>),
        )
        .route(
            "/api/maintenance/:request_id/schedule",
            post(schedule_handler::<S>),
        )
        .route(
            "/api/maintenance/:request_id/status",
            patch(status_handler::<S>),
        )
        .route(
            "/select-contractor/:token",
            get(select_link_handler::<S>).post(select_with_token_handler::<S>),
        )
        .route(
            "/schedule-appointment/:token",
            get(schedule_link_handler::<S>).post(schedule_with_token_handler::<S>),
        )
        .route("/api/contractors", get(contractors_handler::<S>))
        .route("/api/schedule", get(schedules_handler::<S>))
        .route("/api/notifications", get(notifications_handler::<S>))
        .route(
            "/api/notifications/unread-count",
            get(unread_count_handler::<S>),
        )
        .route(
            "/api/notifications/read-all",
            patch(read_all_handler::<S>),
        )
        .route(
            "/api/notifications/:notification_id/read",
            patch(mark_read_handler::<S>),
        )
        .with_state(service)
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::InvalidOrExpiredToken => StatusCode::GONE,
            ErrorKind::NoContractorAssigned => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidTransition => StatusCode::CONFLICT,
            ErrorKind::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::PersistenceFailure => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "maintenance workflow failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub(crate) async fn create_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
    Json(input): Json<CreateRequestInput>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.create_request(caller, input) {
        Ok(request) => {
            let payload = json!({
                "message": "Maintenance request created successfully",
                "id": request.id,
                "status": request.status,
                "request": request,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.list_requests(caller) {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn detail_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
    Path(request_id): Path<u64>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.request_detail(caller, RequestId(request_id)) {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn notify_owner_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
    Path(request_id): Path<u64>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.notify_owner(caller, RequestId(request_id)) {
        Ok(request) => {
            let payload = json!({
                "message": "Owner notified successfully",
                "status": request.status,
                "request": request,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn select_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
    Path(request_id): Path<u64>,
    Json(choice): Json<ContractorChoice>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.select_contractor(caller, RequestId(request_id), choice.contractor_id) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn schedule_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
    Path(request_id): Path<u64>,
    Json(input): Json<ScheduleInput>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.schedule_appointment(caller, RequestId(request_id), input) {
        Ok(schedule) => (StatusCode::CREATED, Json(schedule)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
    Path(request_id): Path<u64>,
    Json(change): Json<StatusChange>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.update_status(caller, RequestId(request_id), change.status) {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn select_link_handler<S>(
    State(service): SharedService<S>,
    Path(token): Path<String>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.token_context(&token, TokenPurpose::SelectContractor) {
        Ok(context) => (StatusCode::OK, Json(context)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn select_with_token_handler<S>(
    State(service): SharedService<S>,
    Path(token): Path<String>,
    Json(choice): Json<ContractorChoice>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.select_contractor_with_token(&token, choice.contractor_id) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn schedule_link_handler<S>(
    State(service): SharedService<S>,
    Path(token): Path<String>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.token_context(&token, TokenPurpose::ScheduleAppointment) {
        Ok(context) => (StatusCode::OK, Json(context)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn schedule_with_token_handler<S>(
    State(service): SharedService<S>,
    Path(token): Path<String>,
    Json(input): Json<ScheduleInput>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.schedule_appointment_with_token(&token, input) {
        Ok(schedule) => (StatusCode::CREATED, Json(schedule)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn contractors_handler<S>(
    State(service): SharedService<S>,
    Caller(_caller): Caller,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.list_contractors() {
        Ok(contractors) => (StatusCode::OK, Json(contractors)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn schedules_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.list_schedules(caller) {
        Ok(schedules) => (StatusCode::OK, Json(schedules)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn notifications_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.notifications(caller) {
        Ok(notifications) => (StatusCode::OK, Json(notifications)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn unread_count_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.unread_count(caller) {
        Ok(count) => (StatusCode::OK, Json(json!({ "count": count }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn mark_read_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
    Path(notification_id): Path<u64>,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.mark_read(caller, NotificationId(notification_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn read_all_handler<S>(
    State(service): SharedService<S>,
    Caller(caller): Caller,
) -> Response
where
    S: MaintenanceStore + 'static,
{
    match service.mark_all_read(caller) {
        Ok(updated) => (StatusCode::OK, Json(json!({ "updated": updated }))).into_response(),
        Err(err) => err.into_response(),
    }
}

//! Delivery queue handlers: enqueue plus the operator queue view.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use uuid::Uuid;

use crate::api::doc::DELIVERY_TAG;
use crate::api::dto::{
    DeliveryJobResponse, EnqueueRequest, ErrorResponse, ListDeliveriesQuery, ReasonRequest,
};
use crate::error::AppResult;
use crate::services::QueueStats;
use crate::state::AppState;
use crate::utils::validate::{ValidatedJson, ValidatedQuery};

pub fn delivery_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_deliveries, enqueue_delivery))
        .routes(routes!(queue_stats))
        .routes(routes!(get_delivery))
        .routes(routes!(retry_delivery))
        .routes(routes!(force_fail_delivery))
        .routes(routes!(skip_delivery))
}

/// GET /api/deliveries - List jobs, newest first
#[utoipa::path(
    get,
    path = "/",
    tag = DELIVERY_TAG,
    params(ListDeliveriesQuery),
    responses(
        (status = 200, description = "Matching delivery jobs", body = Vec<DeliveryJobResponse>),
        (status = 400, description = "Invalid filter", body = ErrorResponse)
    )
)]
async fn list_deliveries(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ListDeliveriesQuery>,
) -> AppResult<Json<Vec<DeliveryJobResponse>>> {
    let jobs = state.services.queue.list(&query.into()).await?;
    Ok(Json(jobs.into_iter().map(DeliveryJobResponse::from).collect()))
}

/// POST /api/deliveries - Enqueue a delivery
#[utoipa::path(
    post,
    path = "/",
    tag = DELIVERY_TAG,
    request_body = EnqueueRequest,
    responses(
        (status = 201, description = "Job created in READY", body = DeliveryJobResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
async fn enqueue_delivery(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EnqueueRequest>,
) -> AppResult<(StatusCode, Json<DeliveryJobResponse>)> {
    let job = state.services.queue.enqueue(req.into_new_job()?).await?;
    Ok((StatusCode::CREATED, Json(DeliveryJobResponse::from(job))))
}

/// GET /api/deliveries/stats - Job counts per status
#[utoipa::path(
    get,
    path = "/stats",
    tag = DELIVERY_TAG,
    responses(
        (status = 200, description = "Counts per status", body = QueueStats)
    )
)]
async fn queue_stats(State(state): State<AppState>) -> AppResult<Json<QueueStats>> {
    Ok(Json(state.services.queue.stats().await?))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = DELIVERY_TAG,
    params(("id" = Uuid, Path, description = "Delivery job id")),
    responses(
        (status = 200, description = "Job found", body = DeliveryJobResponse),
        (status = 404, description = "Job not found", body = ErrorResponse)
    )
)]
async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeliveryJobResponse>> {
    let job = state.services.queue.get(id).await?;
    Ok(Json(DeliveryJobResponse::from(job)))
}

/// POST /api/deliveries/{id}/retry - FAILED or SKIPPED back to READY
#[utoipa::path(
    post,
    path = "/{id}/retry",
    tag = DELIVERY_TAG,
    params(("id" = Uuid, Path, description = "Delivery job id")),
    responses(
        (status = 200, description = "Job requeued", body = DeliveryJobResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job is not FAILED or SKIPPED", body = ErrorResponse)
    )
)]
async fn retry_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeliveryJobResponse>> {
    let job = state.services.queue.retry(id).await?;
    Ok(Json(DeliveryJobResponse::from(job)))
}

/// POST /api/deliveries/{id}/force-fail - Stop a job with a recorded reason
#[utoipa::path(
    post,
    path = "/{id}/force-fail",
    tag = DELIVERY_TAG,
    params(("id" = Uuid, Path, description = "Delivery job id")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Job moved to FAILED", body = DeliveryJobResponse),
        (status = 400, description = "Blank reason", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job is already terminal", body = ErrorResponse)
    )
)]
async fn force_fail_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ReasonRequest>,
) -> AppResult<Json<DeliveryJobResponse>> {
    let job = state.services.queue.force_fail(id, &req.reason).await?;
    Ok(Json(DeliveryJobResponse::from(job)))
}

/// POST /api/deliveries/{id}/skip - Withdraw a job with a recorded reason
#[utoipa::path(
    post,
    path = "/{id}/skip",
    tag = DELIVERY_TAG,
    params(("id" = Uuid, Path, description = "Delivery job id")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Job moved to SKIPPED", body = DeliveryJobResponse),
        (status = 400, description = "Blank reason", body = ErrorResponse),
        (status = 404, description = "Job not found", body = ErrorResponse),
        (status = 409, description = "Job is already terminal", body = ErrorResponse)
    )
)]
async fn skip_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ReasonRequest>,
) -> AppResult<Json<DeliveryJobResponse>> {
    let job = state.services.queue.skip(id, &req.reason).await?;
    Ok(Json(DeliveryJobResponse::from(job)))
}

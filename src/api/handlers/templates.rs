//! Authority template registration and dry-run preview.

use axum::{
    Json,
    extract::{Path, State},
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::api::doc::TEMPLATE_TAG;
use crate::api::dto::{
    ErrorResponse, PreviewRequest, PreviewResponse, TemplateRequest, TemplateResponse,
};
use crate::error::AppResult;
use crate::state::AppState;
use crate::utils::validate::ValidatedJson;

pub fn template_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_templates))
        .routes(routes!(get_template, put_template))
        .routes(routes!(preview_template))
}

#[utoipa::path(
    get,
    path = "/",
    tag = TEMPLATE_TAG,
    responses(
        (status = 200, description = "All templates ordered by key", body = Vec<TemplateResponse>)
    )
)]
async fn list_templates(State(state): State<AppState>) -> AppResult<Json<Vec<TemplateResponse>>> {
    let templates = state.services.templates.list().await?;
    Ok(Json(templates.into_iter().map(TemplateResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/{key}",
    tag = TEMPLATE_TAG,
    params(("key" = String, Path, description = "Template key")),
    responses(
        (status = 200, description = "Template found", body = TemplateResponse),
        (status = 404, description = "Template not found", body = ErrorResponse)
    )
)]
async fn get_template(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<TemplateResponse>> {
    let template = state.services.templates.get(&key).await?;
    Ok(Json(TemplateResponse::from(template)))
}

/// PUT /api/templates/{key} - Create or replace a template
#[utoipa::path(
    put,
    path = "/{key}",
    tag = TEMPLATE_TAG,
    params(("key" = String, Path, description = "Template key")),
    request_body = TemplateRequest,
    responses(
        (status = 200, description = "Template saved", body = TemplateResponse),
        (status = 400, description = "Invalid template", body = ErrorResponse)
    )
)]
async fn put_template(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ValidatedJson(req): ValidatedJson<TemplateRequest>,
) -> AppResult<Json<TemplateResponse>> {
    let template = state
        .services
        .templates
        .upsert(req.into_template(key))
        .await?;
    Ok(Json(TemplateResponse::from(template)))
}

/// POST /api/templates/{key}/preview - Resolve without sending
///
/// A rejected resolution is still a 200; the body carries the same code a
/// dispatch pass would record.
#[utoipa::path(
    post,
    path = "/{key}/preview",
    tag = TEMPLATE_TAG,
    params(("key" = String, Path, description = "Template key")),
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Resolution result", body = PreviewResponse)
    )
)]
async fn preview_template(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ValidatedJson(req): ValidatedJson<PreviewRequest>,
) -> AppResult<Json<PreviewResponse>> {
    let resolution = state.services.templates.preview(&key, req.into()).await?;
    Ok(Json(PreviewResponse::from(resolution)))
}

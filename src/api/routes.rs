//! Router configuration for the API.

use axum::{
    Json, Router,
    http::{HeaderValue, StatusCode},
    middleware,
    routing::get,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::api::doc::ApiDoc;
use crate::api::handlers;
use crate::api::middleware::{global_error_handler, logging_middleware, request_id_middleware};
use crate::state::AppState;

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Builds the application router.
///
/// # Middleware Order
/// Last added runs first: CORS, then request ID, then logging (so the ID
/// is in its span), then the error normaliser closest to the handlers.
///
/// # Routes
/// - `/api/deliveries` - enqueue and operator queue actions
/// - `/api/templates` - authority template registration and preview
/// - `/health`, `/health/ready`, `/health/live`
/// - `/api-docs/openapi.json` - generated OpenAPI document
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/deliveries", handlers::deliveries::delivery_routes())
        .nest("/api/templates", handlers::templates::template_routes())
        .merge(handlers::health::health_routes())
        .split_for_parts();

    let router = router
        .route(OPENAPI_PATH, get(move || async move { Json(api) }))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn(global_error_handler))
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state);

    match cors_layer(cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

/// `None` when no origins are configured. `*` allows any origin.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    let allow = if origins.iter().any(|o| o.trim() == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o.trim()) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };
    Some(
        CorsLayer::new()
            .allow_origin(allow)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

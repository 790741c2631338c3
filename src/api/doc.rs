use utoipa::OpenApi;

pub const DELIVERY_TAG: &str = "Deliveries";
pub const TEMPLATE_TAG: &str = "Templates";
pub const HEALTH_TAG: &str = "Health";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Courier",
        description = "Outbound SMS/LMS and Kakao authority-template delivery queue",
    ),
    components(
        schemas(
            crate::api::dto::ErrorResponse,
            crate::models::delivery::DeliveryStatus,
            crate::models::delivery::JobPayload,
        )
    ),
    tags(
        (name = DELIVERY_TAG, description = "Enqueue deliveries and operate the queue"),
        (name = TEMPLATE_TAG, description = "Authority template registration and preview"),
        (name = HEALTH_TAG, description = "Health check endpoints"),
    )
)]
pub struct ApiDoc;

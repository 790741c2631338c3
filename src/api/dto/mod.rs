//! Data Transfer Objects for API requests and responses.
//!
//! DTOs are organized by domain:
//! - `delivery` - Enqueue, list and operator action DTOs
//! - `template` - Authority template registration and preview
//! - `health` - Health check responses
//! - `error` - Common error response DTOs

mod delivery;
mod error;
mod health;
mod template;

pub use delivery::{DeliveryJobResponse, EnqueueRequest, ListDeliveriesQuery, ReasonRequest};
pub use error::ErrorResponse;
pub use health::{ComponentHealth, HealthResponse, HealthStatus};
pub use template::{PreviewRequest, PreviewResponse, TemplateRequest, TemplateResponse};

//! API request and response data models.

pub mod images;
pub mod upload;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    #[schema(example = "No image data provided")]
    pub error: String,
}

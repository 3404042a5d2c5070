//! Image-hosting provider abstraction.
//!
//! The relay never stores images itself. It hands each upload to an [`ImageHost`], which stores
//! the image with a third-party service and reports back where it lives. [`imgbb::ImgbbHost`] is
//! the provider used in production.

use async_trait::async_trait;

pub mod imgbb;

pub use imgbb::ImgbbHost;

/// Result type for image host operations
pub type Result<T> = std::result::Result<T, ImageHostError>;

/// Errors that can occur while uploading to an image host
#[derive(Debug, thiserror::Error)]
pub enum ImageHostError {
    #[error("Image host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Image host returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Image host returned a malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Image host response is missing {0}")]
    MissingField(&'static str),
}

/// Where the provider put an uploaded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedImage {
    /// The provider's canonical page or display URL
    pub canonical_url: String,
    /// Direct URL of the image bytes; this is what relay tokens point at
    pub raw_url: String,
}

/// Abstract image host interface
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload a base64-encoded image.
    ///
    /// Makes exactly one outbound call and never retries.
    async fn upload(&self, image_base64: String) -> Result<HostedImage>;
}

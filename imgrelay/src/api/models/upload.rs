use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Label attached to every successful relay response
pub const CREATOR: &str = "Guru Sensei";

/// Text fields accepted by `POST /upload` as JSON or urlencoded form data.
///
/// Multipart requests carry the same two fields as text parts, plus an `image` file part.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadBody {
    /// Path of an image file on the relay host's disk
    #[schema(example = "/srv/images/cat.png")]
    pub image_path: Option<String>,
    /// Image already encoded as base64; forwarded unchanged
    pub image_buffer: Option<String>,
}

/// Successful upload response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RelayResponse {
    /// Always "Guru Sensei"
    #[schema(example = "Guru Sensei")]
    pub creator: String,
    /// Relay URL that proxies the hosted image
    #[schema(example = "http://localhost:9060/images/aHR0cHM6Ly9pLmV4YW1wbGUvcmF3L3guanBn")]
    pub output: String,
}

impl RelayResponse {
    pub fn new(output: String) -> Self {
        Self {
            creator: CREATOR.to_string(),
            output,
        }
    }
}

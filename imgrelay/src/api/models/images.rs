use serde::Deserialize;
use utoipa::IntoParams;

/// Path parameters for `/images/{token}`
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Path)]
pub struct ImagePath {
    /// URL-safe base64 encoding of the upstream image URL
    pub token: String,
}

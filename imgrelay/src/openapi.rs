//! OpenAPI document for the relay endpoints, served at `/api-docs/openapi.json` and rendered at `/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "imgrelay",
        description = "Upload images to a hosting provider and serve them back through same-origin relay URLs."
    ),
    paths(
        api::handlers::upload::upload_image,
        api::handlers::images::proxy_image,
    ),
    components(
        schemas(
            api::models::ErrorResponse,
            api::models::upload::UploadBody,
            api::models::upload::RelayResponse,
        )
    ),
    tags(
        (name = "upload", description = "Image intake"),
        (name = "images", description = "Relayed image retrieval"),
    )
)]
pub struct ApiDoc;

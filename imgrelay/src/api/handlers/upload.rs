//! `POST /upload`: accept an image, hand it to the image host, return a relay link.

use std::fmt::Display;
use std::path::PathBuf;

use axum::{
    Form, Json,
    extract::{FromRequest, Multipart, Request, State},
    http::{HeaderMap, StatusCode, Uri, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use url::Url;

use crate::{
    AppState,
    api::models::{
        ErrorResponse,
        upload::{RelayResponse, UploadBody},
    },
    errors::{Error, Result},
    token,
};

/// Everything a client may send to `/upload`, before input resolution.
#[derive(Debug, Default)]
pub struct UploadRequest {
    /// Raw bytes of the multipart `image` file part. A text part named `image` is ignored.
    pub file: Option<Bytes>,
    pub body: UploadBody,
}

/// The single image source picked for an upload.
#[derive(Debug, PartialEq, Eq)]
pub enum ImageSource {
    File(Bytes),
    Path(PathBuf),
    Buffer(String),
}

fn body_rejection(status: StatusCode, detail: impl Display) -> Error {
    tracing::debug!(%status, "Rejected upload body: {}", detail);
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            message: "Request body exceeds the upload size limit".to_string(),
        }
    } else {
        Error::BadRequest {
            message: "Invalid request body".to_string(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl FromRequest<AppState> for UploadRequest {
    type Rejection = Error;

    async fn from_request(req: Request, state: &AppState) -> Result<Self> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| body_rejection(e.status(), e.body_text()))?;

            let mut upload = UploadRequest::default();
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| body_rejection(e.status(), &e))?
            {
                let name = field.name().unwrap_or_default().to_string();
                match name.as_str() {
                    "image" if field.file_name().is_some() => {
                        let bytes = field.bytes().await.map_err(|e| body_rejection(e.status(), &e))?;
                        // First non-empty file part wins
                        if upload.file.is_none() && !bytes.is_empty() {
                            upload.file = Some(bytes);
                        }
                    }
                    "imagePath" => {
                        upload.body.image_path = Some(field.text().await.map_err(|e| body_rejection(e.status(), &e))?);
                    }
                    "imageBuffer" => {
                        upload.body.image_buffer =
                            Some(field.text().await.map_err(|e| body_rejection(e.status(), &e))?);
                    }
                    other => {
                        tracing::debug!(field = other, "Ignoring unknown or non-file multipart field");
                    }
                }
            }
            Ok(upload)
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<UploadBody>::from_request(req, state)
                .await
                .map_err(|e| body_rejection(e.status(), e.body_text()))?;
            Ok(UploadRequest { file: None, body })
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<UploadBody>::from_request(req, state)
                .await
                .map_err(|e| body_rejection(e.status(), e.body_text()))?;
            Ok(UploadRequest { file: None, body })
        } else {
            Ok(UploadRequest::default())
        }
    }
}

impl UploadRequest {
    /// Pick the image source: file part, then `imagePath`, then `imageBuffer`.
    pub fn into_source(self, allow_local_paths: bool) -> Result<ImageSource> {
        if let Some(file) = self.file.filter(|f| !f.is_empty()) {
            return Ok(ImageSource::File(file));
        }

        let image_path = non_empty(self.body.image_path);
        let image_buffer = non_empty(self.body.image_buffer);

        if let Some(path) = image_path {
            if allow_local_paths {
                return Ok(ImageSource::Path(PathBuf::from(path)));
            }
            if image_buffer.is_none() {
                return Err(Error::BadRequest {
                    message: "Local image paths are not accepted".to_string(),
                });
            }
        }

        match image_buffer {
            Some(buffer) => Ok(ImageSource::Buffer(buffer)),
            None => Err(Error::BadRequest {
                message: "No image data provided".to_string(),
            }),
        }
    }
}

impl ImageSource {
    /// Produce the base64 payload sent to the image host.
    ///
    /// Buffers are assumed to be base64 already and pass through untouched.
    pub async fn into_base64(self) -> Result<String> {
        match self {
            ImageSource::File(bytes) => Ok(STANDARD.encode(&bytes)),
            ImageSource::Path(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(STANDARD.encode(bytes)),
                Err(source) => Err(Error::Io { path, source }),
            },
            ImageSource::Buffer(buffer) => Ok(buffer),
        }
    }
}

/// Base URL relay links are rooted at, without a trailing slash.
fn relay_base(public_url: Option<&Url>, headers: &HeaderMap, uri: &Uri) -> Result<String> {
    if let Some(url) = public_url {
        return Ok(url.as_str().trim_end_matches('/').to_string());
    }

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .ok_or_else(|| Error::BadRequest {
            message: "Missing Host header".to_string(),
        })?;

    Ok(format!("http://{host}"))
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "upload",
    summary = "Upload image",
    description = "Upload an image to the configured image host and get back a relay URL that serves it. \
                   Send the image as a multipart `image` file part, as a local `imagePath`, or as a base64 `imageBuffer`. \
                   When several are present the file part wins, then `imagePath`, then `imageBuffer`.",
    request_body(
        content(
            (UploadBody = "application/json"),
            (UploadBody = "application/x-www-form-urlencoded"),
            (UploadBody = "multipart/form-data"),
        ),
        description = "Image data in one of the three accepted forms"
    ),
    responses(
        (status = 200, description = "Image uploaded", body = RelayResponse),
        (status = 400, description = "No image data, or an invalid request body", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse),
        (status = 500, description = "The image could not be read or the image host failed", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    request: UploadRequest,
) -> Result<Json<RelayResponse>> {
    let source = request.into_source(state.config.uploads.allow_local_paths)?;
    let base = relay_base(state.config.public_url.as_ref(), &headers, &uri)?;

    let payload = source.into_base64().await?;
    let hosted = state.image_host.upload(payload).await?;

    tracing::info!(canonical_url = %hosted.canonical_url, "Image uploaded");

    let output = format!("{base}/images/{}", token::encode(&hosted.raw_url));
    Ok(Json(RelayResponse::new(output)))
}

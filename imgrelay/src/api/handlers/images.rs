//! `ANY /images/{token}`: decode the token and stream the upstream image through.
//!
//! The handler is a transparent reverse proxy. Method, headers and body of the inbound request
//! are replayed against the decoded URL, and the upstream status, headers and body come back
//! unmodified. Hop-by-hop headers never cross in either direction, and `Host` is left for the
//! outbound client to set from the target URL.

use axum::{
    body::{Body, HttpBody as _},
    extract::{Path, Request, State},
    http::{HeaderMap, HeaderName, header},
    response::Response,
};

use crate::{
    AppState,
    api::models::{ErrorResponse, images::ImagePath},
    errors::{Error, Result},
    token,
};

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Copy `headers`, dropping hop-by-hop headers, anything the `Connection` header names, and `Host`.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::HOST
            || HOP_BY_HOP.contains(name)
            || connection_listed.iter().any(|listed| listed == name.as_str())
        {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

#[utoipa::path(
    get,
    path = "/images/{token}",
    tag = "images",
    summary = "Fetch relayed image",
    description = "Decode the token back into the hosted image URL and proxy the request to it. \
                   Any HTTP method is accepted and forwarded as-is; the upstream response, including \
                   error statuses and redirects, is returned unmodified. A trailing path after the token \
                   (for example a file name) is ignored.",
    params(ImagePath),
    responses(
        (status = 200, description = "Upstream image bytes with the upstream content type"),
        (status = 400, description = "Token does not decode to an http(s) URL", body = ErrorResponse),
        (status = 502, description = "Upstream could not be reached", body = ErrorResponse),
        (status = 504, description = "Upstream timed out", body = ErrorResponse),
    )
)]
#[tracing::instrument(skip_all, fields(token = %params.token))]
pub async fn proxy_image(
    State(state): State<AppState>,
    Path(params): Path<ImagePath>,
    request: Request,
) -> Result<Response> {
    let target = token::resolve_target(&params.token)?;
    let (parts, body) = request.into_parts();

    tracing::debug!(method = %parts.method, %target, "Proxying image request");

    let mut outbound = state
        .proxy_client
        .request(parts.method, target.clone())
        .headers(forwardable_headers(&parts.headers));

    if body.size_hint().exact() != Some(0) {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = outbound.send().await.map_err(|source| Error::Proxy {
        url: target.to_string(),
        source,
    })?;

    let status = upstream.status();
    let headers = forwardable_headers(upstream.headers());

    tracing::debug!(%status, "Upstream responded");

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

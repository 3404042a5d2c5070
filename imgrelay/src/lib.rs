//! # imgrelay: image upload relay and URL-indirection proxy
//!
//! `imgrelay` accepts an image, stores it with a third-party image host (ImgBB), and hands the
//! client back a URL on the relay's own origin. Fetching that URL streams the hosted image back
//! through the relay, so clients never talk to the image host directly.
//!
//! ## Request Flow
//!
//! 1. `POST /upload` carries the image as a multipart file part, a path on the relay's disk, or a
//!    base64 buffer ([`api::handlers::upload`]).
//! 2. The image is base64-encoded and submitted to the configured [`image_hosts::ImageHost`].
//! 3. The host's raw image URL is turned into a path-safe [`token`] and returned as
//!    `<relay base>/images/<token>`.
//! 4. `ANY /images/{token}` decodes the token and proxies the request to the raw URL
//!    ([`api::handlers::images`]).
//!
//! Nothing is stored between requests: the token *is* the upstream address.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use imgrelay::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     imgrelay::install_crypto_provider();
//!
//!     let args = imgrelay::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     imgrelay::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)?
//!         .serve(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and environment overrides. At minimum the ImgBB API key
//! must be provided, usually via `IMGBB_API_KEY`.

pub mod api;
pub mod config;
pub mod errors;
pub mod image_hosts;
mod openapi;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
pub mod token;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{any, get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use image_hosts::{ImageHost, ImgbbHost};
use openapi::ApiDoc;

/// Install the process-wide rustls crypto provider. Safe to call more than once.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Shared state handed to every handler.
///
/// Everything here is immutable or internally reference-counted, so cloning per request is cheap.
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub image_host: Arc<dyn ImageHost>,
    /// Client for `/images/{token}`; never follows redirects
    pub proxy_client: reqwest::Client,
}

/// Build the client used by the image proxy.
pub fn build_proxy_client(config: &config::ProxyConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout)
        .build()
}

/// Build the application router.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let upload_routes = Router::new()
        .route("/upload", post(api::handlers::upload::upload_image))
        .layer(DefaultBodyLimit::max(state.config.uploads.max_upload_size));

    let image_routes = Router::new()
        .route("/images/{token}", any(api::handlers::images::proxy_image))
        .route("/images/{token}/{*rest}", any(api::handlers::images::proxy_image));

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(upload_routes)
        .merge(image_routes)
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// A configured relay, ready to serve.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Build the production application, talking to ImgBB.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let image_host = ImgbbHost::from_config(&config)?;
        Self::with_image_host(config, Arc::new(image_host))
    }

    /// Build the application around any image host.
    pub fn with_image_host(config: Config, image_host: Arc<dyn ImageHost>) -> anyhow::Result<Self> {
        debug!("Starting relay with configuration: {:#?}", config);

        let state = AppState::builder()
            .config(config.clone())
            .image_host(image_host)
            .proxy_client(build_proxy_client(&config.proxy)?)
            .build();
        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Serve until `shutdown` resolves, then let in-flight requests finish.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Relay listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

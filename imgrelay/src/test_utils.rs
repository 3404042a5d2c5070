//! Test helpers shared by the in-crate test modules.

use axum_test::TestServer;
use url::Url;

use crate::config::Config;

/// Config pointing the ImgBB client at `provider_url` (usually a `wiremock` server).
///
/// Installs the rustls crypto provider, so anything built from the result can make requests.
/// Relay links are rooted at `http://relay.test`, and metrics are off because the Prometheus
/// recorder can only be installed once per process.
pub fn create_test_config(provider_url: &str) -> Config {
    crate::install_crypto_provider();

    let mut config = Config::default();
    config.provider.upload_url = Url::parse(&format!("{}/1/upload", provider_url.trim_end_matches('/')))
        .expect("Test provider URL should be valid");
    config.provider.api_key = Some("test-api-key".to_string());
    config.public_url = Some(Url::parse("http://relay.test").expect("Test public URL should be valid"));
    config.enable_metrics = false;
    config
}

pub fn create_test_server(config: Config) -> TestServer {
    crate::install_crypto_provider();
    crate::Application::new(config)
        .expect("Failed to create application")
        .into_test_server()
}

pub fn create_test_app(provider_url: &str) -> TestServer {
    create_test_server(create_test_config(provider_url))
}

/// `http://127.0.0.1:<port>` for a port nothing is listening on.
pub fn closed_port_uri() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind ephemeral port");
    let addr = listener.local_addr().expect("Bound listener has an address");
    drop(listener);
    format!("http://{addr}")
}

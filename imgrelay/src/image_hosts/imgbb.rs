//! ImgBB image host (<https://api.imgbb.com>).
//!
//! Uploads are a multipart `POST` to `/1/upload` with the API key in the `key` query parameter
//! and the base64 payload in the `image` field. A successful response looks like:
//!
//! ```json
//! { "data": { "url": "https://i.ibb.co/abc/x.jpg", "image": { "url": "https://i.ibb.co/abc/x.jpg" } }, "success": true }
//! ```

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::{HostedImage, ImageHost, ImageHostError, Result};
use crate::config::Config;

/// Longest error body kept for logs
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: Option<String>,
    image: Option<UploadImage>,
}

#[derive(Debug, Deserialize)]
struct UploadImage {
    url: Option<String>,
}

pub struct ImgbbHost {
    http_client: reqwest::Client,
    upload_url: Url,
    api_key: String,
    expiration: Option<Duration>,
}

impl ImgbbHost {
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(config.provider.timeout).build()?;

        Ok(Self {
            http_client,
            upload_url: config.provider.upload_url.clone(),
            api_key: config.api_key().to_string(),
            expiration: config.provider.expiration,
        })
    }

    fn request_url(&self) -> Url {
        let mut url = self.upload_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("key", &self.api_key);
            if let Some(expiration) = self.expiration {
                query.append_pair("expiration", &expiration.as_secs().to_string());
            }
        }
        url
    }
}

#[async_trait]
impl ImageHost for ImgbbHost {
    #[instrument(skip_all, fields(payload_len = image_base64.len()))]
    async fn upload(&self, image_base64: String) -> Result<HostedImage> {
        let form = Form::new().text("image", image_base64);

        // The request URL carries the API key, so it must not reach error messages
        let response = self
            .http_client
            .post(self.request_url())
            .multipart(form)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        let body = response.text().await.map_err(reqwest::Error::without_url)?;

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(ImageHostError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body)?;
        let data = parsed.data.ok_or(ImageHostError::MissingField("data"))?;

        let canonical_url = data
            .url
            .filter(|u| !u.is_empty())
            .ok_or(ImageHostError::MissingField("data.url"))?;
        let raw_url = data
            .image
            .and_then(|image| image.url)
            .filter(|u| !u.is_empty())
            .ok_or(ImageHostError::MissingField("data.image.url"))?;

        debug!(%canonical_url, %raw_url, "ImgBB upload accepted");

        Ok(HostedImage { canonical_url, raw_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{closed_port_uri, create_test_config};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host_for(server_uri: &str) -> ImgbbHost {
        ImgbbHost::from_config(&create_test_config(server_uri)).expect("Failed to build ImgBB client")
    }

    fn success_body() -> serde_json::Value {
        json!({
            "data": {
                "url": "https://i.example/x.jpg",
                "image": { "url": "https://i.example/raw/x.jpg" }
            },
            "success": true,
            "status": 200
        })
    }

    #[tokio::test]
    async fn test_successful_upload() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/1/upload"))
            .and(query_param("key", "test-api-key"))
            .and(query_param_is_missing("expiration"))
            .and(body_string_contains("name=\"image\""))
            .and(body_string_contains("aGVsbG8="))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let hosted = host_for(&mock_server.uri()).upload("aGVsbG8=".to_string()).await.unwrap();

        assert_eq!(
            hosted,
            HostedImage {
                canonical_url: "https://i.example/x.jpg".to_string(),
                raw_url: "https://i.example/raw/x.jpg".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_expiration_is_sent_in_seconds() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("expiration", "600"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut config = create_test_config(&mock_server.uri());
        config.provider.expiration = Some(Duration::from_secs(600));
        let host = ImgbbHost::from_config(&config).unwrap();

        assert!(host.upload("aGVsbG8=".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":{"message":"Invalid API v1 key."}}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = host_for(&mock_server.uri()).upload("aGVsbG8=".to_string()).await.unwrap_err();

        match err {
            ImageHostError::Status { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Invalid API v1 key"));
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_long_error_bodies_are_truncated() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("é".repeat(1000)))
            .mount(&mock_server)
            .await;

        let err = host_for(&mock_server.uri()).upload("aGVsbG8=".to_string()).await.unwrap_err();

        let ImageHostError::Status { body, .. } = err else {
            panic!("Expected Status error");
        };
        assert!(body.len() <= MAX_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_missing_raw_url_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"url": "https://i.example/x.jpg"}})))
            .mount(&mock_server)
            .await;

        let err = host_for(&mock_server.uri()).upload("aGVsbG8=".to_string()).await.unwrap_err();
        assert!(matches!(err, ImageHostError::MissingField("data.image.url")));
    }

    #[tokio::test]
    async fn test_missing_data_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&mock_server)
            .await;

        let err = host_for(&mock_server.uri()).upload("aGVsbG8=".to_string()).await.unwrap_err();
        assert!(matches!(err, ImageHostError::MissingField("data")));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let err = host_for(&mock_server.uri()).upload("aGVsbG8=".to_string()).await.unwrap_err();
        assert!(matches!(err, ImageHostError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let err = host_for(&closed_port_uri()).upload("aGVsbG8=".to_string()).await.unwrap_err();

        match &err {
            ImageHostError::Request(e) => assert!(e.is_connect()),
            other => panic!("Expected connection error, got {other:?}"),
        }
        // The failing URL carries the API key and must not show up in logs
        let logged = format!("{:#}", crate::errors::Error::from(err));
        assert!(!logged.contains("test-api-key"), "API key leaked: {logged}");
    }

    #[tokio::test]
    async fn test_slow_host_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(success_body())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let mut config = create_test_config(&mock_server.uri());
        config.provider.timeout = Duration::from_millis(200);
        let host = ImgbbHost::from_config(&config).unwrap();

        let err = host.upload("aGVsbG8=".to_string()).await.unwrap_err();
        match &err {
            ImageHostError::Request(e) => assert!(e.is_timeout()),
            other => panic!("Expected timeout, got {other:?}"),
        }
        let logged = format!("{:#}", crate::errors::Error::from(err));
        assert!(!logged.contains("test-api-key"), "API key leaked: {logged}");
    }
}

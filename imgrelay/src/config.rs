//! Application configuration management.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via `-f` flag or
//! `IMGRELAY_CONFIG` environment variable. A missing file is not an error: every field has a
//! default except the provider API key.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `IMGRELAY_` override YAML values
//! 3. **`PORT` and `IMGBB_API_KEY`** - Plain variables override `port` and `provider.api_key`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `IMGRELAY_PROVIDER__TIMEOUT=10s` sets the `provider.timeout` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use imgrelay::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Relay will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Provider credentials (required)
//! IMGBB_API_KEY=0123456789abcdef
//!
//! # Listen port
//! PORT=9060
//!
//! # Advertise a public base URL instead of deriving it from the Host header
//! IMGRELAY_PUBLIC_URL=https://img.example.com
//!
//! # Override nested values
//! IMGRELAY_PROXY__TIMEOUT=15s
//! IMGRELAY_UPLOADS__ALLOW_LOCAL_PATHS=false
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// ImgBB accepts expirations from one minute up to 180 days
const MIN_EXPIRATION_SECS: u64 = 60;
const MAX_EXPIRATION_SECS: u64 = 180 * 24 * 60 * 60;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMGRELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// Built once at startup and handed to the router through [`crate::AppState`]; nothing reads
/// the environment after [`Config::load`] returns.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL advertised in relay links (e.g., "https://img.example.com").
    /// When unset, links are rooted at `http://<Host header>` of the upload request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<Url>,
    /// Set from `IMGBB_API_KEY`; folded into `provider.api_key` during load.
    #[serde(skip_serializing)]
    pub imgbb_api_key: Option<String>,
    /// Image-hosting provider settings
    pub provider: ProviderConfig,
    /// Image proxy settings for `/images/{token}`
    pub proxy: ProxyConfig,
    /// Upload intake settings for `/upload`
    pub uploads: UploadsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Image-hosting provider configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Upload endpoint of the provider
    pub upload_url: Url,
    /// Provider API key, sent as the `key` query parameter
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Ask the provider to delete images after this long (provider default: never)
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Duration>,
    /// Total time allowed for one upload call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Reverse-proxy configuration for image retrieval.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Total time allowed for one upstream fetch, including the body
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Time allowed to establish the upstream connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

/// Upload intake configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// Largest accepted request body for `/upload`, in bytes
    pub max_upload_size: usize,
    /// Whether `imagePath` may name a file on the relay's own disk
    pub allow_local_paths: bool,
}

const REDACTED: &str = "<redacted>";

// API keys are printed as `<redacted>` so the config can be logged
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field("imgbb_api_key", &self.imgbb_api_key.as_ref().map(|_| REDACTED))
            .field("provider", &self.provider)
            .field("proxy", &self.proxy)
            .field("uploads", &self.uploads)
            .field("enable_metrics", &self.enable_metrics)
            .field("enable_otel_export", &self.enable_otel_export)
            .finish()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("upload_url", &self.upload_url)
            .field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
            .field("expiration", &self.expiration)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9060,
            public_url: None,
            imgbb_api_key: None,
            provider: ProviderConfig::default(),
            proxy: ProxyConfig::default(),
            uploads: UploadsConfig::default(),
            enable_metrics: true,
            enable_otel_export: false,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            upload_url: Url::parse("https://api.imgbb.com/1/upload").expect("default upload URL is valid"),
            api_key: None,
            expiration: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            // ImgBB rejects anything above 32 MB
            max_upload_size: 32 * 1024 * 1024,
            allow_local_paths: true,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // IMGBB_API_KEY wins over anything set in the file
        if let Some(key) = config.imgbb_api_key.take() {
            config.provider.api_key = Some(key);
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.provider.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            return Err(Error::Internal {
                operation: "Config validation: provider API key is not configured. \
                     Please set IMGBB_API_KEY or IMGRELAY_PROVIDER__API_KEY, or add provider.api_key to the config file."
                    .to_string(),
            });
        }

        if !matches!(self.provider.upload_url.scheme(), "http" | "https") {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: provider.upload_url must be an http(s) URL, got {}",
                    self.provider.upload_url
                ),
            });
        }

        if let Some(public_url) = &self.public_url
            && !matches!(public_url.scheme(), "http" | "https")
        {
            return Err(Error::Internal {
                operation: format!("Config validation: public_url must be an http(s) URL, got {public_url}"),
            });
        }

        if let Some(expiration) = self.provider.expiration
            && !(MIN_EXPIRATION_SECS..=MAX_EXPIRATION_SECS).contains(&expiration.as_secs())
        {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: provider.expiration must be between {MIN_EXPIRATION_SECS}s and {MAX_EXPIRATION_SECS}s, got {}s",
                    expiration.as_secs()
                ),
            });
        }

        if self.provider.timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: provider.timeout must be greater than zero (default: 30s).".to_string(),
            });
        }

        if self.proxy.timeout.is_zero() || self.proxy.connect_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: proxy.timeout and proxy.connect_timeout must be greater than zero.".to_string(),
            });
        }

        if self.uploads.max_upload_size == 0 {
            return Err(Error::Internal {
                operation: "Config validation: uploads.max_upload_size cannot be 0.".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("IMGRELAY_").ignore(&["CONFIG"]).split("__"))
            // The plain variables the relay has always read
            .merge(Env::raw().only(&["PORT", "IMGBB_API_KEY"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The provider API key. Only call after [`Config::validate`] has passed.
    pub fn api_key(&self) -> &str {
        self.provider.api_key.as_deref().unwrap_or_default()
    }
}

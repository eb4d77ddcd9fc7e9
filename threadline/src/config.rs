//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `THREADLINE_CONFIG`
//! environment variable. A missing file is fine: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `THREADLINE_` override YAML values
//! 3. **Well-known variables** - `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `ASSISTANT_ID` map onto
//!    `openai.api_key`, `openai.base_url` and `assistant_id`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `THREADLINE_UPLOADS__STRATEGY=attachment` sets the `uploads.strategy` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use threadline::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Example
//!
//! ```yaml
//! host: 0.0.0.0
//! port: 3000
//! assistant_id: asst_abc123
//! openai:
//!   base_url: https://api.openai.com/v1
//!   request_timeout: 60s
//! uploads:
//!   strategy: vector_store
//!   vector_store_name: Uploaded Files
//!   poll_interval: 1s
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;
use crate::types::{AssistantId, UploadStrategy};

/// Name of the vector store uploaded files are collected in
pub const DEFAULT_VECTOR_STORE_NAME: &str = "Uploaded Files";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "THREADLINE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Assistant that runs every thread. Requests fail with 500 while this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<AssistantId>,
    /// Connection to the assistant API
    pub openai: OpenAiConfig,
    /// File upload handling
    pub uploads: UploadsConfig,
    /// CORS configuration for browser clients served from another origin
    pub cors: CorsConfig,
    /// Maximum accepted request body in bytes. Files travel base64-encoded inside the body.
    pub request_body_limit: usize,
    /// Number of stream parts buffered between the run and the response body
    pub stream_buffer: usize,
    /// Expose Prometheus metrics on `/internal/metrics`
    pub enable_metrics: bool,
    /// Export traces over OTLP (configured by the standard `OTEL_*` variables)
    pub enable_otel_export: bool,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL including the version segment
    pub base_url: Url,
    /// Optional `OpenAI-Organization` header
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Timeout for non-streaming calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Timeout for establishing connections, streaming calls included
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadsConfig {
    /// How an uploaded file is made available to the assistant
    pub strategy: UploadStrategy,
    /// Vector store used by the `vector_store` strategy; created on first use
    pub vector_store_name: String,
    /// Largest decoded file accepted, in bytes
    pub max_file_size: u64,
    /// Delay between file batch status checks
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Give up on a file batch after this many status checks
    pub max_polls: u32,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests. Empty disables the CORS layer.
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://chat.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            assistant_id: None,
            openai: OpenAiConfig::default(),
            uploads: UploadsConfig::default(),
            cors: CorsConfig::default(),
            request_body_limit: 64 * 1024 * 1024,
            stream_buffer: 64,
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url.as_str())
            .field("organization", &self.organization)
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Url::parse("https://api.openai.com/v1").expect("static URL is valid"),
            organization: None,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            strategy: UploadStrategy::default(),
            vector_store_name: DEFAULT_VECTOR_STORE_NAME.to_string(),
            max_file_size: 32 * 1024 * 1024,
            poll_interval: Duration::from_secs(1),
            max_polls: 300,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age: Some(3600),
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // An empty ASSISTANT_ID in the environment counts as unset
        config.assistant_id = config.assistant_id.take().filter(|id| !id.trim().is_empty());

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<(), Error> {
        if self.uploads.vector_store_name.trim().is_empty() {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: uploads.vector_store_name cannot be empty"
            )));
        }

        if self.uploads.poll_interval.is_zero() {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: uploads.poll_interval must be greater than zero"
            )));
        }

        if self.uploads.max_polls == 0 {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: uploads.max_polls must be greater than zero"
            )));
        }

        if self.stream_buffer == 0 {
            return Err(Error::Other(anyhow::anyhow!(
                "Config validation: stream_buffer must be greater than zero"
            )));
        }

        if self.uploads.max_file_size as usize > self.request_body_limit {
            tracing::warn!(
                max_file_size = self.uploads.max_file_size,
                request_body_limit = self.request_body_limit,
                "uploads.max_file_size is larger than request_body_limit; large files will be rejected by the body limit"
            );
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("THREADLINE_").ignore(&["config"]).split("__"))
            // Variables the rest of the ecosystem already uses
            .merge(Env::raw().only(&["ASSISTANT_ID"]))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "openai.api_key".into()))
            .merge(Env::raw().only(&["OPENAI_BASE_URL"]).map(|_| "openai.base_url".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

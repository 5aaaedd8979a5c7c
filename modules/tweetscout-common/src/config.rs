use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::artifact::Protocol;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.scraperapi.com/structured/twitter/search";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Application configuration loaded from environment variables.
/// Holds secrets and endpoints only; per-run arguments come from the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    // Search provider
    pub scraperapi_key: String,
    pub search_endpoint: String,

    // AI / LLM
    pub openai_api_key: String,
    pub openai_model: String,

    // Geocoding
    pub geocoder_url: String,

    // Storage
    pub storage_protocol: Protocol,
    pub storage_root: PathBuf,
    pub catalog: Option<CatalogConfig>,

    // Hardening
    pub http_timeout: Duration,
    pub fetch_max_attempts: u32,
}

/// Connection details for the artifact catalog service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub auth_token: Option<String>,
    pub knowledge_source_id: u32,
}

impl CatalogConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            scraperapi_key: required_env("SCRAPERAPI_KEY")?,
            search_endpoint: env_or("SEARCH_ENDPOINT", DEFAULT_SEARCH_ENDPOINT),
            openai_api_key: required_env("OPENAI_API_KEY")?,
            openai_model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            geocoder_url: env_or("GEOCODER_URL", DEFAULT_GEOCODER_URL),
            storage_protocol: env_or("STORAGE_PROTOCOL", "local")
                .parse()
                .context("STORAGE_PROTOCOL")?,
            storage_root: PathBuf::from(env_or("STORAGE_ROOT", "data")),
            catalog: catalog_from_env()?,
            http_timeout: Duration::from_secs(
                env_or("HTTP_TIMEOUT_SECS", "30")
                    .parse()
                    .context("HTTP_TIMEOUT_SECS must be a number of seconds")?,
            ),
            fetch_max_attempts: env_or("FETCH_MAX_ATTEMPTS", "5")
                .parse()
                .context("FETCH_MAX_ATTEMPTS must be a positive integer")?,
        };

        if config.fetch_max_attempts == 0 {
            anyhow::bail!("FETCH_MAX_ATTEMPTS must be at least 1");
        }

        Ok(config)
    }

    /// Log which keys are set without printing their values.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  SCRAPERAPI_KEY: {}", preview(&self.scraperapi_key));
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  OPENAI_MODEL: {}", self.openai_model);
        tracing::info!("  SEARCH_ENDPOINT: {}", self.search_endpoint);
        tracing::info!("  STORAGE: {}://{}", self.storage_protocol, self.storage_root.display());
        match &self.catalog {
            Some(c) => tracing::info!("  KERNEL_PLANCKSTER: {}", c.base_url()),
            None => tracing::info!("  KERNEL_PLANCKSTER: <not set>"),
        }
    }
}

fn catalog_from_env() -> Result<Option<CatalogConfig>> {
    let Ok(host) = std::env::var("KERNEL_PLANCKSTER_HOST") else {
        return Ok(None);
    };
    Ok(Some(CatalogConfig {
        host,
        port: env_or("KERNEL_PLANCKSTER_PORT", "8000")
            .parse()
            .context("KERNEL_PLANCKSTER_PORT must be a port number")?,
        scheme: env_or("KERNEL_PLANCKSTER_SCHEME", "http"),
        auth_token: std::env::var("KERNEL_PLANCKSTER_AUTH_TOKEN").ok(),
        knowledge_source_id: env_or("KERNEL_PLANCKSTER_KNOWLEDGE_SOURCE_ID", "1")
            .parse()
            .context("KERNEL_PLANCKSTER_KNOWLEDGE_SOURCE_ID must be a number")?,
    }))
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

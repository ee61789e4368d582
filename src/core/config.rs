use serde::{Deserialize, Serialize};
use std::path::Path;

use super::redact::Redacted;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub stream: StreamConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Connection settings for one video library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// CDN pull-zone hostname, e.g. `vz-1234abcd-56e.b-cdn.net`.
    pub hostname: String,
    pub library_id: u64,
    pub api_key: Redacted<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Referer sent on the second CDN attempt when the first is rejected.
    #[serde(default = "default_fallback_referer")]
    pub fallback_referer: String,
}

impl StreamConfig {
    pub fn new(hostname: impl Into<String>, library_id: u64, api_key: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            library_id,
            api_key: Redacted::new(api_key.into()),
            api_base_url: default_api_base_url(),
            fallback_referer: default_fallback_referer(),
        }
    }

    /// `https://{hostname}`, or the hostname itself when it already carries
    /// a scheme (a local mirror of the pull zone).
    pub fn cdn_base_url(&self) -> String {
        if self.hostname.starts_with("https://") || self.hostname.starts_with("http://") {
            self.hostname.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", self.hostname)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Page size requested from every paginated endpoint.
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://video.bunnycdn.com".to_string()
}
fn default_fallback_referer() -> String {
    "https://iframe.mediadelivery.net".to_string()
}
fn default_items_per_page() -> u32 {
    1000
}
fn default_request_timeout_secs() -> u64 {
    300
}
fn default_connect_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn new(stream: StreamConfig) -> Self {
        Self {
            stream,
            listing: ListingConfig::default(),
            http: HttpConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    /// Load configuration with layered overrides:
    /// 1. config/default.toml
    /// 2. config/{env}.toml (based on BUNNYFS_ENV)
    /// 3. Environment variables (BUNNYFS_* prefix)
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_dir(Path::new("config"))
    }

    pub fn load_from_dir(dir: &Path) -> anyhow::Result<Self> {
        let default_path = dir.join("default.toml");
        let mut config = match std::fs::read_to_string(&default_path) {
            Ok(content) => Self::from_toml_str(&content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", default_path.display(), e))?,
            Err(_) => Self::default(),
        };

        // Layer 2: environment-specific overrides
        let env_name = std::env::var("BUNNYFS_ENV").unwrap_or_else(|_| "development".to_string());
        let env_path = dir.join(format!("{}.toml", env_name));
        if let Ok(env_content) = std::fs::read_to_string(&env_path) {
            config = Self::from_toml_str(&env_content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", env_path.display(), e))?;
        }

        // Layer 3: environment variable overrides (selected keys)
        Self::apply_env_overrides(&mut config);

        if config.stream.hostname.is_empty() {
            anyhow::bail!("stream.hostname is not configured (set BUNNYFS_STREAM_HOSTNAME)");
        }
        if config.listing.items_per_page == 0 {
            anyhow::bail!("listing.items_per_page must be greater than zero");
        }

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(v) = std::env::var("BUNNYFS_STREAM_HOSTNAME") {
            config.stream.hostname = v;
        }
        if let Ok(v) = std::env::var("BUNNYFS_STREAM_LIBRARY_ID") {
            if let Ok(id) = v.parse() {
                config.stream.library_id = id;
            }
        }
        if let Ok(v) = std::env::var("BUNNYFS_STREAM_API_KEY") {
            config.stream.api_key = Redacted::new(v);
        }
        if let Ok(v) = std::env::var("BUNNYFS_STREAM_API_BASE_URL") {
            config.stream.api_base_url = v;
        }
        if let Ok(v) = std::env::var("BUNNYFS_LISTING_ITEMS_PER_PAGE") {
            if let Ok(n) = v.parse() {
                config.listing.items_per_page = n;
            }
        }
        if let Ok(v) = std::env::var("BUNNYFS_OBSERVABILITY_LOG_LEVEL") {
            config.observability.log_level = v;
        }
        if let Ok(v) = std::env::var("BUNNYFS_OBSERVABILITY_LOG_FORMAT") {
            config.observability.log_format = v;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(StreamConfig::new(String::new(), 0, String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = AppConfig::from_toml_str(
            r#"
            [stream]
            hostname = "vz-abc.b-cdn.net"
            library_id = 1234
            api_key = "secret-key"
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.library_id, 1234);
        assert_eq!(config.stream.api_key.expose(), "secret-key");
        assert_eq!(config.stream.api_base_url, "https://video.bunnycdn.com");
        assert_eq!(config.stream.cdn_base_url(), "https://vz-abc.b-cdn.net");
        assert_eq!(config.listing.items_per_page, 1000);
        assert_eq!(config.http.request_timeout_secs, 300);
        assert_eq!(config.observability.log_format, "text");
    }

    #[test]
    fn test_debug_output_hides_api_key() {
        let config = AppConfig::new(StreamConfig::new("cdn.example", 1, "topsecret"));
        let dumped = format!("{:?}", config);
        assert!(!dumped.contains("topsecret"));
        assert!(dumped.contains("[REDACTED]"));
    }

    #[test]
    fn test_listing_override() {
        let config = AppConfig::from_toml_str(
            r#"
            [stream]
            hostname = "cdn.example"
            library_id = 1
            api_key = "k"

            [listing]
            items_per_page = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.listing.items_per_page, 50);
    }

    #[test]
    fn test_cdn_base_url_keeps_explicit_scheme() {
        let stream = StreamConfig::new("http://127.0.0.1:8080/", 1, "k");
        assert_eq!(stream.cdn_base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_missing_stream_section_is_an_error() {
        assert!(AppConfig::from_toml_str("[listing]\nitems_per_page = 10\n").is_err());
    }
}

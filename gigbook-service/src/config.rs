//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: GIGBOOK_, nested keys split on `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/gigbook/{service_name}/config.toml
//! 4. System directory: /etc/gigbook/{service_name}/config.toml
//! 5. Default values
//!
//! Configuration is read once at startup. The helpers built from it
//! ([`Sorter`](crate::sort::Sorter), [`Searcher`](crate::search::Searcher),
//! [`Paginator`](crate::pagination::Paginator), [`Compressor`](crate::compression::Compressor))
//! take owned copies and are never reconfigured on the request path.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::sort::SortDirection;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Pagination limits
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Search query bounds
    #[serde(default)]
    pub search: SearchConfig,

    /// Response/request compression policy
    #[serde(default)]
    pub compression: CompressionConfig,

    /// Local rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Per-resource sort and search allow-lists, keyed by resource name
    #[serde(default)]
    pub resources: HashMap<String, ResourceConfig>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Environment (dev, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Pagination configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size used when the client sends none (or garbage)
    #[serde(default = "default_page_limit")]
    pub default_limit: u32,

    /// Upper bound for the page size
    #[serde(default = "default_max_page_limit")]
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_page_limit(),
        }
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Shortest query (in characters) that triggers filtering
    #[serde(default = "default_search_min_length")]
    pub min_length: usize,

    /// Longest query (in characters) that triggers filtering
    #[serde(default = "default_search_max_length")]
    pub max_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_length: default_search_min_length(),
            max_length: default_search_max_length(),
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Enable gzip handling
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Smallest body (bytes) worth compressing
    #[serde(default = "default_compression_min_size")]
    pub min_size: usize,

    /// Largest body (bytes) that will be compressed
    #[serde(default = "default_compression_max_size")]
    pub max_size: usize,

    /// gzip level, 0 (store) to 9 (best)
    #[serde(default = "default_compression_level")]
    pub level: u32,

    /// Compressible content types; a trailing `*` matches by prefix (e.g. `text/*`)
    #[serde(default = "default_content_types")]
    pub content_types: Vec<String>,

    /// Ceiling on the decoded size of a gzip request body
    #[serde(default = "default_max_decompressed_size")]
    pub max_decompressed_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: default_compression_min_size(),
            max_size: default_compression_max_size(),
            level: default_compression_level(),
            content_types: default_content_types(),
            max_decompressed_size: default_max_decompressed_size(),
        }
    }
}

/// Local (in-memory) rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum requests per period
    #[serde(default = "default_rate_limit_requests")]
    pub requests_per_period: u32,

    /// Period length in seconds
    #[serde(default = "default_rate_limit_period_secs")]
    pub period_secs: u64,

    /// Burst size (allow temporary spikes)
    #[serde(default = "default_rate_limit_burst")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_period: default_rate_limit_requests(),
            period_secs: default_rate_limit_period_secs(),
            burst_size: default_rate_limit_burst(),
        }
    }
}

impl RateLimitConfig {
    /// Period as a duration
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

/// Sort and search allow-lists for one resource (e.g. `venues`, `gigs`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Fields clients may sort by
    #[serde(default)]
    pub sort_fields: Vec<String>,

    /// Field used when the requested sort field is missing or not allowed
    pub default_sort: String,

    /// Direction used when the requested direction is missing or unrecognized
    #[serde(default)]
    pub default_direction: SortDirection,

    /// Fields clients may search in
    #[serde(default)]
    pub search_fields: Vec<String>,
}

// Default value functions
fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_limit() -> u32 {
    20
}

fn default_max_page_limit() -> u32 {
    100
}

fn default_search_min_length() -> usize {
    2
}

fn default_search_max_length() -> usize {
    100
}

fn default_compression_min_size() -> usize {
    1024
}

fn default_compression_max_size() -> usize {
    10 * 1024 * 1024 // 10 MB
}

fn default_compression_level() -> u32 {
    6
}

fn default_content_types() -> Vec<String> {
    vec![
        "application/json".to_string(),
        "application/javascript".to_string(),
        "application/xml".to_string(),
        "text/*".to_string(),
    ]
}

fn default_max_decompressed_size() -> usize {
    10 * 1024 * 1024 // 10 MB
}

fn default_rate_limit_requests() -> u32 {
    100
}

fn default_rate_limit_period_secs() -> u64 {
    60
}

fn default_rate_limit_burst() -> u32 {
    10
}

impl Config {
    /// Load configuration using the binary name as the service name
    ///
    /// Environment variables (GIGBOOK_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "gigbook".to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later merges override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("GIGBOOK_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GIGBOOK_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service, highest priority first
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("gigbook");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Some(path) = xdg_dirs.find_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/gigbook").join(service_name).join("config.toml"));

        paths
    }

    /// Allow-lists for a named resource, if configured
    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.get(name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "gigbook".to_string(),
                port: default_port(),
                log_level: default_log_level(),
                environment: default_environment(),
            },
            pagination: PaginationConfig::default(),
            search: SearchConfig::default(),
            compression: CompressionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            resources: HashMap::new(),
        }
    }
}

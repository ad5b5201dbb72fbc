//! # Sync Configuration
//!
//! Configuration for the cache engine, queue housekeeping and the worker.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     INSPEKT_ORIGIN=https://inspekt.example.com                         │
//! │     INSPEKT_CACHE_VERSION=v4                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/inspekt/inspekt.toml (Linux)                             │
//! │     ~/Library/Application Support/com.inspekt.inspekt/... (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [remote]
//! origin = "https://inspekt.example.com"
//! api_prefix = "/api/"
//! api_base = "/api"
//!
//! [cache]
//! version = "v3"
//! shell_assets = ["/", "/index.html", "/app.js"]
//! offline_page = "/offline.html"
//! navigation_timeout_ms = 3000
//!
//! [queue]
//! max_retries = 3
//!
//! [server]
//! port = 8787
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use inspekt_core::{
    BLOB_RETENTION_DAYS, MAX_RETRIES, NAVIGATION_TIMEOUT_MS, OFFLINE_PAGE, PROCESSING_GRACE_SECS,
};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Remote Settings
// =============================================================================

/// Where the remote application and its data API live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Origin every intercepted request is forwarded to.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Paths under this prefix are API reads (stale-while-revalidate in the
    /// `api` generation).
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Base path mutations are replayed against.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_api_base() -> String {
    "/api".to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            origin: default_origin(),
            api_prefix: default_api_prefix(),
            api_base: default_api_base(),
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Cache generations and the navigation fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Version token embedded in every generation name. Bump it to retire
    /// all cached content on the next activation.
    #[serde(default = "default_cache_version")]
    pub version: String,

    /// App-shell paths precached on install (best-effort).
    #[serde(default = "default_shell_assets")]
    pub shell_assets: Vec<String>,

    /// Offline fallback page. Precached first; install fails without it.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Deadline for the network leg of navigation requests.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,
}

fn default_cache_version() -> String {
    "v1".to_string()
}

fn default_shell_assets() -> Vec<String> {
    vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.json".to_string(),
    ]
}

fn default_offline_page() -> String {
    OFFLINE_PAGE.to_string()
}

fn default_navigation_timeout() -> u64 {
    NAVIGATION_TIMEOUT_MS
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            version: default_cache_version(),
            shell_assets: default_shell_assets(),
            offline_page: default_offline_page(),
            navigation_timeout_ms: default_navigation_timeout(),
        }
    }
}

impl CacheSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Retry ceiling and housekeeping of the durable queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Failed replays after which an action needs explicit user action.
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,

    /// Age after which a `processing` action is considered abandoned.
    #[serde(default = "default_processing_grace")]
    pub processing_grace_secs: i64,

    /// Retention window for captured blobs.
    #[serde(default = "default_blob_retention")]
    pub blob_retention_days: i64,

    /// Period of the housekeeping tick.
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_secs: u64,
}

fn default_max_retries() -> i64 {
    MAX_RETRIES
}

fn default_processing_grace() -> i64 {
    PROCESSING_GRACE_SECS
}

fn default_blob_retention() -> i64 {
    BLOB_RETENTION_DAYS
}

fn default_housekeeping_interval() -> u64 {
    300
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            max_retries: default_max_retries(),
            processing_grace_secs: default_processing_grace(),
            blob_retention_days: default_blob_retention(),
            housekeeping_interval_secs: default_housekeeping_interval(),
        }
    }
}

impl QueueSettings {
    pub fn processing_grace(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.processing_grace_secs)
    }

    pub fn blob_retention(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::days(self.blob_retention_days)
    }
}

// =============================================================================
// Connectivity Settings
// =============================================================================

/// Network reachability probing and HTTP client timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivitySettings {
    /// URL probed with HEAD while deciding whether we're online. No probe
    /// task runs when unset; connectivity then follows observed traffic.
    #[serde(default)]
    pub probe_url: Option<String>,

    /// Interval between probes while online.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Overall timeout of every outbound request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// First probe delay after going offline (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Ceiling of the probe delay while offline (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_probe_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    30
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        ConnectivitySettings {
            probe_url: None,
            probe_interval_secs: default_probe_interval(),
            request_timeout_secs: default_request_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// Listener of the worker's interception proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address (default: loopback only).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `inspekt.db` in the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Complete Configuration
// =============================================================================

/// Complete configuration of the sync layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub connectivity: ConnectivitySettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl SyncConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Defaults
    /// 2. Config file (if exists)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration, falling back to defaults on error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Saves the configuration to a TOML file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "Origin must be http:// or https://, got: {}",
                self.remote.origin
            )));
        }

        if !self.remote.api_prefix.starts_with('/') || !self.remote.api_base.starts_with('/') {
            return Err(SyncError::InvalidConfig(
                "api_prefix and api_base must start with '/'".into(),
            ));
        }

        if !self.cache.offline_page.starts_with('/') {
            return Err(SyncError::InvalidConfig(
                "offline_page must be an absolute path".into(),
            ));
        }

        if self.cache.version.trim().is_empty() {
            return Err(SyncError::InvalidConfig("cache version must not be empty".into()));
        }

        if self.cache.navigation_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "navigation_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.queue.max_retries < 1 {
            return Err(SyncError::InvalidConfig(
                "max_retries must be at least 1".into(),
            ));
        }

        if self.queue.housekeeping_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "housekeeping_interval_secs must be greater than 0".into(),
            ));
        }

        if let Some(ref probe) = self.connectivity.probe_url {
            Url::parse(probe)?;
        }

        Ok(())
    }

    /// Applies `INSPEKT_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origin) = lookup("INSPEKT_ORIGIN") {
            debug!(origin = %origin, "Overriding origin from environment");
            self.remote.origin = origin;
        }

        if let Some(prefix) = lookup("INSPEKT_API_PREFIX") {
            self.remote.api_prefix = prefix;
        }

        if let Some(base) = lookup("INSPEKT_API_BASE") {
            self.remote.api_base = base;
        }

        if let Some(version) = lookup("INSPEKT_CACHE_VERSION") {
            debug!(version = %version, "Overriding cache version from environment");
            self.cache.version = version;
        }

        if let Some(timeout) = lookup("INSPEKT_NAVIGATION_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.cache.navigation_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Invalid INSPEKT_NAVIGATION_TIMEOUT_MS"),
            }
        }

        if let Some(retries) = lookup("INSPEKT_MAX_RETRIES") {
            match retries.parse::<i64>() {
                Ok(n) => self.queue.max_retries = n,
                Err(_) => warn!(value = %retries, "Invalid INSPEKT_MAX_RETRIES"),
            }
        }

        if let Some(probe) = lookup("INSPEKT_PROBE_URL") {
            self.connectivity.probe_url = Some(probe).filter(|p| !p.is_empty());
        }

        if let Some(addr) = lookup("INSPEKT_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Some(port) = lookup("INSPEKT_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding port from environment");
                    self.server.port = p;
                }
                Err(_) => warn!(value = %port, "Invalid INSPEKT_PORT"),
            }
        }

        if let Some(path) = lookup("INSPEKT_DATABASE_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    /// Gets the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("inspekt.toml"))
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "inspekt", "inspekt")
    }

    /// SQLite file to open: configured path, else `inspekt.db` in the
    /// platform data dir, else the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("inspekt.db")))
            .unwrap_or_else(|| PathBuf::from("inspekt.db"))
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    pub fn origin_url(&self) -> SyncResult<Url> {
        Ok(Url::parse(&self.remote.origin)?)
    }

    /// Absolute URL of a path on the origin.
    pub fn url_for(&self, path: &str) -> SyncResult<Url> {
        Ok(self.origin_url()?.join(path)?)
    }

    /// Absolute URL of a path relative to the API base, e.g.
    /// `inspections/7` -> `https://host/api/inspections/7`.
    pub fn api_url(&self, relative: &str) -> SyncResult<Url> {
        self.url_for(&self.api_path(relative))
    }

    /// Origin-relative path under the API base.
    pub fn api_path(&self, relative: &str) -> String {
        inspekt_core::cache::api_path(&self.remote.api_base, relative)
    }
}

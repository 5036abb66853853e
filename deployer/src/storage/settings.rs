//! Settings file management

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::proxy::reconciler::DEFAULT_ROUTES_PATH;

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Write rolling log files to the layout's logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Document root containing one directory per deployment path
    #[serde(default = "default_sites_dir")]
    pub sites_dir: String,

    /// Reverse proxy admin API
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Git invocation limits
    #[serde(default)]
    pub git: GitSettings,

    /// Staged archive lookup
    #[serde(default)]
    pub archive: ArchiveSettings,

    /// Background deployment worker
    #[serde(default)]
    pub deployer: DeployerSettings,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,
}

fn default_sites_dir() -> String {
    "/var/www/sites".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            sites_dir: default_sites_dir(),
            proxy: ProxySettings::default(),
            git: GitSettings::default(),
            archive: ArchiveSettings::default(),
            deployer: DeployerSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file is absent
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<(), DeployError> {
        Url::parse(&self.proxy.admin_url).map_err(|e| {
            DeployError::ConfigError(format!("Invalid proxy admin_url '{}': {}", self.proxy.admin_url, e))
        })?;
        if !self.proxy.routes_path.starts_with('/') {
            return Err(DeployError::ConfigError(format!(
                "proxy.routes_path must start with '/': {}",
                self.proxy.routes_path
            )));
        }
        if self.sites_dir.trim().is_empty() {
            return Err(DeployError::ConfigError("sites_dir must not be empty".to_string()));
        }
        if self.proxy.request_timeout_secs == 0 || self.git.timeout_secs == 0 {
            return Err(DeployError::ConfigError("timeouts must be greater than zero".to_string()));
        }
        if self.archive.max_attempts == 0 {
            return Err(DeployError::ConfigError("archive.max_attempts must be at least 1".to_string()));
        }
        if self.deployer.max_concurrent == 0 {
            return Err(DeployError::ConfigError("deployer.max_concurrent must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Reverse proxy admin API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Base URL of the admin API
    #[serde(default = "default_admin_url")]
    pub admin_url: String,

    /// Path of the route list that new routes are appended to
    #[serde(default = "default_routes_path")]
    pub routes_path: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_admin_url() -> String {
    "http://localhost:2019".to_string()
}

fn default_routes_path() -> String {
    DEFAULT_ROUTES_PATH.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            admin_url: default_admin_url(),
            routes_path: default_routes_path(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Git settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    /// Ceiling for a single git command in seconds
    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,
}

fn default_git_timeout() -> u64 {
    300
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_git_timeout(),
        }
    }
}

/// Staged archive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Deployment worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerSettings {
    /// Stage chains allowed to run at the same time
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

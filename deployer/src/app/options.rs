//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::archive::ArchiveOptions;
use crate::deploy::git::GitOptions;
use crate::deploy::pipeline::PipelineOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::utils::BackoffOptions;
use crate::workers::deployer;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Pipeline configuration
    pub pipeline: PipelineOptions,

    /// Deployer worker options
    pub deployer: deployer::Options,

    /// Enable local HTTP server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            pipeline: PipelineOptions::default(),
            deployer: deployer::Options::default(),
            enable_server: true,
            server: ServerOptions::default(),
        }
    }
}

impl AppOptions {
    /// Build options from a settings file rooted at `layout`
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let retry_delay = Duration::from_millis(settings.archive.retry_delay_ms);
        let staging_dir = layout.staging_dir().path().to_path_buf();

        Self {
            lifecycle: LifecycleOptions::default(),
            layout,
            pipeline: PipelineOptions {
                sites_dir: PathBuf::from(&settings.sites_dir),
                staging_dir,
                proxy_admin_url: settings.proxy.admin_url.clone(),
                proxy_routes_path: settings.proxy.routes_path.clone(),
                proxy_timeout: Duration::from_secs(settings.proxy.request_timeout_secs),
                git: GitOptions {
                    timeout: Duration::from_secs(settings.git.timeout_secs),
                },
                archive: ArchiveOptions {
                    max_attempts: settings.archive.max_attempts,
                    backoff: BackoffOptions {
                        base_delay: retry_delay,
                        max_delay: retry_delay.max(Duration::from_secs(5)),
                        multiplier: 1.0,
                    },
                },
            },
            deployer: deployer::Options {
                max_concurrent: settings.deployer.max_concurrent,
            },
            enable_server: settings.server.enabled,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
        }
    }
}

/// Lifecycle options for the service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown, including in-flight deployments
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(600),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

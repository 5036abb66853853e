//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// On-disk layout of the service's own state
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the catalog file (projects, git configs, domains)
    pub fn catalog_file(&self) -> File {
        File::new(self.base_dir.join("catalog.json"))
    }

    /// Get the deployment records directory
    pub fn deployments_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("deployments"))
    }

    /// Get the directory uploaded archives are staged in
    pub fn staging_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("staging"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        self.deployments_dir().create().await?;
        self.staging_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/etc/sitedeploy")
    }
}

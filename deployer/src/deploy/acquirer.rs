//! Source acquirer: materializes a deployment source on disk

use std::path::Path;

use crate::deploy::archive::{self, ArchiveOptions};
use crate::deploy::git::{self, GitOptions};
use crate::errors::DeployError;
use crate::models::deployment::DeploymentSource;

/// What the acquire stage produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// Checked-out commit
    Commit(String),

    /// Number of files extracted from the archive
    Extracted(usize),
}

/// Dispatches a [`DeploymentSource`] to the git or archive implementation
#[derive(Debug, Clone, Default)]
pub struct SourceAcquirer {
    git: GitOptions,
    archive: ArchiveOptions,
}

impl SourceAcquirer {
    pub fn new(git: GitOptions, archive: ArchiveOptions) -> Self {
        Self { git, archive }
    }

    /// Fetch `source` into `destination`
    pub async fn acquire(
        &self,
        source: &DeploymentSource,
        destination: &Path,
    ) -> Result<Acquired, DeployError> {
        match source {
            DeploymentSource::Git(reference) => {
                git::sync_repository(reference, destination, &self.git)
                    .await
                    .map(Acquired::Commit)
            }
            DeploymentSource::Archive { staged_path } => {
                archive::deploy_archive(staged_path, destination, &self.archive)
                    .await
                    .map(Acquired::Extracted)
            }
        }
    }
}

//! Archive mode of the source acquirer

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::utils::{calc_exp_backoff, BackoffOptions};

/// Archive extraction options
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// How many times the staged archive is looked up before giving up
    pub max_attempts: u32,

    /// Wait between lookups
    pub backoff: BackoffOptions,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffOptions::default(),
        }
    }
}

/// Extract a staged zip archive into `target_dir`, replacing its contents.
///
/// The staged archive is removed afterwards whether extraction succeeded
/// or not. Returns the number of extracted files.
pub async fn deploy_archive(
    staged_path: &Path,
    target_dir: &Path,
    options: &ArchiveOptions,
) -> Result<usize, DeployError> {
    info!(
        "Deploying archive {} to {}",
        staged_path.display(),
        target_dir.display()
    );

    let staged = File::new(staged_path);
    wait_for_archive(&staged, options).await?;

    let result = extract_into(staged_path, target_dir).await;

    if let Err(e) = staged.delete().await {
        warn!("Failed to remove staged archive {}: {}", staged_path.display(), e);
    } else {
        debug!("Removed staged archive {}", staged_path.display());
    }

    let extracted = result?;
    info!("Extracted {} files into {}", extracted, target_dir.display());
    Ok(extracted)
}

/// Staging can lag the trigger, so the lookup is retried a few times
async fn wait_for_archive(staged: &File, options: &ArchiveOptions) -> Result<(), DeployError> {
    let attempts = options.max_attempts.max(1);

    for attempt in 1..=attempts {
        if staged.exists().await {
            return Ok(());
        }
        if attempt < attempts {
            let delay = calc_exp_backoff(&options.backoff, attempt - 1);
            debug!(
                "Staged archive {} not found (attempt {}/{}), retrying in {:?}",
                staged.path().display(),
                attempt,
                attempts,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(DeployError::Acquisition(format!(
        "Staged archive not found after {} attempts: {}",
        attempts,
        staged.path().display()
    )))
}

async fn extract_into(staged_path: &Path, target_dir: &Path) -> Result<usize, DeployError> {
    Dir::new(target_dir).reset().await.map_err(|e| {
        DeployError::Acquisition(format!(
            "Failed to prepare {}: {}",
            target_dir.display(),
            e
        ))
    })?;

    let archive = staged_path.to_path_buf();
    let dest = target_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
        .await
        .map_err(|e| DeployError::Acquisition(format!("Extraction task failed: {}", e)))?
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<usize, DeployError> {
    let file = std::fs::File::open(archive_path).map_err(|e| {
        DeployError::Acquisition(format!(
            "Failed to open archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        DeployError::Acquisition(format!(
            "Could not read {} as a zip archive, it may be corrupt: {}",
            archive_path.display(),
            e
        ))
    })?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DeployError::Acquisition(format!("Failed to read zip entry {}: {}", i, e)))?;

        // Skip entries that would escape the destination
        let outpath: PathBuf = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                warn!("Skipping unsafe zip entry: {}", entry.name());
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| write_error(&outpath, e))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_error(parent, e))?;
        }
        let mut outfile = std::fs::File::create(&outpath).map_err(|e| write_error(&outpath, e))?;
        io::copy(&mut entry, &mut outfile).map_err(|e| {
            DeployError::Acquisition(format!("Failed to extract {}: {}", entry.name(), e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }

        extracted += 1;
    }

    Ok(extracted)
}

fn write_error(path: &Path, e: io::Error) -> DeployError {
    DeployError::Acquisition(format!("Failed to write {}: {}", path.display(), e))
}

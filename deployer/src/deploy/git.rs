//! Git mode of the source acquirer

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::models::project::GitReference;

/// Git command options
#[derive(Debug, Clone)]
pub struct GitOptions {
    /// Ceiling for a single git invocation
    pub timeout: Duration,
}

impl Default for GitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
        }
    }
}

/// Make `target_dir` a working copy of the requested branch tip.
///
/// A matching working copy is fetched and hard-reset; anything else at the
/// destination is removed and replaced by a shallow clone. Returns the
/// checked-out commit hash.
pub async fn sync_repository(
    reference: &GitReference,
    target_dir: &Path,
    options: &GitOptions,
) -> Result<String, DeployError> {
    info!(
        "Syncing Git repository: {} (branch: {}) to {}",
        reference.repository_url,
        reference.branch,
        target_dir.display()
    );

    if working_copy_matches(target_dir, reference, options).await {
        debug!("Working copy matches remote and branch, updating in place...");
        update_repository(target_dir, &reference.branch, options).await?;
    } else {
        let dir = Dir::new(target_dir);
        if dir.exists().await {
            warn!(
                "Existing content at {} does not match the requested repository, recloning",
                target_dir.display()
            );
            dir.delete().await.map_err(|e| {
                DeployError::Acquisition(format!(
                    "Failed to remove stale checkout {}: {}",
                    target_dir.display(),
                    e
                ))
            })?;
        }
        clone_repository(reference, target_dir, options).await?;
    }

    let commit = run_git(target_dir, &["rev-parse", "HEAD"], options).await?;
    info!("Successfully synced Git repository at {}", commit);
    Ok(commit)
}

/// Shallow single-branch clone directly into `target_dir`
pub async fn clone_repository(
    reference: &GitReference,
    target_dir: &Path,
    options: &GitOptions,
) -> Result<(), DeployError> {
    if let Some(parent) = target_dir.parent() {
        Dir::new(parent).create().await.map_err(|e| {
            DeployError::Acquisition(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    debug!("Cloning repository to {}...", target_dir.display());
    let target = target_dir.to_string_lossy();
    let args = [
        "clone",
        "--depth",
        "1",
        "--single-branch",
        "--branch",
        reference.branch.as_str(),
        reference.repository_url.as_str(),
        target.as_ref(),
    ];

    if let Err(e) = run_git(Path::new("."), &args, options).await {
        // Leave a clean slate for the next attempt
        if let Err(cleanup) = Dir::new(target_dir).delete().await {
            warn!("Failed to clean up partial clone {}: {}", target_dir.display(), cleanup);
        }
        return Err(e);
    }

    Ok(())
}

/// Fetch the branch and discard any local drift
pub async fn update_repository(
    target_dir: &Path,
    branch: &str,
    options: &GitOptions,
) -> Result<(), DeployError> {
    run_git(target_dir, &["fetch", "--depth", "1", "origin", branch], options).await?;
    let remote_ref = format!("origin/{}", branch);
    run_git(target_dir, &["reset", "--hard", remote_ref.as_str()], options).await?;
    Ok(())
}

/// Whether `path` is a working copy of the same remote, on the same branch
pub async fn working_copy_matches(path: &Path, reference: &GitReference, options: &GitOptions) -> bool {
    if !Dir::new(path.join(".git")).exists().await {
        return false;
    }

    let remote = match run_git(path, &["config", "--get", "remote.origin.url"], options).await {
        Ok(url) => url,
        Err(_) => return false,
    };
    if normalize_url(&remote) != normalize_url(&reference.repository_url) {
        debug!("Remote URL differs: {} != {}", remote, reference.repository_url);
        return false;
    }

    match run_git(path, &["rev-parse", "--abbrev-ref", "HEAD"], options).await {
        Ok(branch) => branch == reference.branch,
        Err(_) => false,
    }
}

/// Compare remotes loosely: trailing slashes and `.git` suffix are ignored
pub fn normalize_url(url: &str) -> &str {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed.strip_suffix(".git").unwrap_or(trimmed)
}

async fn run_git(cwd: &Path, args: &[&str], options: &GitOptions) -> Result<String, DeployError> {
    debug!("Running git {}", args.join(" "));

    let child = Command::new("git")
        .current_dir(cwd)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DeployError::Acquisition(format!("Failed to run git {}: {}", args[0], e)))?;

    let output = tokio::time::timeout(options.timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            DeployError::Acquisition(format!(
                "git {} timed out after {:?}",
                args[0], options.timeout
            ))
        })?
        .map_err(|e| DeployError::Acquisition(format!("Failed to run git {}: {}", args[0], e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeployError::Acquisition(format!(
            "git {} failed ({}): {}",
            args[0],
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

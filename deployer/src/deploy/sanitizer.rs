//! Static sanitizer: turns an acquired source tree into a servable one

use std::path::Path;

use tracing::{debug, info};

use crate::errors::DeployError;
use crate::filesys::dir::Dir;

/// Extensions that may be served publicly
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "html", "htm", "css", "js", "mjs", "map", "json", "xml", "txt", "webmanifest",
    "ico", "jpg", "jpeg", "png", "gif", "webp", "svg", "avif", "bmp",
    "woff", "woff2", "ttf", "eot", "otf",
    "mp4", "webm", "ogv", "mp3", "wav", "ogg", "pdf",
];

/// Directories removed from the tree root unconditionally
pub const BLOCKED_DIRECTORIES: &[&str] = &[
    ".git", ".github", ".vscode", ".idea", "node_modules", "vendor", "__MACOSX",
];

/// Summary of a sanitize run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub promoted: bool,
    pub removed_dirs: usize,
    pub removed_files: usize,
}

/// Promotes the build output and strips non-servable content
#[derive(Debug, Clone, Default)]
pub struct Sanitizer;

impl Sanitizer {
    pub fn new() -> Self {
        Self
    }

    /// Sanitize `tree_root`, optionally promoting `build_subdirectory` to the root first
    pub async fn sanitize(
        &self,
        tree_root: &Path,
        build_subdirectory: Option<&str>,
    ) -> Result<SanitizeReport, DeployError> {
        let root = Dir::new(tree_root);
        if !root.exists().await {
            return Err(DeployError::Sanitization(format!(
                "Deployment directory does not exist: {}",
                tree_root.display()
            )));
        }

        let mut report = SanitizeReport::default();

        let subdir = build_subdirectory.map(|s| s.trim_matches('/')).unwrap_or("");
        if !subdir.is_empty() {
            promote_subdirectory(&root, subdir).await?;
            report.promoted = true;
        }

        report.removed_dirs = remove_blocked_directories(&root).await?;
        report.removed_files = remove_disallowed_files(&root).await?;

        info!(
            "Sanitized {}: promoted={}, removed {} directories and {} files",
            tree_root.display(),
            report.promoted,
            report.removed_dirs,
            report.removed_files
        );
        Ok(report)
    }
}

/// Whether a file name carries an allowed extension
pub fn is_servable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Move `root/subdir` aside, clear `root`, then copy the content back.
///
/// The subdirectory lives inside the tree being cleared, so it has to be
/// parked in a sibling location first.
async fn promote_subdirectory(root: &Dir, subdir: &str) -> Result<(), DeployError> {
    let source = root.subdir(subdir);
    if !source.exists().await {
        return Err(DeployError::Sanitization(format!(
            "Build directory '{}' does not exist. Check the project's base directory setting \
             or that the build output was committed.",
            subdir
        )));
    }

    let mut temp_name = root
        .path()
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    temp_name.push(format!("_promote_{}", uuid::Uuid::new_v4().simple()));
    let temp_path = root.path().with_file_name(temp_name);

    debug!("Promoting /{} via {}", subdir, temp_path.display());
    let parked = source
        .rename_to(&temp_path)
        .await
        .map_err(|e| sanitize_error("move build directory aside", e))?;
    root.clear()
        .await
        .map_err(|e| sanitize_error("clear deployment directory", e))?;
    parked
        .copy_contents_to(root)
        .await
        .map_err(|e| sanitize_error("restore build directory", e))?;
    parked
        .delete()
        .await
        .map_err(|e| sanitize_error("remove temporary directory", e))?;

    Ok(())
}

async fn remove_blocked_directories(root: &Dir) -> Result<usize, DeployError> {
    let mut removed = 0;
    for name in BLOCKED_DIRECTORIES {
        let dir = root.subdir(name);
        if dir.exists().await {
            debug!("Removing {}", dir.path().display());
            dir.delete()
                .await
                .map_err(|e| sanitize_error("remove blocked directory", e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

async fn remove_disallowed_files(root: &Dir) -> Result<usize, DeployError> {
    let files = root
        .walk_files()
        .await
        .map_err(|e| sanitize_error("scan deployment directory", e))?;

    let mut removed = 0;
    for path in files.iter().filter(|path| !is_servable(path)) {
        debug!("Removing non-static file {}", path.display());
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| sanitize_error("remove file", e.into()))?;
        removed += 1;
    }
    Ok(removed)
}

fn sanitize_error(action: &str, e: DeployError) -> DeployError {
    DeployError::Sanitization(format!("Failed to {}: {}", action, e))
}

//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::errors::DeployError;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), DeployError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), DeployError> {
        if fs::symlink_metadata(&self.path).await.is_ok() {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Remove everything inside the directory, keeping the directory itself
    pub async fn clear(&self) -> Result<(), DeployError> {
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_file(&path).await?;
            }
        }

        Ok(())
    }

    /// Ensure the directory exists and is empty
    pub async fn reset(&self) -> Result<(), DeployError> {
        if self.exists().await {
            self.clear().await
        } else {
            self.create().await
        }
    }

    /// List files in the directory
    pub async fn list_files(&self) -> Result<Vec<PathBuf>, DeployError> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.path).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }

        Ok(files)
    }

    /// Recursively list every non-directory entry below this directory.
    ///
    /// Symbolic links are reported as entries and never followed.
    pub async fn walk_files(&self) -> Result<Vec<PathBuf>, DeployError> {
        let mut files = Vec::new();
        let mut pending = vec![self.path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    pending.push(entry.path());
                } else {
                    files.push(entry.path());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Recursively copy the contents of this directory into `dest`
    pub async fn copy_contents_to(&self, dest: &Dir) -> Result<(), DeployError> {
        dest.create().await?;
        let mut pending = vec![(self.path.clone(), dest.path.clone())];

        while let Some((from, to)) = pending.pop() {
            let mut entries = fs::read_dir(&from).await?;
            while let Some(entry) = entries.next_entry().await? {
                let target = to.join(entry.file_name());
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    fs::create_dir_all(&target).await?;
                    pending.push((entry.path(), target));
                } else if file_type.is_file() {
                    fs::copy(entry.path(), &target).await?;
                }
            }
        }

        Ok(())
    }

    /// Move the directory to a new location
    pub async fn rename_to(&self, dest: impl Into<PathBuf>) -> Result<Dir, DeployError> {
        let dest = dest.into();
        fs::rename(&self.path, &dest).await?;
        Ok(Dir::new(dest))
    }

    /// Get a file within this directory
    pub fn file(&self, name: &str) -> crate::filesys::file::File {
        crate::filesys::file::File::new(self.path.join(name))
    }

    /// Get a subdirectory
    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }
}

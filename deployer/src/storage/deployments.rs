//! File-backed deployment records
//!
//! Each deployment lives in `<dir>/<id>.json`. Every mutation takes an
//! exclusive lock on `<dir>/<id>.lock`, re-reads the record from disk,
//! applies the change and writes it back atomically, so concurrent
//! writers (including other processes) never lose log lines.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use fs2::FileExt;
use tracing::debug;
use uuid::Uuid;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::{Deployment, DeploymentStatus, LogEntry};

/// Persistent store of deployment records
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    dir: Dir,
}

impl DeploymentStore {
    pub fn new(dir: Dir) -> Self {
        Self { dir }
    }

    /// Record ids are UUIDs; anything else never names a record.
    fn check_id(id: &str) -> Result<(), DeployError> {
        Uuid::parse_str(id)
            .map(|_| ())
            .map_err(|_| DeployError::NotFound(format!("Deployment {} not found", id)))
    }

    fn record_file(&self, id: &str) -> File {
        self.dir.file(&format!("{}.json", id))
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.dir.path().join(format!("{}.lock", id))
    }

    /// Acquire the record's lock. The lock is released when the handle drops.
    async fn lock(&self, id: &str) -> Result<fs::File, DeployError> {
        Self::check_id(id)?;
        let lock_path = self.lock_path(id);
        tokio::task::spawn_blocking(move || {
            let lock_file = fs::File::create(&lock_path)?;
            lock_file.lock_exclusive()?;
            Ok::<_, std::io::Error>(lock_file)
        })
        .await
        .map_err(|e| DeployError::StorageError(format!("Lock task failed: {}", e)))?
        .map_err(|e| DeployError::StorageError(format!("Failed to lock deployment {}: {}", id, e)))
    }

    /// Persist a new deployment record
    pub async fn insert(&self, deployment: &Deployment) -> Result<(), DeployError> {
        self.dir.create().await?;
        let lock = self.lock(&deployment.id).await?;
        let result = self.record_file(&deployment.id).write_json(deployment).await;
        drop(lock);
        result
    }

    /// Read a deployment from disk
    pub async fn get(&self, id: &str) -> Result<Deployment, DeployError> {
        Self::check_id(id)?;
        let file = self.record_file(id);
        if !file.exists().await {
            return Err(DeployError::NotFound(format!("Deployment {} not found", id)));
        }
        file.read_json().await
    }

    /// Every readable record, in no particular order
    pub async fn list_all(&self) -> Result<Vec<Deployment>, DeployError> {
        if !self.dir.exists().await {
            return Ok(Vec::new());
        }

        let mut deployments = Vec::new();
        for path in self.dir.list_files().await? {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match File::new(&path).read_json::<Deployment>().await {
                Ok(deployment) => deployments.push(deployment),
                Err(e) => debug!("Skipping unreadable deployment record {:?}: {}", path, e),
            }
        }
        Ok(deployments)
    }

    /// All deployments of a project, newest first
    pub async fn list_by_project(&self, project_id: &str) -> Result<Vec<Deployment>, DeployError> {
        let mut deployments = self
            .list_all()
            .await?
            .into_iter()
            .filter(|d| d.project_id == project_id)
            .collect::<Vec<_>>();

        deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(deployments)
    }

    /// Append one timestamped line to the deployment's log
    pub async fn append_log(
        &self,
        id: &str,
        message: impl Into<String>,
    ) -> Result<Deployment, DeployError> {
        let entry = LogEntry::now(message);
        self.update(id, move |deployment| {
            deployment.log.push(entry);
            Ok(())
        })
        .await
    }

    /// Apply a status event, recording timing fields along the way
    pub async fn transition(
        &self,
        id: &str,
        event: DeploymentEvent,
    ) -> Result<Deployment, DeployError> {
        self.update(id, move |deployment| {
            let mut fsm = DeploymentFsm::from_status(deployment.status);
            let status = fsm.process(event)?;
            let now = Utc::now();

            deployment.status = status;
            if status == DeploymentStatus::Processing {
                deployment.started_at = Some(now);
            }
            if status.is_terminal() {
                let began = deployment.started_at.unwrap_or(deployment.created_at);
                deployment.finished_at = Some(now);
                deployment.duration_ms = Some((now - began).num_milliseconds().max(0) as u64);
            }
            Ok(())
        })
        .await
    }

    async fn update<F>(&self, id: &str, apply: F) -> Result<Deployment, DeployError>
    where
        F: FnOnce(&mut Deployment) -> Result<(), DeployError>,
    {
        let lock = self.lock(id).await?;
        let result = async {
            let mut deployment = self.get(id).await?;
            apply(&mut deployment)?;
            self.record_file(id).write_json(&deployment).await?;
            Ok(deployment)
        }
        .await;
        drop(lock);
        result
    }
}

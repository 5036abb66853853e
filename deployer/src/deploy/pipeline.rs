//! Deployment orchestrator
//!
//! Requests create a pending record and enqueue a [`DeployJob`]. The
//! deployer worker later calls [`Pipeline::execute`], which runs the stage
//! chain for that deployment and records progress in its log.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::deploy::acquirer::{Acquired, SourceAcquirer};
use crate::deploy::archive::ArchiveOptions;
use crate::deploy::fsm::DeploymentEvent;
use crate::deploy::git::GitOptions;
use crate::deploy::sanitizer::Sanitizer;
use crate::errors::DeployError;
use crate::models::deployment::{
    DeployJob, Deployment, DeploymentSource, DeploymentStatus, LogEntry,
};
use crate::models::project::Project;
use crate::proxy::client::ProxyClient;
use crate::proxy::reconciler::{Reconciler, DEFAULT_ROUTES_PATH};
use crate::storage::catalog::Catalog;
use crate::storage::deployments::DeploymentStore;
use crate::utils::deployment_path_for;

/// One step of the deployment chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Sanitize,
    Reconcile,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Sanitize => "sanitize",
            Stage::Reconcile => "reconcile",
        }
    }
}

/// Stages run for every deployment, in order
pub const STAGES: [Stage; 3] = [Stage::Acquire, Stage::Sanitize, Stage::Reconcile];

/// Pipeline construction options
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory holding one served directory per deployment path
    pub sites_dir: PathBuf,

    /// Directory uploaded archives must be staged in
    pub staging_dir: PathBuf,

    pub proxy_admin_url: String,
    pub proxy_routes_path: String,
    pub proxy_timeout: Duration,

    pub git: GitOptions,
    pub archive: ArchiveOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            sites_dir: PathBuf::from("/var/www/sites"),
            staging_dir: PathBuf::from("/etc/sitedeploy/staging"),
            proxy_admin_url: "http://localhost:2019".to_string(),
            proxy_routes_path: DEFAULT_ROUTES_PATH.to_string(),
            proxy_timeout: Duration::from_secs(10),
            git: GitOptions::default(),
            archive: ArchiveOptions::default(),
        }
    }
}

/// Outcome of [`Pipeline::recover`]
#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub requeued: Vec<String>,
    pub interrupted: Vec<String>,
}

/// Deployment orchestrator
pub struct Pipeline {
    store: DeploymentStore,
    catalog: Arc<dyn Catalog>,
    acquirer: SourceAcquirer,
    sanitizer: Sanitizer,
    reconciler: Reconciler,
    sites_dir: PathBuf,
    staging_dir: PathBuf,
    queue: mpsc::UnboundedSender<DeployJob>,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        store: DeploymentStore,
        catalog: Arc<dyn Catalog>,
        queue: mpsc::UnboundedSender<DeployJob>,
    ) -> Result<Self, DeployError> {
        let client = ProxyClient::new(&options.proxy_admin_url, options.proxy_timeout)?;

        Ok(Self {
            store,
            catalog,
            acquirer: SourceAcquirer::new(options.git, options.archive),
            sanitizer: Sanitizer::new(),
            reconciler: Reconciler::new(client, options.proxy_routes_path),
            sites_dir: options.sites_dir,
            staging_dir: options.staging_dir,
            queue,
        })
    }

    pub fn store(&self) -> &DeploymentStore {
        &self.store
    }

    /// Directory a deployment is served from
    pub fn served_dir(&self, deployment: &Deployment) -> PathBuf {
        self.sites_dir.join(&deployment.deployment_path)
    }

    /// Request a deployment from the project's git repository
    pub async fn request_git_deploy(&self, project_id: &str) -> Result<Deployment, DeployError> {
        let project = self.find_project(project_id).await?;

        let reference = self
            .catalog
            .git_reference(project_id)
            .await?
            .filter(|r| !r.repository_url.trim().is_empty())
            .ok_or_else(|| {
                DeployError::Precondition(format!(
                    "Project {} has no git repository configured",
                    project_id
                ))
            })?;

        self.ensure_active_domains(project_id).await?;
        self.create(&project, DeploymentSource::Git(reference)).await
    }

    /// Request a deployment from an archive that was already staged on disk.
    ///
    /// The archive must sit directly inside the staging directory; the file
    /// itself may still be in flight.
    pub async fn request_archive_deploy(
        &self,
        project_id: &str,
        staged_archive_path: impl Into<PathBuf>,
    ) -> Result<Deployment, DeployError> {
        let project = self.find_project(project_id).await?;
        let staged_path = self.resolve_staged_path(&staged_archive_path.into()).await?;
        self.ensure_active_domains(project_id).await?;

        let source = DeploymentSource::Archive { staged_path };
        self.create(&project, source).await
    }

    /// Deployments of a project, newest first
    pub async fn list_deployments(&self, project_id: &str) -> Result<Vec<Deployment>, DeployError> {
        self.store.list_by_project(project_id).await
    }

    /// Newest successful deployment of a project, if any
    pub async fn latest_successful(
        &self,
        project_id: &str,
    ) -> Result<Option<Deployment>, DeployError> {
        let deployments = self.store.list_by_project(project_id).await?;
        Ok(deployments
            .into_iter()
            .find(|d| d.status == DeploymentStatus::Success))
    }

    pub async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment, DeployError> {
        self.store.get(deployment_id).await
    }

    /// Pick up records left behind by a previous run.
    ///
    /// Pending deployments are queued again. Deployments that were
    /// processing when the process stopped are marked failed.
    pub async fn recover(&self) -> Result<RecoveryReport, DeployError> {
        let mut report = RecoveryReport::default();

        let mut deployments = self.store.list_all().await?;
        deployments.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        for deployment in deployments {
            match deployment.status {
                DeploymentStatus::Pending => {
                    let job = DeployJob {
                        deployment_id: deployment.id.clone(),
                    };
                    if self.queue.send(job).is_err() {
                        return Err(DeployError::ShutdownError(
                            "Deployment queue is closed".to_string(),
                        ));
                    }
                    report.requeued.push(deployment.id);
                }
                DeploymentStatus::Processing => {
                    let reason = "Deployment interrupted by restart".to_string();
                    self.store.append_log(&deployment.id, reason.clone()).await?;
                    self.store
                        .transition(&deployment.id, DeploymentEvent::Fail(reason))
                        .await?;
                    report.interrupted.push(deployment.id);
                }
                _ => {}
            }
        }

        if !report.requeued.is_empty() || !report.interrupted.is_empty() {
            info!(
                "Recovered deployments: {} requeued, {} interrupted",
                report.requeued.len(),
                report.interrupted.len()
            );
        }
        Ok(report)
    }

    async fn find_project(&self, project_id: &str) -> Result<Project, DeployError> {
        self.catalog
            .project(project_id)
            .await?
            .ok_or_else(|| DeployError::NotFound(format!("Project {} not found", project_id)))
    }

    async fn resolve_staged_path(&self, path: &Path) -> Result<PathBuf, DeployError> {
        let rejected = || {
            DeployError::Precondition(format!(
                "Archive {} is not inside the staging directory",
                path.display()
            ))
        };

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(rejected());
        }
        let file_name = path.file_name().ok_or_else(rejected)?;
        let parent = path.parent().ok_or_else(rejected)?;

        let staging = tokio::fs::canonicalize(&self.staging_dir).await.map_err(|e| {
            DeployError::Precondition(format!(
                "Staging directory {} is unavailable: {}",
                self.staging_dir.display(),
                e
            ))
        })?;
        let parent = tokio::fs::canonicalize(parent).await.map_err(|_| rejected())?;
        if parent != staging {
            return Err(rejected());
        }

        let staged = parent.join(file_name);
        if tokio::fs::symlink_metadata(&staged)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(rejected());
        }
        Ok(staged)
    }

    async fn ensure_active_domains(&self, project_id: &str) -> Result<(), DeployError> {
        if self.catalog.active_domains(project_id).await?.is_empty() {
            return Err(DeployError::Precondition(format!(
                "Project {} has no active domains",
                project_id
            )));
        }
        Ok(())
    }

    async fn create(
        &self,
        project: &Project,
        source: DeploymentSource,
    ) -> Result<Deployment, DeployError> {
        let mut deployment =
            Deployment::new(&project.id, source, deployment_path_for(&project.name));
        deployment.log.push(LogEntry::now(format!(
            "Deployment queued from {} source",
            deployment.source_type.as_str()
        )));
        self.store.insert(&deployment).await?;

        info!(
            "Created deployment {} for project {} at {}",
            deployment.id, project.id, deployment.deployment_path
        );

        let job = DeployJob {
            deployment_id: deployment.id.clone(),
        };
        if self.queue.send(job).is_err() {
            let reason = "Deployment queue is closed".to_string();
            self.store.append_log(&deployment.id, reason.clone()).await?;
            self.store
                .transition(&deployment.id, DeploymentEvent::Fail(reason.clone()))
                .await?;
            return Err(DeployError::ShutdownError(reason));
        }

        Ok(deployment)
    }

    /// Run the stage chain for a queued deployment.
    ///
    /// Failures end up in the deployment record, never in the caller.
    pub async fn execute(&self, job: &DeployJob) {
        if let Err(e) = self.run_chain(&job.deployment_id).await {
            error!("Deployment {} could not be processed: {}", job.deployment_id, e);
            if let Err(e) = self
                .store
                .transition(&job.deployment_id, DeploymentEvent::Fail(e.to_string()))
                .await
            {
                warn!(
                    "Failed to mark deployment {} as failed: {}",
                    job.deployment_id, e
                );
            }
        }
    }

    async fn run_chain(&self, deployment_id: &str) -> Result<(), DeployError> {
        let deployment = self.store.get(deployment_id).await?;
        if deployment.status != DeploymentStatus::Pending {
            warn!(
                "Skipping deployment {} in status {:?}",
                deployment_id, deployment.status
            );
            return Ok(());
        }

        self.store.transition(deployment_id, DeploymentEvent::Start).await?;
        self.store.append_log(deployment_id, "Deployment started").await?;
        info!("Running deployment {}", deployment_id);

        for stage in STAGES {
            if let Err(e) = self.run_stage(stage, &deployment).await {
                error!("Deployment {} failed at {}: {}", deployment_id, stage.name(), e);
                self.store
                    .append_log(deployment_id, format!("Deployment failed: {}", e))
                    .await?;
                self.store
                    .transition(deployment_id, DeploymentEvent::Fail(e.to_string()))
                    .await?;
                return Ok(());
            }
        }

        self.store
            .append_log(deployment_id, "Deployment finished successfully")
            .await?;
        let done = self.store.transition(deployment_id, DeploymentEvent::Succeed).await?;
        info!(
            "Deployment {} succeeded in {} ms",
            deployment_id,
            done.duration_ms.unwrap_or_default()
        );
        Ok(())
    }

    async fn run_stage(&self, stage: Stage, deployment: &Deployment) -> Result<(), DeployError> {
        let served_dir = self.served_dir(deployment);
        match stage {
            Stage::Acquire => self.acquire(deployment, &served_dir).await,
            Stage::Sanitize => self.sanitize(deployment, &served_dir).await,
            Stage::Reconcile => self.reconcile(deployment, &served_dir).await,
        }
    }

    async fn acquire(&self, deployment: &Deployment, served_dir: &Path) -> Result<(), DeployError> {
        let id = deployment.id.as_str();
        match &deployment.source {
            DeploymentSource::Git(reference) => {
                self.store
                    .append_log(
                        id,
                        format!(
                            "Fetching {} (branch {})",
                            reference.repository_url, reference.branch
                        ),
                    )
                    .await?;
            }
            DeploymentSource::Archive { .. } => {
                self.store.append_log(id, "Extracting uploaded archive").await?;
            }
        }

        let message = match self.acquirer.acquire(&deployment.source, served_dir).await? {
            Acquired::Commit(commit) => {
                format!("Checked out commit {}", commit.chars().take(12).collect::<String>())
            }
            Acquired::Extracted(count) => format!("Extracted {} files", count),
        };
        self.store.append_log(id, message).await?;
        Ok(())
    }

    async fn sanitize(&self, deployment: &Deployment, served_dir: &Path) -> Result<(), DeployError> {
        let id = deployment.id.as_str();
        let subdirectory = deployment.source.build_subdirectory();
        match subdirectory {
            Some(dir) => {
                self.store
                    .append_log(id, format!("Preparing static files from {}", dir))
                    .await?
            }
            None => self.store.append_log(id, "Preparing static files").await?,
        };

        let report = self.sanitizer.sanitize(served_dir, subdirectory).await?;
        self.store
            .append_log(
                id,
                format!(
                    "Removed {} directories and {} files",
                    report.removed_dirs, report.removed_files
                ),
            )
            .await?;
        Ok(())
    }

    async fn reconcile(&self, deployment: &Deployment, served_dir: &Path) -> Result<(), DeployError> {
        let id = deployment.id.as_str();
        let domains = self.catalog.active_domains(&deployment.project_id).await?;
        if domains.is_empty() {
            return Err(DeployError::Precondition(format!(
                "Project {} has no active domains",
                deployment.project_id
            )));
        }

        let listed = domains.iter().cloned().collect::<Vec<_>>().join(", ");
        self.store
            .append_log(id, format!("Configuring domains: {}", listed))
            .await?;

        let root = served_dir.to_string_lossy();
        let report = self.reconciler.sync_domains(&domains, &root).await?;
        self.store
            .append_log(
                id,
                format!(
                    "Domains configured: {} created, {} updated, {} removed, {} unchanged",
                    report.created.len(),
                    report.updated.len(),
                    report.removed.len(),
                    report.unchanged.len()
                ),
            )
            .await?;
        Ok(())
    }
}

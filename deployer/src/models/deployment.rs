//! Deployment models

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::project::GitReference;

/// Where a deployment's content comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Git,
    Archive,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Git => "git",
            SourceType::Archive => "archive",
        }
    }
}

/// Source input for the acquire stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DeploymentSource {
    /// Clone or update a remote repository
    Git(GitReference),

    /// Extract a previously staged zip archive
    Archive { staged_path: PathBuf },
}

impl DeploymentSource {
    pub fn source_type(&self) -> SourceType {
        match self {
            DeploymentSource::Git(_) => SourceType::Git,
            DeploymentSource::Archive { .. } => SourceType::Archive,
        }
    }

    /// Subdirectory to promote during sanitization. Archives are served as-is.
    pub fn build_subdirectory(&self) -> Option<&str> {
        match self {
            DeploymentSource::Git(reference) => reference.base_directory.as_deref(),
            DeploymentSource::Archive { .. } => None,
        }
    }
}

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }
}

/// One timestamped line of a deployment log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// A single attempt to publish a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Owning project
    pub project_id: String,

    /// Fixed at creation
    pub source_type: SourceType,

    /// Acquire stage input
    pub source: DeploymentSource,

    /// Current status
    pub status: DeploymentStatus,

    /// Served directory name relative to the sites directory
    pub deployment_path: String,

    /// Append-only execution log
    #[serde(default)]
    pub log: Vec<LogEntry>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    /// Set once the deployment reaches a terminal status
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl Deployment {
    /// Create a new pending deployment
    pub fn new(
        project_id: impl Into<String>,
        source: DeploymentSource,
        deployment_path: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            project_id: project_id.into(),
            source_type: source.source_type(),
            source,
            status: DeploymentStatus::Pending,
            deployment_path: deployment_path.into(),
            log: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
        }
    }

    /// Log lines rendered as `[HH:MM:SS] message`
    pub fn log_lines(&self) -> Vec<String> {
        self.log.iter().map(|entry| entry.to_string()).collect()
    }
}

/// Queue message asking the worker to run a deployment's stage chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployJob {
    pub deployment_id: String,
}

//! Project catalog
//!
//! Projects, their git configuration and their domains are owned by
//! another system. The pipeline only reads them through [`Catalog`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::models::project::{DomainSet, GitReference, Project};

/// Read-only view of projects and their publishing configuration
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn project(&self, project_id: &str) -> Result<Option<Project>, DeployError>;

    async fn git_reference(&self, project_id: &str) -> Result<Option<GitReference>, DeployError>;

    /// Domains that should currently route to the project
    async fn active_domains(&self, project_id: &str) -> Result<DomainSet, DeployError>;
}

/// A domain attached to a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEntry {
    pub domain: String,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// One project entry in `catalog.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub project: Project,

    #[serde(default)]
    pub git: Option<GitReference>,

    #[serde(default)]
    pub domains: Vec<DomainEntry>,
}

impl CatalogEntry {
    pub fn active_domains(&self) -> DomainSet {
        self.domains
            .iter()
            .filter(|d| d.active)
            .map(|d| d.domain.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect()
    }
}

/// Contents of `catalog.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub projects: Vec<CatalogEntry>,
}

impl CatalogData {
    fn entry(&self, project_id: &str) -> Option<&CatalogEntry> {
        self.projects.iter().find(|p| p.project.id == project_id)
    }
}

/// Catalog backed by a JSON file that is re-read on every lookup
#[derive(Debug, Clone)]
pub struct FileCatalog {
    file: File,
}

impl FileCatalog {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    async fn load(&self) -> Result<CatalogData, DeployError> {
        if !self.file.exists().await {
            return Ok(CatalogData::default());
        }
        self.file.read_json().await.map_err(|e| {
            DeployError::StorageError(format!(
                "Failed to read catalog {:?}: {}",
                self.file.path(),
                e
            ))
        })
    }
}

#[async_trait]
impl Catalog for FileCatalog {
    async fn project(&self, project_id: &str) -> Result<Option<Project>, DeployError> {
        Ok(self.load().await?.entry(project_id).map(|e| e.project.clone()))
    }

    async fn git_reference(&self, project_id: &str) -> Result<Option<GitReference>, DeployError> {
        Ok(self.load().await?.entry(project_id).and_then(|e| e.git.clone()))
    }

    async fn active_domains(&self, project_id: &str) -> Result<DomainSet, DeployError> {
        Ok(self
            .load()
            .await?
            .entry(project_id)
            .map(|e| e.active_domains())
            .unwrap_or_default())
    }
}

/// In-memory catalog, mostly useful for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    entries: tokio::sync::RwLock<HashMap<String, CatalogEntry>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, entry: CatalogEntry) {
        self.entries
            .write()
            .await
            .insert(entry.project.id.clone(), entry);
    }

    /// Replace the project's domains with the given active set
    pub async fn set_domains(&self, project_id: &str, domains: &[&str]) {
        if let Some(entry) = self.entries.write().await.get_mut(project_id) {
            entry.domains = domains
                .iter()
                .map(|d| DomainEntry {
                    domain: d.to_string(),
                    active: true,
                })
                .collect();
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn project(&self, project_id: &str) -> Result<Option<Project>, DeployError> {
        Ok(self.entries.read().await.get(project_id).map(|e| e.project.clone()))
    }

    async fn git_reference(&self, project_id: &str) -> Result<Option<GitReference>, DeployError> {
        Ok(self
            .entries
            .read()
            .await
            .get(project_id)
            .and_then(|e| e.git.clone()))
    }

    async fn active_domains(&self, project_id: &str) -> Result<DomainSet, DeployError> {
        Ok(self
            .entries
            .read()
            .await
            .get(project_id)
            .map(|e| e.active_domains())
            .unwrap_or_default())
    }
}

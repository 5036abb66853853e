//! Project-side entities consumed read-only by the pipeline

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A project as resolved from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub owner_id: String,
}

/// Git configuration for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitReference {
    pub repository_url: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Build output to publish, relative to the repository root
    #[serde(default)]
    pub base_directory: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Active domain names for a project
pub type DomainSet = BTreeSet<String>;

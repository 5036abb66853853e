//! Application state management

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::deploy::pipeline::{Pipeline, PipelineOptions};
use crate::errors::DeployError;
use crate::models::deployment::DeployJob;
use crate::storage::catalog::{Catalog, FileCatalog};
use crate::storage::deployments::DeploymentStore;
use crate::storage::layout::StorageLayout;

/// Main application state
pub struct AppState {
    /// Deployment orchestrator shared by the worker and the server
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Initialize application state.
    ///
    /// Returns the receiving end of the deployment queue for the worker,
    /// already holding any deployments left pending by a previous run.
    pub async fn init(
        layout: &StorageLayout,
        options: PipelineOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DeployJob>), DeployError> {
        info!("Initializing application state...");

        layout.setup().await?;

        let store = DeploymentStore::new(layout.deployments_dir());
        let catalog: Arc<dyn Catalog> = Arc::new(FileCatalog::new(layout.catalog_file()));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let pipeline = Arc::new(Pipeline::new(options, store, catalog, queue_tx)?);
        pipeline.recover().await?;

        Ok((Self { pipeline }, queue_rx))
    }
}

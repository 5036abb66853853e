//! Deployment worker: runs queued stage chains

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::deploy::pipeline::Pipeline;
use crate::models::deployment::DeployJob;

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum number of stage chains running at once
    pub max_concurrent: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Run the deployer worker until shutdown or until the queue closes.
///
/// On shutdown no further jobs are taken; chains already started run to
/// completion before this returns.
pub async fn run(
    options: &Options,
    pipeline: Arc<Pipeline>,
    mut queue: mpsc::UnboundedReceiver<DeployJob>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    info!(
        "Deployer worker starting (max {} concurrent deployments)...",
        options.max_concurrent
    );

    let permits = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                break;
            }
            job = queue.recv() => {
                let Some(job) = job else {
                    info!("Deployment queue closed");
                    break;
                };
                debug!("Received deployment job {}", job.deployment_id);

                let pipeline = pipeline.clone();
                let permits = permits.clone();
                in_flight.spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    pipeline.execute(&job).await;
                });
            }
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    error!("Deployment task panicked: {}", e);
                }
            }
        }
    }

    if !in_flight.is_empty() {
        info!("Waiting for {} in-flight deployments...", in_flight.len());
    }
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            error!("Deployment task panicked: {}", e);
        }
    }

    info!("Deployer worker stopped");
}

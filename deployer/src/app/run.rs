//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::DeployError;
use crate::models::deployment::DeployJob;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::deployer;

/// Run the deployment service until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployError> {
    info!("Initializing deployment service...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start deployment service: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, DeployError> {
    let (app_state, queue) = AppState::init(&options.layout, options.pipeline.clone()).await?;
    let app_state = Arc::new(app_state);

    init_deployer_worker(
        options.deployer.clone(),
        app_state.clone(),
        queue,
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    if options.enable_server {
        init_server(
            options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(app_state)
}

fn init_deployer_worker(
    options: deployer::Options,
    app_state: Arc<AppState>,
    queue: mpsc::UnboundedReceiver<DeployJob>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DeployError> {
    info!("Initializing deployer worker...");

    let pipeline = app_state.pipeline.clone();

    let deployer_handle = tokio::spawn(async move {
        deployer::run(
            &options,
            pipeline,
            queue,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_deployer_worker_handle(deployer_handle)
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DeployError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(app_state.pipeline.clone());

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    server_handle: Option<JoinHandle<Result<(), DeployError>>>,
    deployer_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            server_handle: None,
            deployer_worker_handle: None,
        }
    }

    pub fn with_deployer_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), DeployError> {
        if self.deployer_worker_handle.is_some() {
            return Err(DeployError::ShutdownError("deployer_handle already set".to_string()));
        }
        self.deployer_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), DeployError>>,
    ) -> Result<(), DeployError> {
        if self.server_handle.is_some() {
            return Err(DeployError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), DeployError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), DeployError> {
        info!("Shutting down deployment service...");

        // 1. Server stops accepting new requests
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| DeployError::ShutdownError(e.to_string()))??;
        }

        // 2. Deployer worker drains in-flight chains
        if let Some(handle) = self.deployer_worker_handle.take() {
            handle.await.map_err(|e| DeployError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DeployError;
use crate::server::handlers::{
    archive_deploy_handler, get_deployment_handler, git_deploy_handler, health_handler,
    latest_deployment_handler, list_deployments_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route(
            "/projects/{project_id}/deployments",
            get(list_deployments_handler),
        )
        .route(
            "/projects/{project_id}/deployments/latest",
            get(latest_deployment_handler),
        )
        .route(
            "/projects/{project_id}/deployments/git",
            post(git_deploy_handler),
        )
        .route(
            "/projects/{project_id}/deployments/archive",
            post(archive_deploy_handler),
        )
        .route("/deployments/{deployment_id}", get(get_deployment_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployError>>, DeployError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployError::ServerError(e.to_string()))
    });

    Ok(handle)
}

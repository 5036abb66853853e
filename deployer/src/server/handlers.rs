//! HTTP request handlers

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::DeployError;
use crate::models::deployment::Deployment;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "sitedeploy".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Error body returned by every failing handler
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps pipeline errors onto HTTP status codes
#[derive(Debug)]
pub struct ApiError(DeployError);

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DeployError::Precondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DeployError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Deployment as returned by the API
#[derive(Debug, Serialize)]
pub struct DeploymentResponse {
    #[serde(flatten)]
    pub deployment: Deployment,

    /// Log rendered as `[HH:MM:SS] message` lines
    pub log_lines: Vec<String>,
}

impl From<Deployment> for DeploymentResponse {
    fn from(deployment: Deployment) -> Self {
        let log_lines = deployment.log_lines();
        Self {
            deployment,
            log_lines,
        }
    }
}

/// Deployments list response
#[derive(Debug, Serialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<DeploymentResponse>,
    pub total: usize,
}

/// Trigger a git deployment
pub async fn git_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deployment = state.pipeline.request_git_deploy(&project_id).await?;
    Ok((StatusCode::ACCEPTED, Json(DeploymentResponse::from(deployment))))
}

/// Archive deployment request
#[derive(Debug, Deserialize)]
pub struct ArchiveDeployRequest {
    pub staged_archive_path: PathBuf,
}

/// Trigger a deployment from a staged archive
pub async fn archive_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
    Json(request): Json<ArchiveDeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let deployment = state
        .pipeline
        .request_archive_deploy(&project_id, request.staged_archive_path)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(DeploymentResponse::from(deployment))))
}

/// List a project's deployments, newest first
pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deployments = state.pipeline.list_deployments(&project_id).await?;
    let total = deployments.len();
    Ok(Json(DeploymentsResponse {
        deployments: deployments.into_iter().map(DeploymentResponse::from).collect(),
        total,
    }))
}

/// Newest successful deployment of a project
pub async fn latest_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deployment = state
        .pipeline
        .latest_successful(&project_id)
        .await?
        .ok_or_else(|| {
            DeployError::NotFound(format!(
                "Project {} has no successful deployment",
                project_id
            ))
        })?;
    Ok(Json(DeploymentResponse::from(deployment)))
}

/// Get one deployment
pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(deployment_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deployment = state.pipeline.get_deployment(&deployment_id).await?;
    Ok(Json(DeploymentResponse::from(deployment)))
}

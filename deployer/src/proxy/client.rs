//! HTTP client for the reverse proxy's admin API

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::DeployError;

/// Admin API client (Caddy-style `/config/...` and `/id/{id}` endpoints)
#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: Client,
    base_url: String,
}

impl ProxyClient {
    /// Create a new admin API client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeployError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the route list at `routes_path`. A missing list is empty.
    pub async fn list_routes(&self, routes_path: &str) -> Result<Vec<Value>, DeployError> {
        let url = format!("{}{}", self.base_url, routes_path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(unreachable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = ensure_success("GET", &url, response).await?;

        let body: Value = response.json().await.map_err(|e| {
            DeployError::Reconciliation(format!("Malformed route list from {}: {}", url, e))
        })?;
        match body {
            Value::Array(routes) => Ok(routes),
            Value::Null => Ok(Vec::new()),
            other => Err(DeployError::Reconciliation(format!(
                "Expected a route list from {}, got: {}",
                url, other
            ))),
        }
    }

    /// Fetch a route by id, `None` if the proxy does not know it
    pub async fn get_route(&self, route_id: &str) -> Result<Option<Value>, DeployError> {
        let url = self.id_url(route_id);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(unreachable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success("GET", &url, response).await?;

        let body = response.json().await.map_err(|e| {
            DeployError::Reconciliation(format!("Malformed route from {}: {}", url, e))
        })?;
        Ok(Some(body))
    }

    /// Append a new route to the collection at `routes_path`
    pub async fn create_route<B: Serialize>(&self, routes_path: &str, route: &B) -> Result<(), DeployError> {
        let url = format!("{}{}", self.base_url, routes_path);
        debug!("POST {}", url);

        let response = self.client.post(&url).json(route).send().await.map_err(unreachable)?;
        ensure_success("POST", &url, response).await?;
        Ok(())
    }

    /// Replace an existing route in place
    pub async fn replace_route<B: Serialize>(&self, route_id: &str, route: &B) -> Result<(), DeployError> {
        let url = self.id_url(route_id);
        debug!("PUT {}", url);

        let response = self.client.put(&url).json(route).send().await.map_err(unreachable)?;
        ensure_success("PUT", &url, response).await?;
        Ok(())
    }

    /// Delete a route. Returns `false` if it did not exist.
    pub async fn delete_route(&self, route_id: &str) -> Result<bool, DeployError> {
        let url = self.id_url(route_id);
        debug!("DELETE {}", url);

        let response = self.client.delete(&url).send().await.map_err(unreachable)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success("DELETE", &url, response).await?;
        Ok(true)
    }

    fn id_url(&self, route_id: &str) -> String {
        format!("{}/id/{}", self.base_url, route_id)
    }
}

fn unreachable(e: reqwest::Error) -> DeployError {
    DeployError::Reconciliation(format!("Proxy admin API unreachable: {}", e))
}

async fn ensure_success(method: &str, url: &str, response: Response) -> Result<Response, DeployError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("Proxy {} {} failed: {} - {}", method, url, status, body);
    Err(DeployError::Reconciliation(format!(
        "{} {} returned {}: {}",
        method,
        url,
        status,
        body.trim()
    )))
}

//! Declarative domain reconciliation against the proxy's live routes

use tracing::{debug, info};

use crate::errors::DeployError;
use crate::models::project::DomainSet;
use crate::proxy::client::ProxyClient;
use crate::proxy::routes::{domains_serving, is_equivalent, route_id, site_route};

/// Default location of the HTTP server's route list
pub const DEFAULT_ROUTES_PATH: &str = "/config/apps/http/servers/srv0/routes";

/// What a sync changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub removed: Vec<String>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
}

impl SyncReport {
    /// Whether the sync issued any mutating request
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.created.is_empty() && self.updated.is_empty()
    }
}

/// Makes the set of domains served from a path match a desired set
#[derive(Debug, Clone)]
pub struct Reconciler {
    client: ProxyClient,
    routes_path: String,
}

impl Reconciler {
    pub fn new(client: ProxyClient, routes_path: impl Into<String>) -> Self {
        Self {
            client,
            routes_path: routes_path.into(),
        }
    }

    /// Reconcile the proxy so that exactly `desired` is routed to `served_path`.
    ///
    /// The proxy's live table is the source of truth. Partial application is
    /// not rolled back; re-running converges.
    pub async fn sync_domains(
        &self,
        desired: &DomainSet,
        served_path: &str,
    ) -> Result<SyncReport, DeployError> {
        info!("Syncing domains {:?} for {}", desired, served_path);
        let mut report = SyncReport::default();

        let routes = self.client.list_routes(&self.routes_path).await?;
        let current = domains_serving(&routes, served_path);
        debug!("Currently serving {}: {:?}", served_path, current);

        for domain in current.difference(desired) {
            info!("Removing stale domain: {}", domain);
            self.client.delete_route(&route_id(domain)).await?;
            report.removed.push(domain.clone());
        }

        for domain in desired {
            let id = route_id(domain);
            let route = site_route(domain, served_path);

            match self.client.get_route(&id).await? {
                Some(existing) if is_equivalent(&existing, domain, served_path) => {
                    debug!("Route {} already up to date", id);
                    report.unchanged.push(domain.clone());
                }
                Some(_) => {
                    self.client.replace_route(&id, &route).await?;
                    report.updated.push(domain.clone());
                }
                None => {
                    self.client.create_route(&self.routes_path, &route).await?;
                    report.created.push(domain.clone());
                }
            }
        }

        info!(
            "Domain sync finished: {} created, {} updated, {} removed, {} unchanged",
            report.created.len(),
            report.updated.len(),
            report.removed.len(),
            report.unchanged.len()
        );
        Ok(report)
    }
}

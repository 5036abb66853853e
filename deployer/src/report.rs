//! Terminal rendering of deployment records

use colored::Colorize;

use crate::models::deployment::{Deployment, DeploymentStatus};

fn status_label(status: DeploymentStatus) -> String {
    match status {
        DeploymentStatus::Pending => "pending".dimmed().to_string(),
        DeploymentStatus::Processing => "processing".yellow().to_string(),
        DeploymentStatus::Success => "success".green().bold().to_string(),
        DeploymentStatus::Failed => "failed".red().bold().to_string(),
    }
}

/// One summary line per deployment
pub fn render_summary(deployment: &Deployment) -> String {
    let duration = deployment
        .duration_ms
        .map(|ms| format!("{} ms", ms))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{}  {:<10}  {:<8}  {}  {}",
        deployment.id,
        status_label(deployment.status),
        deployment.source_type.as_str(),
        deployment.created_at.format("%Y-%m-%d %H:%M:%S"),
        duration.as_str().dimmed()
    )
}

/// Summary followed by the full log
pub fn render_detail(deployment: &Deployment) -> String {
    let mut out = render_summary(deployment);
    out.push('\n');
    out.push_str(&format!("{} {}\n", "path:".dimmed(), deployment.deployment_path));
    for line in deployment.log_lines() {
        out.push_str("  ");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

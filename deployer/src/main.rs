//! sitedeploy - Entry Point
//!
//! Publishes static sites from git repositories or uploaded archives and
//! keeps the reverse proxy's routes in line with each project's domains.

use std::collections::HashMap;
use std::env;

use sitedeploy::app::options::AppOptions;
use sitedeploy::app::run::run;
use sitedeploy::logs::{init_logging, LogOptions};
use sitedeploy::report::{render_detail, render_summary};
use sitedeploy::storage::deployments::DeploymentStore;
use sitedeploy::storage::layout::StorageLayout;
use sitedeploy::storage::settings::Settings;
use sitedeploy::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Inspect stored deployments without starting the service
    if let Some(deployment_id) = cli_args.get("status") {
        let store = DeploymentStore::new(layout.deployments_dir());
        match store.get(deployment_id).await {
            Ok(deployment) => print!("{}", render_detail(&deployment)),
            Err(e) => eprintln!("{}", e),
        }
        return;
    }
    if let Some(project_id) = cli_args.get("list") {
        let store = DeploymentStore::new(layout.deployments_dir());
        match store.list_by_project(project_id).await {
            Ok(deployments) => {
                for deployment in &deployments {
                    println!("{}", render_summary(deployment));
                }
            }
            Err(e) => eprintln!("{}", e),
        }
        return;
    }

    // Retrieve the settings file
    let settings = match Settings::load(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    // Run the service
    let options = AppOptions::from_settings(layout, &settings);

    info!("Running sitedeploy {} with options: {:?}", version.version, options);
    let result = run(options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the deployment service: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("Failed to listen for Ctrl+C");
        }
        info!("Ctrl+C received, shutting down...");
    }
}

//! End-to-end pipeline tests with an in-memory catalog and a mocked proxy

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sitedeploy::deploy::archive::ArchiveOptions;
use sitedeploy::deploy::fsm::DeploymentEvent;
use sitedeploy::deploy::pipeline::{Pipeline, PipelineOptions};
use sitedeploy::errors::DeployError;
use sitedeploy::filesys::dir::Dir;
use sitedeploy::models::deployment::{DeployJob, DeploymentStatus, SourceType};
use sitedeploy::models::project::{GitReference, Project};
use sitedeploy::proxy::reconciler::DEFAULT_ROUTES_PATH;
use sitedeploy::storage::catalog::{CatalogEntry, DomainEntry, MemoryCatalog};
use sitedeploy::storage::deployments::DeploymentStore;
use sitedeploy::utils::BackoffOptions;
use sitedeploy::workers::deployer;

use super::common::{bare_remote, git_available, write_zip};

struct Harness {
    temp: tempfile::TempDir,
    server: MockServer,
    catalog: Arc<MemoryCatalog>,
    pipeline: Arc<Pipeline>,
    queue: mpsc::UnboundedReceiver<DeployJob>,
}

fn pipeline_options(root: &Path, proxy_url: String) -> PipelineOptions {
    PipelineOptions {
        sites_dir: root.join("sites"),
        staging_dir: root.join("staging"),
        proxy_admin_url: proxy_url,
        proxy_routes_path: DEFAULT_ROUTES_PATH.to_string(),
        proxy_timeout: Duration::from_secs(5),
        archive: ArchiveOptions {
            max_attempts: 2,
            backoff: BackoffOptions {
                base_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(20),
                multiplier: 1.0,
            },
        },
        ..Default::default()
    }
}

fn demo_project(git: Option<GitReference>) -> CatalogEntry {
    CatalogEntry {
        project: Project {
            id: "p1".to_string(),
            name: "Demo Site".to_string(),
            owner_id: "u1".to_string(),
        },
        git,
        domains: vec![DomainEntry {
            domain: "demo.example.com".to_string(),
            active: true,
        }],
    }
}

impl Harness {
    async fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let server = MockServer::start().await;
        std::fs::create_dir_all(temp.path().join("staging")).unwrap();

        let catalog = Arc::new(MemoryCatalog::new());
        catalog.upsert(demo_project(None)).await;

        let options = pipeline_options(temp.path(), server.uri());
        let store = DeploymentStore::new(Dir::new(temp.path().join("deployments")));
        let (queue_tx, queue) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(options, store, catalog.clone(), queue_tx).unwrap();

        Self {
            temp,
            server,
            catalog,
            pipeline: Arc::new(pipeline),
            queue,
        }
    }

    /// A second pipeline over the same directories, as after a restart
    fn restarted(&self) -> (Pipeline, mpsc::UnboundedReceiver<DeployJob>) {
        let options = pipeline_options(self.temp.path(), self.server.uri());
        let store = DeploymentStore::new(Dir::new(self.temp.path().join("deployments")));
        let (queue_tx, queue) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(options, store, self.catalog.clone(), queue_tx).unwrap();
        (pipeline, queue)
    }

    fn served_dir(&self) -> PathBuf {
        self.temp.path().join("sites").join("www.demo-site")
    }

    fn stage_archive(&self, entries: &[(&str, &str)]) -> PathBuf {
        let staged = self
            .temp
            .path()
            .join("staging")
            .join(format!("{}.zip", uuid::Uuid::new_v4()));
        write_zip(&staged, entries);
        staged
    }

    /// A proxy that knows no routes and accepts new ones
    async fn mount_empty_proxy(&self, expected_posts: u64) {
        Mock::given(method("GET"))
            .and(path(DEFAULT_ROUTES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex("^/id/.+"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path(DEFAULT_ROUTES_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(expected_posts)
            .mount(&self.server)
            .await;
    }

    async fn run_next_job(&mut self) {
        let job = self.queue.recv().await.unwrap();
        self.pipeline.execute(&job).await;
    }
}

#[tokio::test]
async fn test_archive_deployment_succeeds() {
    let mut harness = Harness::new().await;
    harness.mount_empty_proxy(1).await;

    let staged = harness.stage_archive(&[
        ("index.html", "<h1>demo</h1>"),
        ("assets/app.js", "console.log(1)"),
        ("deploy.sh", "rm -rf /"),
        (".git/config", "[core]"),
    ]);

    let requested = harness
        .pipeline
        .request_archive_deploy("p1", &staged)
        .await
        .unwrap();
    assert_eq!(requested.status, DeploymentStatus::Pending);
    assert_eq!(requested.source_type, SourceType::Archive);
    assert_eq!(requested.deployment_path, "www.demo-site");
    assert_eq!(requested.log.len(), 1);

    harness.run_next_job().await;

    let deployment = harness.pipeline.get_deployment(&requested.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert!(deployment.started_at.is_some());
    assert!(deployment.finished_at.is_some());
    assert!(deployment.duration_ms.is_some());

    let served = harness.served_dir();
    assert!(served.join("index.html").exists());
    assert!(served.join("assets/app.js").exists());
    assert!(!served.join("deploy.sh").exists());
    assert!(!served.join(".git").exists());
    assert!(!staged.exists());

    let lines = deployment.log_lines();
    assert!(lines[0].contains("Deployment queued from archive source"));
    assert!(lines.iter().any(|l| l.contains("Extracted 4 files")));
    assert!(lines.iter().any(|l| l.contains("Configuring domains: demo.example.com")));
    assert!(lines.last().unwrap().contains("Deployment finished successfully"));

    // Timestamps never go backwards
    assert!(deployment.log.windows(2).all(|w| w[0].at <= w[1].at));
}

#[tokio::test]
async fn test_acquire_failure_halts_the_chain() {
    let mut harness = Harness::new().await;
    harness.mount_empty_proxy(0).await;

    let missing = harness.temp.path().join("staging").join("never-staged.zip");
    let requested = harness
        .pipeline
        .request_archive_deploy("p1", &missing)
        .await
        .unwrap();

    harness.run_next_job().await;

    let deployment = harness.pipeline.get_deployment(&requested.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.duration_ms.is_some());

    let lines = deployment.log_lines();
    let failure = lines.last().unwrap();
    assert!(failure.contains("Deployment failed"));
    assert!(failure.contains("not found"));
    assert!(!lines.iter().any(|l| l.contains("Preparing static files")));
    assert!(!lines.iter().any(|l| l.contains("Configuring domains")));
}

#[tokio::test]
async fn test_domains_removed_before_reconcile_fail_the_deployment() {
    let mut harness = Harness::new().await;
    harness.mount_empty_proxy(0).await;

    let staged = harness.stage_archive(&[("index.html", "hi")]);
    let requested = harness
        .pipeline
        .request_archive_deploy("p1", &staged)
        .await
        .unwrap();

    harness.catalog.set_domains("p1", &[]).await;
    harness.run_next_job().await;

    let deployment = harness.pipeline.get_deployment(&requested.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment
        .log_lines()
        .last()
        .unwrap()
        .contains("no active domains"));
}

#[tokio::test]
async fn test_preconditions_are_checked_before_any_record_exists() {
    let harness = Harness::new().await;

    // No git configuration
    let result = harness.pipeline.request_git_deploy("p1").await;
    assert!(matches!(result, Err(DeployError::Precondition(_))));

    // Empty repository URL counts as missing
    harness
        .catalog
        .upsert(CatalogEntry {
            project: Project {
                id: "p2".to_string(),
                name: "Blank Repo".to_string(),
                owner_id: "u1".to_string(),
            },
            git: Some(GitReference {
                repository_url: "  ".to_string(),
                branch: "main".to_string(),
                base_directory: None,
            }),
            domains: vec![DomainEntry {
                domain: "blank.example.com".to_string(),
                active: true,
            }],
        })
        .await;
    let result = harness.pipeline.request_git_deploy("p2").await;
    assert!(matches!(result, Err(DeployError::Precondition(_))));

    // No active domains
    harness.catalog.set_domains("p1", &[]).await;
    let staged = harness.stage_archive(&[("index.html", "hi")]);
    let result = harness.pipeline.request_archive_deploy("p1", &staged).await;
    assert!(matches!(result, Err(DeployError::Precondition(_))));

    // Unknown project
    let result = harness.pipeline.request_archive_deploy("nope", &staged).await;
    assert!(matches!(result, Err(DeployError::NotFound(_))));

    assert!(harness.pipeline.list_deployments("p1").await.unwrap().is_empty());
    assert!(harness.pipeline.list_deployments("p2").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_finished_deployment_is_not_run_twice() {
    let mut harness = Harness::new().await;
    harness.mount_empty_proxy(1).await;

    let staged = harness.stage_archive(&[("index.html", "hi")]);
    let requested = harness
        .pipeline
        .request_archive_deploy("p1", &staged)
        .await
        .unwrap();
    harness.run_next_job().await;
    let first = harness.pipeline.get_deployment(&requested.id).await.unwrap();

    let job = DeployJob {
        deployment_id: requested.id.clone(),
    };
    harness.pipeline.execute(&job).await;

    let second = harness.pipeline.get_deployment(&requested.id).await.unwrap();
    assert_eq!(second.status, DeploymentStatus::Success);
    assert_eq!(second.log.len(), first.log.len());
}

#[tokio::test]
async fn test_list_deployments_newest_first() {
    let harness = Harness::new().await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let staged = harness.stage_archive(&[("index.html", "hi")]);
        let deployment = harness
            .pipeline
            .request_archive_deploy("p1", &staged)
            .await
            .unwrap();
        ids.push(deployment.id);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let listed: Vec<String> = harness
        .pipeline
        .list_deployments("p1")
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    ids.reverse();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_worker_runs_queued_deployments() {
    let harness = Harness::new().await;
    harness.mount_empty_proxy(2).await;

    let Harness {
        temp,
        server: _server,
        pipeline,
        queue,
        ..
    } = harness;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let worker = tokio::spawn({
        let pipeline = pipeline.clone();
        async move {
            deployer::run(
                &deployer::Options { max_concurrent: 1 },
                pipeline,
                queue,
                Box::pin(async move {
                    let _ = shutdown_rx.await;
                }),
            )
            .await;
        }
    });

    let mut ids = Vec::new();
    for _ in 0..2 {
        let staged = temp
            .path()
            .join("staging")
            .join(format!("{}.zip", uuid::Uuid::new_v4()));
        write_zip(&staged, &[("index.html", "hi")]);
        let deployment = pipeline.request_archive_deploy("p1", &staged).await.unwrap();
        ids.push(deployment.id);
    }

    let finished = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            let mut done = true;
            for id in &ids {
                let deployment = pipeline.get_deployment(id).await.unwrap();
                done &= deployment.status.is_terminal();
            }
            if done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(finished.is_ok(), "deployments did not finish in time");

    shutdown_tx.send(()).unwrap();
    worker.await.unwrap();

    for id in &ids {
        let deployment = pipeline.get_deployment(id).await.unwrap();
        assert!(deployment.status.is_terminal());
    }
}

#[tokio::test]
async fn test_git_deployment_publishes_build_directory() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }

    let mut harness = Harness::new().await;
    harness.mount_empty_proxy(1).await;

    let remote_root = harness.temp.path().join("origin");
    std::fs::create_dir_all(&remote_root).unwrap();
    let url = bare_remote(
        &remote_root,
        &[(
            "main",
            &[
                "dist/index.html",
                "dist/assets/app.js",
                "src/main.ts",
                "package.json",
            ],
        )],
    );
    harness
        .catalog
        .upsert(demo_project(Some(GitReference {
            repository_url: url.clone(),
            branch: "main".to_string(),
            base_directory: Some("dist".to_string()),
        })))
        .await;

    let requested = harness.pipeline.request_git_deploy("p1").await.unwrap();
    assert_eq!(requested.source_type, SourceType::Git);
    harness.run_next_job().await;

    let deployment = harness.pipeline.get_deployment(&requested.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);

    let served = harness.served_dir();
    assert!(served.join("index.html").exists());
    assert!(served.join("assets/app.js").exists());
    assert!(!served.join("dist").exists());
    assert!(!served.join("src").exists());
    assert!(!served.join("package.json").exists());
    assert!(!served.join(".git").exists());

    let lines = deployment.log_lines();
    assert!(lines[0].contains("Deployment queued from git source"));
    assert!(lines
        .iter()
        .any(|l| l.contains(&format!("Fetching {} (branch main)", url))));
    assert!(lines.iter().any(|l| l.contains("Checked out commit")));
    assert!(lines.iter().any(|l| l.contains("Preparing static files from dist")));
    assert!(lines.last().unwrap().contains("Deployment finished successfully"));
}

#[tokio::test]
async fn test_archive_outside_staging_is_rejected() {
    let mut harness = Harness::new().await;

    let settings = harness.temp.path().join("settings.json");
    std::fs::write(&settings, "{}").unwrap();

    let result = harness.pipeline.request_archive_deploy("p1", &settings).await;
    assert!(matches!(result, Err(DeployError::Precondition(_))));

    let escaped = harness
        .temp
        .path()
        .join("staging")
        .join("..")
        .join("settings.json");
    let result = harness.pipeline.request_archive_deploy("p1", &escaped).await;
    assert!(matches!(result, Err(DeployError::Precondition(_))));

    let result = harness
        .pipeline
        .request_archive_deploy("p1", "settings.json")
        .await;
    assert!(matches!(result, Err(DeployError::Precondition(_))));

    assert!(settings.exists());
    assert!(harness.pipeline.list_deployments("p1").await.unwrap().is_empty());
    assert!(harness.queue.try_recv().is_err());
}

#[tokio::test]
async fn test_latest_successful_skips_failed_and_pending() {
    let mut harness = Harness::new().await;
    harness.mount_empty_proxy(1).await;

    assert!(harness.pipeline.latest_successful("p1").await.unwrap().is_none());

    let staged = harness.stage_archive(&[("index.html", "hi")]);
    let good = harness
        .pipeline
        .request_archive_deploy("p1", &staged)
        .await
        .unwrap();
    harness.run_next_job().await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let missing = harness.temp.path().join("staging").join("gone.zip");
    harness
        .pipeline
        .request_archive_deploy("p1", &missing)
        .await
        .unwrap();
    harness.run_next_job().await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let staged = harness.stage_archive(&[("index.html", "hi")]);
    harness
        .pipeline
        .request_archive_deploy("p1", &staged)
        .await
        .unwrap();

    let latest = harness.pipeline.latest_successful("p1").await.unwrap().unwrap();
    assert_eq!(latest.id, good.id);
    assert_eq!(latest.status, DeploymentStatus::Success);
}

#[tokio::test]
async fn test_restart_requeues_pending_and_fails_interrupted() {
    let harness = Harness::new().await;

    let staged = harness.stage_archive(&[("index.html", "hi")]);
    let waiting = harness
        .pipeline
        .request_archive_deploy("p1", &staged)
        .await
        .unwrap();
    let staged = harness.stage_archive(&[("index.html", "hi")]);
    let running = harness
        .pipeline
        .request_archive_deploy("p1", &staged)
        .await
        .unwrap();
    harness
        .pipeline
        .store()
        .transition(&running.id, DeploymentEvent::Start)
        .await
        .unwrap();

    let (restarted, mut queue) = harness.restarted();
    let report = restarted.recover().await.unwrap();
    assert_eq!(report.requeued, vec![waiting.id.clone()]);
    assert_eq!(report.interrupted, vec![running.id.clone()]);

    let job = queue.try_recv().unwrap();
    assert_eq!(job.deployment_id, waiting.id);
    assert!(queue.try_recv().is_err());

    let interrupted = restarted.get_deployment(&running.id).await.unwrap();
    assert_eq!(interrupted.status, DeploymentStatus::Failed);
    assert!(interrupted.finished_at.is_some());
    assert!(interrupted
        .log_lines()
        .last()
        .unwrap()
        .contains("interrupted by restart"));

    let pending = restarted.get_deployment(&waiting.id).await.unwrap();
    assert_eq!(pending.status, DeploymentStatus::Pending);
}

#[tokio::test]
async fn test_job_without_record_is_reported_not_created() {
    let harness = Harness::new().await;
    let job = DeployJob {
        deployment_id: uuid::Uuid::new_v4().to_string(),
    };

    harness.pipeline.execute(&job).await;

    let missing = harness.pipeline.get_deployment(&job.deployment_id).await;
    assert!(matches!(missing, Err(DeployError::NotFound(_))));
    assert!(harness.pipeline.list_deployments("p1").await.unwrap().is_empty());
}

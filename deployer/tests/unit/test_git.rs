//! Git acquirer tests against local bare repositories

use std::time::Duration;

use sitedeploy::deploy::git::{sync_repository, working_copy_matches, GitOptions};
use sitedeploy::errors::DeployError;
use sitedeploy::models::project::GitReference;

use super::common::{bare_remote, git_available};

fn reference(url: &str, branch: &str) -> GitReference {
    GitReference {
        repository_url: url.to_string(),
        branch: branch.to_string(),
        base_directory: None,
    }
}

fn options() -> GitOptions {
    GitOptions {
        timeout: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn test_fresh_clone() {
    if !git_available() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let url = bare_remote(temp.path(), &[("main", &["index.html", "css/site.css"])]);
    let target = temp.path().join("sites").join("www.demo");

    let commit = sync_repository(&reference(&url, "main"), &target, &options())
        .await
        .unwrap();

    assert_eq!(commit.len(), 40);
    assert!(target.join("index.html").exists());
    assert!(target.join("css/site.css").exists());
}

#[tokio::test]
async fn test_matching_working_copy_is_updated_in_place() {
    if !git_available() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let url = bare_remote(temp.path(), &[("main", &["index.html"])]);
    let target = temp.path().join("www.demo");
    let reference = reference(&url, "main");

    let first = sync_repository(&reference, &target, &options()).await.unwrap();
    assert!(working_copy_matches(&target, &reference, &options()).await);

    // Local drift is discarded by the hard reset
    std::fs::write(target.join("index.html"), "edited locally").unwrap();
    let second = sync_repository(&reference, &target, &options()).await.unwrap();

    assert_eq!(first, second);
    let contents = std::fs::read_to_string(target.join("index.html")).unwrap();
    assert_eq!(contents, "contents of index.html");
}

#[tokio::test]
async fn test_branch_change_reclones() {
    if !git_available() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let url = bare_remote(
        temp.path(),
        &[("develop", &["develop.html"]), ("main", &["main.html"])],
    );
    let target = temp.path().join("www.demo");

    sync_repository(&reference(&url, "develop"), &target, &options())
        .await
        .unwrap();
    assert!(target.join("develop.html").exists());

    // Same remote, different branch: must not update in place
    assert!(!working_copy_matches(&target, &reference(&url, "main"), &options()).await);

    sync_repository(&reference(&url, "main"), &target, &options())
        .await
        .unwrap();
    assert!(target.join("main.html").exists());
    assert!(!target.join("develop.html").exists());
}

#[tokio::test]
async fn test_foreign_content_is_replaced() {
    if !git_available() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let url = bare_remote(temp.path(), &[("main", &["index.html"])]);
    let target = temp.path().join("www.demo");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("stale.html"), "old archive deploy").unwrap();

    sync_repository(&reference(&url, "main"), &target, &options())
        .await
        .unwrap();

    assert!(target.join("index.html").exists());
    assert!(!target.join("stale.html").exists());
}

#[tokio::test]
async fn test_failed_clone_leaves_nothing_behind() {
    if !git_available() {
        return;
    }
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("does-not-exist.git");
    let target = temp.path().join("www.demo");

    let result = sync_repository(
        &reference(missing.to_str().unwrap(), "main"),
        &target,
        &options(),
    )
    .await;

    assert!(matches!(result, Err(DeployError::Acquisition(_))));
    assert!(!target.exists());
}

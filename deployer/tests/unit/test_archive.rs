//! Archive acquirer tests

use std::time::Duration;

use sitedeploy::deploy::archive::{deploy_archive, ArchiveOptions};
use sitedeploy::errors::DeployError;
use sitedeploy::utils::BackoffOptions;

use super::common::write_zip;

fn fast_options() -> ArchiveOptions {
    ArchiveOptions {
        max_attempts: 3,
        backoff: BackoffOptions {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            multiplier: 1.0,
        },
    }
}

#[tokio::test]
async fn test_extracts_and_removes_staged_archive() {
    let temp = tempfile::tempdir().unwrap();
    let staged = temp.path().join("upload.zip");
    write_zip(
        &staged,
        &[("index.html", "<h1>hi</h1>"), ("assets/app.js", "console.log(1)")],
    );
    let target = temp.path().join("www.demo");

    let count = deploy_archive(&staged, &target, &fast_options()).await.unwrap();

    assert_eq!(count, 2);
    assert!(target.join("index.html").exists());
    assert!(target.join("assets/app.js").exists());
    assert!(!staged.exists());
}

#[tokio::test]
async fn test_previous_content_is_replaced() {
    let temp = tempfile::tempdir().unwrap();
    let target = temp.path().join("www.demo");
    std::fs::create_dir_all(target.join("old")).unwrap();
    std::fs::write(target.join("old/page.html"), "old").unwrap();

    let staged = temp.path().join("upload.zip");
    write_zip(&staged, &[("index.html", "new")]);

    deploy_archive(&staged, &target, &fast_options()).await.unwrap();

    assert!(target.join("index.html").exists());
    assert!(!target.join("old").exists());
}

#[tokio::test]
async fn test_archive_staged_late_is_found() {
    let temp = tempfile::tempdir().unwrap();
    let staged = temp.path().join("upload.zip");
    let target = temp.path().join("www.demo");

    // Appears between the second and third lookup
    let late = staged.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        write_zip(&late, &[("index.html", "late")]);
    });

    let count = deploy_archive(&staged, &target, &fast_options()).await.unwrap();
    writer.await.unwrap();

    assert_eq!(count, 1);
    assert!(target.join("index.html").exists());
}

#[tokio::test]
async fn test_missing_archive_fails_after_retries() {
    let temp = tempfile::tempdir().unwrap();
    let staged = temp.path().join("never.zip");
    let target = temp.path().join("www.demo");

    let result = deploy_archive(&staged, &target, &fast_options()).await;

    match result {
        Err(DeployError::Acquisition(message)) => assert!(message.contains("3 attempts")),
        other => panic!("expected acquisition error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_corrupt_archive_fails_and_is_removed() {
    let temp = tempfile::tempdir().unwrap();
    let staged = temp.path().join("broken.zip");
    std::fs::write(&staged, b"this is not a zip file").unwrap();
    let target = temp.path().join("www.demo");

    let result = deploy_archive(&staged, &target, &fast_options()).await;

    assert!(matches!(result, Err(DeployError::Acquisition(_))));
    assert!(!staged.exists());
}

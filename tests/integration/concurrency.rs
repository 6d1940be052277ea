//! Single-flight guarantees and cancellation.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use ytconv::core::UpdateError;
use ytconv::test_utils::ReleaseFixture;
use ytconv::update::{Channel, DeclineAll, UpdateOutcome, UpdateRequest};

use crate::common::{APP_REPO, TestInstall, app_bundle, bundle_name};

fn request() -> UpdateRequest {
    UpdateRequest::new(Channel::Release).with_tools(false).auto_confirm(true)
}

/// Publish 1.3.0 with a download slow enough to overlap a second run.
async fn publish_slow(install: &TestInstall) {
    let bundle = app_bundle("1.3.0");
    let release = ReleaseFixture::new("v1.3.0").published("2024-07-01T00:00:00Z").asset(
        &install.base(),
        &bundle_name("1.3.0"),
        &bundle,
    );
    install.mount_releases(APP_REPO, &[&release]).await;
    install.mount_asset_delayed("v1.3.0", &bundle_name("1.3.0"), bundle, Duration::from_millis(800)).await;
}

fn count(outcomes: &[UpdateOutcome]) -> (usize, usize) {
    let applied = outcomes.iter().filter(|o| matches!(o, UpdateOutcome::Applied(_))).count();
    let rejected = outcomes
        .iter()
        .filter(|o| matches!(o, UpdateOutcome::Failed(r) if matches!(r.error, UpdateError::ConcurrentOperation)))
        .count();
    (applied, rejected)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlapping_runs_commit_once() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    publish_slow(&install).await;
    let orchestrator = install.orchestrator();

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.check_and_apply(&request(), &DeclineAll, &CancellationToken::new()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    let second = orchestrator.check_and_apply(&request(), &DeclineAll, &CancellationToken::new()).await;
    let first = first.await.unwrap();

    assert_eq!(count(&[first, second]), (1, 1));
    assert_eq!(install.state().application.version.as_deref(), Some("1.3.0"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_separate_handles_share_the_file_lock() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    publish_slow(&install).await;

    // Independent orchestrators only share the lock file on disk
    let first = {
        let orchestrator = install.orchestrator();
        tokio::spawn(async move {
            orchestrator.check_and_apply(&request(), &DeclineAll, &CancellationToken::new()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    let second =
        install.orchestrator().check_and_apply(&request(), &DeclineAll, &CancellationToken::new()).await;
    let first = first.await.unwrap();

    assert_eq!(count(&[first, second]), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recover_is_rejected_while_updating() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    publish_slow(&install).await;
    let orchestrator = install.orchestrator();

    let running = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.check_and_apply(&request(), &DeclineAll, &CancellationToken::new()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    let recover = orchestrator.recover().await;
    assert!(matches!(recover, Err(UpdateError::ConcurrentOperation)), "{recover:?}");
    assert!(matches!(running.await.unwrap(), UpdateOutcome::Applied(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_during_download() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    publish_slow(&install).await;
    let before = install.snapshot();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let outcome = install.orchestrator().check_and_apply(&request(), &DeclineAll, &cancel).await;
    let UpdateOutcome::Failed(report) = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert!(matches!(report.error, UpdateError::Cancelled), "{:?}", report.error);
    assert_eq!(install.snapshot(), before);
    assert!(install.staging_is_empty());
}

#[tokio::test]
async fn test_cancel_before_start() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = install.orchestrator().check_and_apply(&request(), &DeclineAll, &cancel).await;
    assert!(outcome.is_failed());
    assert_eq!(install.state().application.version.as_deref(), Some("1.2.0"));
}

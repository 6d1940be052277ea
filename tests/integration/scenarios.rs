//! End-to-end check-and-apply runs against a mock release index.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use ytconv::core::UpdateError;
use ytconv::test_utils::{ReleaseFixture, sha256_hex};
use ytconv::update::{
    Channel, DeclineAll, UpdateOutcome, UpdatePlan, UpdatePrompt, UpdateRequest,
};

use crate::common::{APP_REPO, TestInstall, app_bundle, bundle_name, timestamp};

fn app_only(channel: Channel) -> UpdateRequest {
    UpdateRequest::new(channel).with_tools(false).auto_confirm(true)
}

#[tokio::test]
async fn test_newer_release_is_applied() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;

    let outcome = install
        .orchestrator()
        .check_and_apply(&app_only(Channel::Release), &DeclineAll, &CancellationToken::new())
        .await;

    let UpdateOutcome::Applied(applied) = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    assert_eq!(applied.version.as_deref(), Some("1.3.0"));
    assert!(applied.failures.is_empty());
    assert!(applied.relaunch.is_none());

    let state = install.state();
    assert_eq!(state.application.version.as_deref(), Some("1.3.0"));
    assert_eq!(state.application.channel, Some(Channel::Release));
    assert!(state.last_updated_at.is_some());

    assert_eq!(install.read("app.bin"), "app 1.3.0");
    assert_eq!(install.read("lib/core.dll"), "core 1.3.0");
    assert_eq!(install.read("docs/notes.txt"), "notes 1.3.0");
    // User settings survive a bundle that ships its own copy
    assert_eq!(install.read("settings.json"), "{\"user\": \"mine\"}");

    assert!(install.staging_is_empty());
    assert!(install.rollback_is_empty());
}

#[tokio::test]
async fn test_second_run_is_up_to_date() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;
    let orchestrator = install.orchestrator();
    let request = app_only(Channel::Release);

    let first = orchestrator.check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;
    assert!(matches!(first, UpdateOutcome::Applied(_)), "{first:?}");
    let after_first = install.snapshot();

    let second = orchestrator.check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;
    assert!(matches!(second, UpdateOutcome::UpToDate), "{second:?}");
    assert_eq!(install.snapshot(), after_first);
}

#[tokio::test]
async fn test_draft_is_ignored_on_release_channel() {
    let install = TestInstall::new().await;
    install.install_app("1.3.0", Channel::Release, None);

    let stable = ReleaseFixture::new("v1.3.0").published("2024-07-01T00:00:00Z").asset(
        &install.base(),
        &bundle_name("1.3.0"),
        &app_bundle("1.3.0"),
    );
    let draft = ReleaseFixture::new("v1.4.0").draft().published("2024-08-01T00:00:00Z").asset(
        &install.base(),
        &bundle_name("1.4.0"),
        &app_bundle("1.4.0"),
    );
    install.mount_releases(APP_REPO, &[&draft, &stable]).await;

    let before = install.snapshot();
    let outcome = install
        .orchestrator()
        .check_and_apply(&app_only(Channel::Release), &DeclineAll, &CancellationToken::new())
        .await;

    assert!(matches!(outcome, UpdateOutcome::UpToDate), "{outcome:?}");
    assert_eq!(install.snapshot(), before);
}

#[tokio::test]
async fn test_switch_to_nightly_applies_regardless_of_version() {
    let install = TestInstall::new().await;
    install.install_app("1.3.0", Channel::Release, None);

    // A lower version string than the installed one: only the channel switch matters
    let bundle = app_bundle("0.9.0");
    let nightly = ReleaseFixture::new("nightly").name("0.9.0").prerelease().published("2024-09-01T12:00:00Z").asset(
        &install.base(),
        "YoutubeConverter-nightly.zip",
        &bundle,
    );
    install.mount_tag(APP_REPO, &nightly).await;
    install.mount_asset("nightly", "YoutubeConverter-nightly.zip", bundle).await;

    let outcome = install
        .orchestrator()
        .check_and_apply(&app_only(Channel::Nightly), &DeclineAll, &CancellationToken::new())
        .await;

    assert!(matches!(outcome, UpdateOutcome::Applied(_)), "{outcome:?}");
    let state = install.state();
    assert_eq!(state.application.channel, Some(Channel::Nightly));
    assert_eq!(state.application.published_at, Some(timestamp("2024-09-01T12:00:00Z")));
    assert_eq!(install.read("app.bin"), "app 0.9.0");
}

#[tokio::test]
async fn test_nightly_builds_ordered_by_publish_time() {
    let install = TestInstall::new().await;
    install.install_app("nightly", Channel::Nightly, Some(timestamp("2024-09-01T12:00:00Z")));
    let orchestrator = install.orchestrator();
    let request = app_only(Channel::Nightly);

    // Same tag, same timestamp: nothing to do
    let same = ReleaseFixture::new("nightly").prerelease().published("2024-09-01T12:00:00Z").asset(
        &install.base(),
        "YoutubeConverter-nightly.zip",
        &app_bundle("n1"),
    );
    install.mount_tag(APP_REPO, &same).await;
    let outcome = orchestrator.check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;
    assert!(matches!(outcome, UpdateOutcome::UpToDate), "{outcome:?}");

    // Same tag republished later: newer
    install.server.reset().await;
    let bundle = app_bundle("n2");
    let later = ReleaseFixture::new("nightly").prerelease().published("2024-09-02T12:00:00Z").asset(
        &install.base(),
        "YoutubeConverter-nightly.zip",
        &bundle,
    );
    install.mount_tag(APP_REPO, &later).await;
    install.mount_asset("nightly", "YoutubeConverter-nightly.zip", bundle).await;

    let outcome = orchestrator.check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;
    assert!(matches!(outcome, UpdateOutcome::Applied(_)), "{outcome:?}");
    assert_eq!(install.read("app.bin"), "app n2");
    assert_eq!(install.state().application.published_at, Some(timestamp("2024-09-02T12:00:00Z")));
}

#[tokio::test]
async fn test_checksum_mismatch_fails_without_changes() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);

    let bundle = app_bundle("1.3.0");
    let release = ReleaseFixture::new("v1.3.0").published("2024-07-01T00:00:00Z").asset_with_digest(
        &install.base(),
        &bundle_name("1.3.0"),
        bundle.len() as u64,
        &sha256_hex(b"something else"),
    );
    install.mount_releases(APP_REPO, &[&release]).await;
    install.mount_asset("v1.3.0", &bundle_name("1.3.0"), bundle).await;

    let state_before = std::fs::read(install.layout.state_file()).unwrap();
    let before = install.snapshot();

    let outcome = install
        .orchestrator()
        .check_and_apply(&app_only(Channel::Release), &DeclineAll, &CancellationToken::new())
        .await;

    let UpdateOutcome::Failed(report) = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert!(matches!(report.error, UpdateError::Integrity { .. }), "{:?}", report.error);
    assert_eq!(report.version.as_deref(), Some("1.3.0"));
    assert_eq!(std::fs::read(install.layout.state_file()).unwrap(), state_before);
    assert_eq!(install.snapshot(), before);
    assert!(install.staging_is_empty());
}

#[tokio::test]
async fn test_missing_channel_is_up_to_date() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.mount_releases(APP_REPO, &[]).await;

    let outcome = install
        .orchestrator()
        .check_and_apply(&app_only(Channel::Prerelease), &DeclineAll, &CancellationToken::new())
        .await;
    assert!(matches!(outcome, UpdateOutcome::UpToDate), "{outcome:?}");
}

struct CountingPrompt {
    calls: AtomicUsize,
    answer: bool,
}

impl UpdatePrompt for CountingPrompt {
    fn confirm(&self, plan: &UpdatePlan) -> bool {
        assert!(plan.has_updates());
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[tokio::test]
async fn test_declined_update_changes_nothing() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;
    let prompt = Arc::new(CountingPrompt {
        calls: AtomicUsize::new(0),
        answer: false,
    });

    let before = install.snapshot();
    let request = UpdateRequest::new(Channel::Release).with_tools(false);
    let outcome = install.orchestrator().check_and_apply(&request, prompt.as_ref(), &CancellationToken::new()).await;

    let UpdateOutcome::Declined(plan) = outcome else {
        panic!("expected Declined, got {outcome:?}");
    };
    assert_eq!(plan.summary(), "application: 1.2.0 -> 1.3.0 (newer)");
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(install.snapshot(), before);
}

#[tokio::test]
async fn test_confirmed_update_is_applied() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;
    let prompt = CountingPrompt {
        calls: AtomicUsize::new(0),
        answer: true,
    };

    let request = UpdateRequest::new(Channel::Release).with_tools(false);
    let outcome = install.orchestrator().check_and_apply(&request, &prompt, &CancellationToken::new()).await;
    assert!(matches!(outcome, UpdateOutcome::Applied(_)), "{outcome:?}");
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_check_only_reports_plan() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;

    let before = install.snapshot();
    let plan = install.orchestrator().check(&app_only(Channel::Release)).await.unwrap();
    assert!(plan.has_updates());
    assert_eq!(plan.eligible().count(), 1);
    assert_eq!(install.snapshot(), before);
}

#[tokio::test]
async fn test_first_run_seeds_from_legacy_marker() {
    let install = TestInstall::new().await;
    std::fs::write(install.layout.legacy_version_file(), "v1.2.0\n").unwrap();
    std::fs::write(install.root().join("app.bin"), "app 1.2.0").unwrap();
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;

    let outcome = install
        .orchestrator()
        .check_and_apply(&app_only(Channel::Release), &DeclineAll, &CancellationToken::new())
        .await;
    assert!(matches!(outcome, UpdateOutcome::Applied(_)), "{outcome:?}");
    assert!(install.layout.state_file().exists());
    assert_eq!(install.state().application.version.as_deref(), Some("1.3.0"));
}

//! Older releases are only ever installed on explicit request.

use tokio_util::sync::CancellationToken;
use ytconv::core::UpdateError;
use ytconv::test_utils::ReleaseFixture;
use ytconv::update::{Channel, DeclineAll, UpdateOutcome, UpdateRequest};

use crate::common::{APP_REPO, TestInstall, app_bundle, bundle_name};

async fn publish_tagged(install: &TestInstall, version: &str) {
    let bundle = app_bundle(version);
    let release = ReleaseFixture::new(format!("v{version}")).published("2024-05-01T00:00:00Z").asset(
        &install.base(),
        &bundle_name(version),
        &bundle,
    );
    install.mount_tag(APP_REPO, &release).await;
    install.mount_asset(release.tag(), &bundle_name(version), bundle).await;
}

#[tokio::test]
async fn test_older_remote_is_never_applied_automatically() {
    let install = TestInstall::new().await;
    install.install_app("1.3.0", Channel::Release, None);
    install.publish_app("1.2.0", "2024-05-01T00:00:00Z").await;
    let before = install.snapshot();

    let request = UpdateRequest::new(Channel::Release).with_tools(false).auto_confirm(true);
    let outcome = install.orchestrator().check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;

    assert!(matches!(outcome, UpdateOutcome::UpToDate), "{outcome:?}");
    assert_eq!(install.snapshot(), before);
}

#[tokio::test]
async fn test_explicit_downgrade_is_applied() {
    let install = TestInstall::new().await;
    install.install_app("1.3.0", Channel::Release, None);
    publish_tagged(&install, "1.2.0").await;

    let outcome = install
        .orchestrator()
        .downgrade_to("1.2.0", true, &DeclineAll, &CancellationToken::new())
        .await;

    let UpdateOutcome::Applied(applied) = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    assert_eq!(applied.version.as_deref(), Some("1.2.0"));
    assert_eq!(install.read("app.bin"), "app 1.2.0");
    assert_eq!(install.state().application.version.as_deref(), Some("1.2.0"));
    assert!(install.rollback_is_empty());
}

#[tokio::test]
async fn test_downgrade_accepts_prefixed_version() {
    let install = TestInstall::new().await;
    install.install_app("1.3.0", Channel::Release, None);
    publish_tagged(&install, "1.2.0").await;

    let outcome = install
        .orchestrator()
        .downgrade_to("v1.2.0", true, &DeclineAll, &CancellationToken::new())
        .await;
    assert!(matches!(outcome, UpdateOutcome::Applied(_)), "{outcome:?}");
}

#[tokio::test]
async fn test_downgrade_asks_first() {
    let install = TestInstall::new().await;
    install.install_app("1.3.0", Channel::Release, None);
    publish_tagged(&install, "1.2.0").await;
    let before = install.snapshot();

    let outcome = install
        .orchestrator()
        .downgrade_to("1.2.0", false, &DeclineAll, &CancellationToken::new())
        .await;
    assert!(matches!(outcome, UpdateOutcome::Declined(_)), "{outcome:?}");
    assert_eq!(install.snapshot(), before);
}

#[tokio::test]
async fn test_downgrade_to_installed_version_is_noop() {
    let install = TestInstall::new().await;
    install.install_app("1.3.0", Channel::Release, None);
    publish_tagged(&install, "1.3.0").await;

    let outcome = install
        .orchestrator()
        .downgrade_to("1.3.0", true, &DeclineAll, &CancellationToken::new())
        .await;
    assert!(matches!(outcome, UpdateOutcome::UpToDate), "{outcome:?}");
}

#[tokio::test]
async fn test_downgrade_to_unknown_version() {
    let install = TestInstall::new().await;
    install.install_app("1.3.0", Channel::Release, None);

    let outcome = install
        .orchestrator()
        .downgrade_to("0.0.1", true, &DeclineAll, &CancellationToken::new())
        .await;

    let UpdateOutcome::Failed(report) = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert!(matches!(report.error, UpdateError::NotFound { .. }), "{:?}", report.error);
    assert_eq!(install.state().application.version.as_deref(), Some("1.3.0"));
}

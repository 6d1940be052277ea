//! yt-dlp and ffmpeg, installed standalone or shipped with the application.

use tokio_util::sync::CancellationToken;
use ytconv::core::UpdateError;
use ytconv::test_utils::{ReleaseFixture, sha256_hex, zip_bytes};
use ytconv::update::{Channel, Component, DeclineAll, ToolBranch, UpdateOutcome, UpdateRequest};
use ytconv::utils::executable_name;

use crate::common::{APP_REPO, FFMPEG_REPO, TestInstall, YTDLP_REPO, app_bundle, bundle_name, ytdlp_binary};

const FFMPEG_ZIP: &str = "ffmpeg-7.1-essentials_build.zip";

fn ffmpeg_archive() -> Vec<u8> {
    let ffmpeg = format!("ffmpeg-7.1-essentials_build/bin/{}", executable_name("ffmpeg"));
    let ffprobe = format!("ffmpeg-7.1-essentials_build/bin/{}", executable_name("ffprobe"));
    zip_bytes(&[
        (ffmpeg.as_str(), b"ffmpeg 7.1"),
        (ffprobe.as_str(), b"ffprobe 7.1"),
        ("ffmpeg-7.1-essentials_build/README.txt", b"readme"),
    ])
}

async fn publish_ytdlp(install: &TestInstall, tag: &str) {
    let binary = ytdlp_binary(tag);
    let name = executable_name("yt-dlp");
    let release = ReleaseFixture::new(tag).published("2024-08-06T00:00:00Z").asset(&install.base(), &name, &binary);
    install.mount_releases(YTDLP_REPO, &[&release]).await;
    install.mount_asset(tag, &name, binary).await;
}

async fn publish_ffmpeg(install: &TestInstall) {
    let archive = ffmpeg_archive();
    let release = ReleaseFixture::new("7.1").published("2024-10-01T00:00:00Z").asset(&install.base(), FFMPEG_ZIP, &archive);
    install.mount_releases(FFMPEG_REPO, &[&release]).await;
    install.mount_asset("7.1", FFMPEG_ZIP, archive).await;
}

fn tools_request() -> UpdateRequest {
    UpdateRequest::new(Channel::Release).tools_only().auto_confirm(true)
}

#[tokio::test]
async fn test_installs_missing_tools() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    publish_ytdlp(&install, "2024.08.06").await;
    publish_ffmpeg(&install).await;

    let outcome = install
        .orchestrator()
        .check_and_apply(&tools_request(), &DeclineAll, &CancellationToken::new())
        .await;
    let UpdateOutcome::Applied(applied) = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    assert!(applied.version.is_none(), "application is untouched");
    assert_eq!(applied.components.len(), 2);

    assert!(install.layout.ytdlp_path().is_file());
    assert_eq!(std::fs::read(install.layout.ffmpeg_path()).unwrap(), b"ffmpeg 7.1");
    assert_eq!(std::fs::read(install.layout.ffprobe_path()).unwrap(), b"ffprobe 7.1");
    // Only the wanted binaries leave the archive
    assert!(!install.layout.ffmpeg_dir().join("README.txt").exists());

    let state = install.state();
    assert_eq!(state.yt_dlp.version.as_deref(), Some("2024.08.06"));
    assert_eq!(state.ffmpeg.version.as_deref(), Some("7.1"));
    assert_eq!(state.application.version.as_deref(), Some("1.2.0"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_ytdlp_is_executable() {
    use std::os::unix::fs::PermissionsExt;

    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    publish_ytdlp(&install, "2024.08.06").await;

    let outcome = install
        .orchestrator()
        .check_and_apply(&tools_request(), &DeclineAll, &CancellationToken::new())
        .await;
    assert!(matches!(outcome, UpdateOutcome::Applied(_)), "{outcome:?}");

    let mode = std::fs::metadata(install.layout.ytdlp_path()).unwrap().permissions().mode();
    assert_ne!(mode & 0o111, 0);
}

#[tokio::test]
async fn test_nightly_branch_reads_its_own_repository() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);

    let tag = "2024.09.01.232710";
    let binary = ytdlp_binary(tag);
    let name = executable_name("yt-dlp");
    let release = ReleaseFixture::new(tag).published("2024-09-01T23:27:10Z").asset(&install.base(), &name, &binary);
    install.mount_releases(ToolBranch::Nightly.repo(), &[&release]).await;
    install.mount_asset(tag, &name, binary).await;

    let request = tools_request().ytdlp_branch(ToolBranch::Nightly);
    let outcome = install.orchestrator().check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;
    assert!(matches!(outcome, UpdateOutcome::Applied(_)), "{outcome:?}");
    assert_eq!(install.state().yt_dlp.channel, Some(Channel::Nightly));
}

#[tokio::test]
async fn test_tool_failure_does_not_block_application() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;

    let binary = ytdlp_binary("2024.08.06");
    let name = executable_name("yt-dlp");
    let release = ReleaseFixture::new("2024.08.06").published("2024-08-06T00:00:00Z").asset_with_digest(
        &install.base(),
        &name,
        binary.len() as u64,
        &sha256_hex(b"tampered"),
    );
    install.mount_releases(YTDLP_REPO, &[&release]).await;
    install.mount_asset("2024.08.06", &name, binary).await;

    let request = UpdateRequest::new(Channel::Release).auto_confirm(true);
    let outcome = install.orchestrator().check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;

    let UpdateOutcome::Applied(applied) = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    assert_eq!(applied.version.as_deref(), Some("1.3.0"));
    assert_eq!(applied.failures.len(), 1);
    assert_eq!(applied.failures[0].component, Some(Component::YtDlp));
    assert!(matches!(applied.failures[0].error, UpdateError::Integrity { .. }));

    assert!(!install.layout.ytdlp_path().exists());
    assert!(install.state().yt_dlp.version.is_none());
}

#[tokio::test]
async fn test_bundled_tool_commits_with_application() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);

    let bundle = app_bundle("1.3.0");
    let binary = ytdlp_binary("2024.08.06");
    let name = executable_name("yt-dlp");
    let release = ReleaseFixture::new("v1.3.0")
        .published("2024-07-01T00:00:00Z")
        .asset(&install.base(), &bundle_name("1.3.0"), &bundle)
        .asset(&install.base(), &name, &binary);
    install.mount_releases(APP_REPO, &[&release]).await;
    install.mount_asset("v1.3.0", &bundle_name("1.3.0"), bundle).await;
    install.mount_asset("v1.3.0", &name, binary).await;

    let request = UpdateRequest::new(Channel::Release).with_tools(false).auto_confirm(true);
    let outcome = install.orchestrator().check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;

    let UpdateOutcome::Applied(applied) = outcome else {
        panic!("expected Applied, got {outcome:?}");
    };
    let committed: Vec<Component> = applied.components.iter().map(|(c, _)| *c).collect();
    assert!(committed.contains(&Component::Application));
    assert!(committed.contains(&Component::YtDlp));
    assert!(install.layout.ytdlp_path().is_file());
    assert_eq!(install.read("app.bin"), "app 1.3.0");
    assert!(install.state().yt_dlp.version.is_some());
}

#[tokio::test]
async fn test_corrupt_bundled_tool_fails_whole_unit() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);

    let bundle = app_bundle("1.3.0");
    let binary = ytdlp_binary("2024.08.06");
    let name = executable_name("yt-dlp");
    let release = ReleaseFixture::new("v1.3.0")
        .published("2024-07-01T00:00:00Z")
        .asset(&install.base(), &bundle_name("1.3.0"), &bundle)
        .asset_with_digest(&install.base(), &name, binary.len() as u64, &sha256_hex(b"tampered"));
    install.mount_releases(APP_REPO, &[&release]).await;
    install.mount_asset("v1.3.0", &bundle_name("1.3.0"), bundle).await;
    install.mount_asset("v1.3.0", &name, binary).await;
    let before = install.snapshot();

    let request = UpdateRequest::new(Channel::Release).with_tools(false).auto_confirm(true);
    let outcome = install.orchestrator().check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;

    let UpdateOutcome::Failed(report) = outcome else {
        panic!("expected Failed, got {outcome:?}");
    };
    assert_eq!(report.component, Some(Component::Application));
    assert!(matches!(report.error, UpdateError::Integrity { .. }), "{:?}", report.error);
    assert_eq!(install.snapshot(), before);
    assert_eq!(install.state().application.version.as_deref(), Some("1.2.0"));
}

#[tokio::test]
async fn test_bundled_tool_keeps_its_own_timeline() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Nightly, Some(crate::common::timestamp("2024-08-01T00:00:00Z")));
    let orchestrator = install.orchestrator();
    let request = UpdateRequest::new(Channel::Nightly).auto_confirm(true);

    // The nightly app ships a yt-dlp newer than the stable branch's latest
    let bundle = app_bundle("1.3.0");
    let bundled = ytdlp_binary("2024.09.01");
    let name = executable_name("yt-dlp");
    let nightly = ReleaseFixture::new("nightly")
        .name("1.3.0")
        .prerelease()
        .published("2024-09-01T12:00:00Z")
        .asset(&install.base(), "YoutubeConverter-nightly.zip", &bundle)
        .asset(&install.base(), &name, &bundled);
    install.mount_tag(APP_REPO, &nightly).await;
    install.mount_asset("nightly", "YoutubeConverter-nightly.zip", bundle).await;
    install.mount_asset("nightly", &name, bundled).await;
    publish_ytdlp(&install, "2024.08.06").await;

    let first = orchestrator.check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;
    let UpdateOutcome::Applied(applied) = first else {
        panic!("expected Applied, got {first:?}");
    };
    assert!(applied.components.iter().any(|(c, _)| *c == Component::YtDlp));

    let state = install.state();
    assert_eq!(state.application.channel, Some(Channel::Nightly));
    // Recorded on the stable branch's channel, not the application's
    assert_eq!(state.yt_dlp.channel, Some(ToolBranch::Stable.channel()));
    assert_ne!(state.yt_dlp.version.as_deref(), Some("1.3.0"));
    let after_first = install.snapshot();

    let second = orchestrator.check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;
    assert!(matches!(second, UpdateOutcome::UpToDate), "{second:?}");
    assert_eq!(install.snapshot(), after_first);
}

//! The `ytconv` binary end to end.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use ytconv::update::Channel;

use crate::common::TestInstall;

/// A `ytconv` invocation isolated to `config` and `root`.
fn ytconv(config: &Path, root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ytconv").unwrap();
    cmd.arg("--config")
        .arg(config)
        .arg("--install-dir")
        .arg(root)
        .env("YTCONV_NO_PROGRESS", "1")
        .env("NO_COLOR", "1")
        .env_remove("GITHUB_TOKEN")
        .env_remove("RUST_LOG")
        .env_remove("YTCONV_CONFIG")
        .env_remove("YTCONV_INSTALL_DIR");
    cmd
}

/// Config file pointing the updater at `api_base` with startup checks off.
fn write_config(dir: &Path, api_base: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        format!("[update]\napi_base = \"{api_base}\"\ncheck_on_startup = false\nmax_retries = 0\n"),
    )
    .unwrap();
    path
}

#[test]
fn test_config_set_then_get() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");

    ytconv(&config, temp.path())
        .args(["config", "set", "update.channel", "nightly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("update.channel"));

    ytconv(&config, temp.path())
        .args(["config", "get", "update.channel"])
        .assert()
        .success()
        .stdout(predicate::str::diff("nightly\n"));

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("channel = \"nightly\""), "{written}");
}

#[test]
fn test_config_rejects_unknown_channel() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");

    ytconv(&config, temp.path())
        .args(["config", "set", "update.channel", "beta"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("beta"));
    assert!(!config.exists());
}

#[test]
fn test_config_path_prints_location() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");

    ytconv(&config, temp.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_update_rejects_unknown_channel_flag() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");

    ytconv(&config, temp.path()).args(["update", "--channel", "beta"]).assert().failure();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_check_reports_without_changes() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;
    let config = write_config(install.temp.path(), &install.base());
    let before = install.snapshot();

    ytconv(&config, install.root())
        .args(["update", "--check", "--no-tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updates available").and(predicate::str::contains("1.3.0")));

    assert_eq!(install.snapshot(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_yes_applies() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;
    let config = write_config(install.temp.path(), &install.base());

    ytconv(&config, install.root())
        .args(["update", "--yes", "--no-tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Update complete"));

    assert_eq!(install.read("app.bin"), "app 1.3.0");
    assert_eq!(install.state().application.version.as_deref(), Some("1.3.0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_without_tty_declines() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    install.publish_app("1.3.0", "2024-07-01T00:00:00Z").await;
    let config = write_config(install.temp.path(), &install.base());

    ytconv(&config, install.root())
        .args(["update", "--no-tools"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));

    assert_eq!(install.state().application.version.as_deref(), Some("1.2.0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_update_integrity_failure_exits_nonzero() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    let bundle = crate::common::app_bundle("1.3.0");
    let release = ytconv::test_utils::ReleaseFixture::new("v1.3.0")
        .published("2024-07-01T00:00:00Z")
        .asset_with_digest(&install.base(), &crate::common::bundle_name("1.3.0"), bundle.len() as u64, &"0".repeat(64));
    install.mount_releases(crate::common::APP_REPO, &[&release]).await;
    install.mount_asset("v1.3.0", &crate::common::bundle_name("1.3.0"), bundle).await;
    let config = write_config(install.temp.path(), &install.base());

    ytconv(&config, install.root()).args(["update", "--yes", "--no-tools"]).assert().failure();
    assert_eq!(install.state().application.version.as_deref(), Some("1.2.0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_lists_components() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    let config = write_config(install.temp.path(), &install.base());

    ytconv(&config, install.root())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("1.2.0").and(predicate::str::contains("release")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recover_with_nothing_pending() {
    let install = TestInstall::new().await;
    install.install_app("1.2.0", Channel::Release, None);
    let config = write_config(install.temp.path(), &install.base());

    ytconv(&config, install.root())
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to recover"));
}

#[test]
fn test_complete_swap_moves_pending_executable() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");
    let exe = temp.path().join("YoutubeConverter");
    std::fs::write(&exe, b"old").unwrap();
    std::fs::write(temp.path().join("YoutubeConverter.new"), b"new").unwrap();

    ytconv(&config, temp.path())
        .arg("complete-swap")
        .arg("--executable")
        .arg(&exe)
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated"));

    assert_eq!(std::fs::read(&exe).unwrap(), b"new");
    assert!(!temp.path().join("YoutubeConverter.new").exists());
}

//! Shared harness: a temporary install root plus a mock release index.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use ytconv::constants::{DEFAULT_APP_REPO, DEFAULT_FFMPEG_REPO};
use ytconv::test_utils::{ReleaseFixture, init_test_logging, snapshot_tree, write_install, zip_bytes};
use ytconv::update::applier::FaultHook;
use ytconv::update::{
    Applier, AssetRules, Channel, ChannelResolver, ComponentRecord, Fetcher, HttpClient,
    InstallLayout, InstalledState, JsonVersionStore, RetryPolicy, UpdateOrchestrator,
    UpdateSources, VersionStore,
};

pub const APP_REPO: &str = DEFAULT_APP_REPO;
pub const YTDLP_REPO: &str = "yt-dlp/yt-dlp";
pub const FFMPEG_REPO: &str = DEFAULT_FFMPEG_REPO;

/// Name of the application bundle asset for `version`.
pub fn bundle_name(version: &str) -> String {
    format!("YoutubeConverter-{version}.zip")
}

/// An application bundle whose files all carry `version` in their content.
pub fn app_bundle(version: &str) -> Vec<u8> {
    let app = format!("app {version}");
    let core = format!("core {version}");
    let notes = format!("notes {version}");
    zip_bytes(&[
        ("YoutubeConverter/app.bin", app.as_bytes()),
        ("YoutubeConverter/lib/core.dll", core.as_bytes()),
        ("YoutubeConverter/docs/notes.txt", notes.as_bytes()),
        ("YoutubeConverter/settings.json", b"{\"shipped\": true}"),
    ])
}

/// A yt-dlp "binary" that answers `--version`.
pub fn ytdlp_binary(version: &str) -> Vec<u8> {
    format!("#!/bin/sh\necho {version}\n").into_bytes()
}

pub fn timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("valid timestamp")
}

/// A temporary install root served by its own mock index.
pub struct TestInstall {
    pub temp: TempDir,
    pub server: MockServer,
    pub layout: InstallLayout,
}

impl TestInstall {
    pub async fn new() -> Self {
        init_test_logging(None);
        let temp = TempDir::new().expect("temp dir");
        let layout = InstallLayout::new(temp.path().join("YoutubeConverter"));
        std::fs::create_dir_all(layout.root()).expect("install root");
        Self {
            temp,
            server: MockServer::start().await,
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn base(&self) -> String {
        self.server.uri()
    }

    pub fn store(&self) -> Arc<JsonVersionStore> {
        Arc::new(JsonVersionStore::new(&self.layout))
    }

    fn http(&self) -> HttpClient {
        HttpClient::new(self.base(), Duration::from_secs(5)).expect("http client")
    }

    fn applier(&self) -> Applier {
        Applier::new(self.layout.clone(), self.store()).with_own_executable(None)
    }

    pub fn orchestrator(&self) -> UpdateOrchestrator {
        self.orchestrator_with_applier(self.applier())
    }

    pub fn orchestrator_with_fault(&self, hook: FaultHook) -> UpdateOrchestrator {
        self.orchestrator_with_applier(self.applier().with_fault_hook(hook))
    }

    fn orchestrator_with_applier(&self, applier: Applier) -> UpdateOrchestrator {
        let http = self.http();
        let retry = RetryPolicy::fast(2);
        UpdateOrchestrator::new(
            self.layout.clone(),
            self.store(),
            ChannelResolver::new(http.clone(), retry, AssetRules::default()),
            Fetcher::new(http, retry),
            UpdateSources::default(),
        )
        .with_applier(applier)
    }

    /// Lay out an installed application of `version` and record it.
    pub fn install_app(&self, version: &str, channel: Channel, published_at: Option<DateTime<Utc>>) {
        let app = format!("app {version}");
        let core = format!("core {version}");
        write_install(
            self.root(),
            &[
                ("app.bin", app.as_bytes()),
                ("lib/core.dll", core.as_bytes()),
                ("settings.json", b"{\"user\": \"mine\"}"),
            ],
        );
        let state = InstalledState {
            application: ComponentRecord {
                version: Some(version.to_string()),
                channel: Some(channel),
                published_at,
                updated_at: Some(timestamp("2024-01-01T00:00:00Z")),
            },
            ..InstalledState::default()
        };
        self.store().save(&state).expect("save installed state");
    }

    pub fn state(&self) -> InstalledState {
        self.store().load().expect("load installed state")
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        snapshot_tree(self.root())
    }

    /// Whether no staging run directory is left behind.
    pub fn staging_is_empty(&self) -> bool {
        std::fs::read_dir(self.layout.staging_dir()).map_or(true, |mut entries| entries.next().is_none())
    }

    /// Whether no rollback journal is left behind.
    pub fn rollback_is_empty(&self) -> bool {
        std::fs::read_dir(self.layout.rollback_dir()).map_or(true, |mut entries| entries.next().is_none())
    }

    /// Serve `releases` as the release list of `repo`.
    pub async fn mount_releases(&self, repo: &str, releases: &[&ReleaseFixture]) {
        let body: Vec<Value> = releases.iter().map(|r| r.to_json()).collect();
        Mock::given(method("GET"))
            .and(path(format!("/repos/{repo}/releases")))
            .and(query_param("per_page", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Serve `release` under its tag in `repo`.
    pub async fn mount_tag(&self, repo: &str, release: &ReleaseFixture) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/{repo}/releases/tags/{}", release.tag())))
            .respond_with(ResponseTemplate::new(200).set_body_json(release.to_json()))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_asset(&self, tag: &str, name: &str, content: Vec<u8>) {
        self.mount_asset_delayed(tag, name, content, Duration::ZERO).await;
    }

    pub async fn mount_asset_delayed(&self, tag: &str, name: &str, content: Vec<u8>, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(ReleaseFixture::download_path(tag, name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Publish application `version` as the only stable release.
    pub async fn publish_app(&self, version: &str, published: &str) -> ReleaseFixture {
        let bundle = app_bundle(version);
        let release = ReleaseFixture::new(format!("v{version}"))
            .published(published)
            .asset(&self.base(), &bundle_name(version), &bundle);
        self.mount_releases(APP_REPO, &[&release]).await;
        self.mount_asset(release.tag(), &bundle_name(version), bundle).await;
        release
    }
}

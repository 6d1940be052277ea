//! Self-update of the YoutubeConverter application and its bundled tools.
//!
//! Three components are kept current: the application bundle itself, yt-dlp, and
//! ffmpeg (with ffprobe). Each has its own release source and its own record in the
//! installed state; the application's releases may also carry tool builds, which
//! are then installed together with it.
//!
//! # Update Process Flow
//!
//! ```text
//! 1. Resolve          ChannelResolver
//!    └── channel (release | prerelease | nightly) → ReleaseDescriptor
//!
//! 2. Compare          UpdateComparator
//!    ├── version ordering for release/prerelease
//!    ├── publish time for nightly
//!    └── channel switch always eligible, downgrade never
//!
//! 3. Fetch            Fetcher → StagingArea
//!    ├── concurrent, resumable, checksum-verified downloads
//!    └── transport errors retried with exponential backoff
//!
//! 4. Apply            Applier
//!    ├── Staged → Validated → Swapped → Committed
//!    ├── per-file temp-and-rename, journaled backups
//!    └── any failure → RolledBack, installed state untouched
//! ```
//!
//! [`UpdateOrchestrator`] runs the whole sequence and guarantees that at most one
//! operation touches an install root at a time.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use ytconv::update::{
//!     AssetRules, Channel, ChannelResolver, DeclineAll, Fetcher, HttpClient, InstallLayout,
//!     JsonVersionStore, RetryPolicy, UpdateOrchestrator, UpdateRequest, UpdateSources,
//! };
//!
//! # async fn example() -> ytconv::core::Result<()> {
//! let layout = InstallLayout::new("/opt/youtubeconverter");
//! let http = HttpClient::github()?;
//! let retry = RetryPolicy::default();
//! let orchestrator = UpdateOrchestrator::new(
//!     layout.clone(),
//!     Arc::new(JsonVersionStore::new(&layout)),
//!     ChannelResolver::new(http.clone(), retry, AssetRules::default()),
//!     Fetcher::new(http, retry),
//!     UpdateSources::default(),
//! );
//!
//! let request = UpdateRequest::new(Channel::Release).auto_confirm(true);
//! let outcome = orchestrator.check_and_apply(&request, &DeclineAll, &CancellationToken::new()).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod applier;
pub mod archive;
pub mod channel;
pub mod check_cache;
pub mod comparator;
pub mod fetcher;
pub mod http;
pub mod layout;
pub mod lock;
pub mod orchestrator;
pub mod plan;
pub mod release;
pub mod resolver;
pub mod retry;
pub mod rollback;
pub mod self_replace;
pub mod staging;
pub mod state;
pub mod tools;
pub mod verification;
pub mod version;

pub use applier::{Applier, CommitResult, CommitUnit, ComponentPhase, RecoveryReport, RelaunchRequest};
pub use channel::{Channel, ToolBranch};
pub use check_cache::{CheckCache, CheckCacheStore};
pub use comparator::{Eligibility, UpdateComparator};
pub use fetcher::{Fetcher, StagedAsset};
pub use http::HttpClient;
pub use layout::InstallLayout;
pub use orchestrator::{
    AppliedUpdate, DeclineAll, FailureReport, UpdateOrchestrator, UpdateOutcome, UpdatePrompt,
    UpdateRequest, UpdateSources,
};
pub use plan::{ComponentAction, UpdatePlan};
pub use release::{AssetDescriptor, Component, ReleaseDescriptor};
pub use resolver::ChannelResolver;
pub use retry::RetryPolicy;
pub use staging::StagingArea;
pub use state::{ComponentRecord, InstalledState, JsonVersionStore, MemoryVersionStore, VersionStore};
pub use tools::AssetRules;

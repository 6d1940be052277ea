//! Downloads release assets into a [`StagingArea`].
//!
//! Every download is streamed to `<staging>/downloads/<name>.part` and hashed on the
//! fly. Only a fully received, size- and checksum-verified file is renamed to its final
//! staging name. The rules:
//!
//! - **Checksum mismatch** (or more bytes than declared): [`UpdateError::Integrity`].
//!   The partial file is deleted and the asset is not retried.
//! - **Short read**, connection error, or a request/chunk timeout:
//!   [`UpdateError::Transport`], retried with exponential backoff. A retry resumes
//!   with an HTTP `Range` request and keeps hashing from the bytes already on disk;
//!   a server that answers `200` instead of `206` restarts from zero.
//! - **Cancellation** is observed between chunks and during backoff. The partial
//!   file is deleted.
//!
//! [`Fetcher::fetch_all`] runs downloads concurrently; each asset succeeds or fails
//! on its own.

use futures::StreamExt;
use futures::future::join_all;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::http::{HttpClient, check_status};
use super::release::AssetDescriptor;
use super::retry::RetryPolicy;
use super::staging::StagingArea;
use super::verification::ChecksumVerifier;
use crate::core::{Result, UpdateError};
use crate::utils::DownloadProgress;

/// A verified download sitting in the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    pub asset: AssetDescriptor,
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the staged bytes.
    pub sha256: String,
    pub size: u64,
}

/// Streams assets to disk with verification, retries, and cancellation.
#[derive(Clone)]
pub struct Fetcher {
    http: HttpClient,
    retry: RetryPolicy,
    progress: Option<DownloadProgress>,
}

impl Fetcher {
    #[must_use]
    pub const fn new(http: HttpClient, retry: RetryPolicy) -> Self {
        Self {
            http,
            retry,
            progress: None,
        }
    }

    /// Show a progress bar per download.
    #[must_use]
    pub fn with_progress(mut self, progress: DownloadProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Download one asset into the staging area.
    #[instrument(skip_all, fields(asset = %asset.name))]
    pub async fn fetch(
        &self,
        asset: &AssetDescriptor,
        staging: &StagingArea,
        cancel: &CancellationToken,
    ) -> Result<StagedAsset> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let target = staging.download_path(&asset.name);
        let partial = part_path(&target);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bar = match &self.progress {
            Some(progress) => progress.add(&asset.name, asset.size.unwrap_or(0)),
            None => indicatif::ProgressBar::hidden(),
        };

        let operation = format!("downloading {}", asset.name);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpdateError::Cancelled),
            result = self.retry.run(&operation, || self.attempt(asset, &partial, cancel, &bar)) => result,
        };
        bar.finish_and_clear();

        match result {
            Ok((sha256, size)) => {
                tokio::fs::rename(&partial, &target).await?;
                info!(size, "Downloaded and verified asset");
                Ok(StagedAsset {
                    asset: asset.clone(),
                    path: target,
                    sha256,
                    size,
                })
            }
            Err(error) => {
                discard(&partial).await;
                warn!(error_kind = error.kind(), error = %error, "Download failed");
                Err(error)
            }
        }
    }

    /// Download several assets concurrently.
    ///
    /// Results are returned in input order. A failed asset does not affect the others;
    /// their staged files stay valid.
    pub async fn fetch_all(
        &self,
        assets: &[AssetDescriptor],
        staging: &StagingArea,
        cancel: &CancellationToken,
    ) -> Vec<Result<StagedAsset>> {
        join_all(assets.iter().map(|asset| self.fetch(asset, staging, cancel))).await
    }

    /// One download attempt, resuming from a partial file when possible.
    async fn attempt(
        &self,
        asset: &AssetDescriptor,
        partial: &Path,
        cancel: &CancellationToken,
        bar: &indicatif::ProgressBar,
    ) -> Result<(String, u64)> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let operation = format!("downloading {}", asset.name);
        let existing = tokio::fs::metadata(partial).await.map(|m| m.len()).unwrap_or(0);

        let mut request = self.http.get(&asset.url);
        if existing > 0 {
            debug!(offset = existing, "Resuming download");
            request = request.header(RANGE, format!("bytes={existing}-"));
        }
        let response = self.http.send(request, &operation).await?;

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            discard(partial).await;
            return Err(UpdateError::transport(&operation, "server rejected the resume range"));
        }
        let response = check_status(response, &asset.name, &operation)?;
        let resumed = existing > 0 && response.status() == StatusCode::PARTIAL_CONTENT;

        let (mut file, mut hasher, mut written) = if resumed {
            let hasher = hash_prefix(partial).await?;
            let file = OpenOptions::new().append(true).open(partial).await?;
            (file, hasher, existing)
        } else {
            (File::create(partial).await?, Sha256::new(), 0)
        };
        bar.set_position(written);

        let chunk_timeout = self.http.request_timeout();
        let mut stream = std::pin::pin!(response.bytes_stream());
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(UpdateError::Cancelled),
                next = tokio::time::timeout(chunk_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    file.flush().await?;
                    return Err(UpdateError::transport(&operation, e));
                }
                Err(_) => {
                    file.flush().await?;
                    return Err(UpdateError::transport(
                        &operation,
                        format!("no data received for {chunk_timeout:?}"),
                    ));
                }
            };

            written += chunk.len() as u64;
            if let Some(expected) = asset.size {
                if written > expected {
                    drop(file);
                    discard(partial).await;
                    return Err(UpdateError::Integrity {
                        asset: asset.name.clone(),
                        expected: format!("{expected} bytes"),
                        actual: format!("at least {written} bytes"),
                    });
                }
            }
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            bar.inc(chunk.len() as u64);
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = asset.size {
            if written < expected {
                return Err(UpdateError::transport(
                    &operation,
                    format!("short read: received {written} of {expected} bytes"),
                ));
            }
        }

        let digest = hex::encode(hasher.finalize());
        if let Some(expected) = &asset.checksum {
            if let Err(error) = ChecksumVerifier::check(&asset.name, expected, &digest) {
                discard(partial).await;
                return Err(error);
            }
        } else {
            debug!("No published checksum; size check only");
        }

        Ok((digest, written))
    }
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

async fn hash_prefix(path: &Path) -> Result<Sha256> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            return Ok(hasher);
        }
        hasher.update(&buffer[..n]);
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove partial download");
        }
    }
}

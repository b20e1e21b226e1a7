//! # Source Fetching
//!
//! This module provides the `SourceFetcher`, the one place that turns a
//! [`ManifestSource`] into something on local disk. Local sources are used in
//! place; remote sources are checked out into the [`FetchCache`] and read from
//! there.
//!
//! ## Design
//!
//! Git access goes through the **`GitOperations`** trait. The application uses
//! `DefaultGitOperations`, which shells out to the system `git` command; tests
//! swap in a mock that records calls, so cache behaviour can be checked
//! without network access.
//!
//! Concurrency rules for remote sources:
//!
//! - A key already checked out during this run is served from the cache's
//!   ready index without taking any lock.
//! - Otherwise the caller takes that key's lock. A second caller for the same
//!   key blocks until the first finishes and then finds the slot ready, so one
//!   key is never checked out twice at once.
//! - Different keys have different locks and proceed in parallel.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::cache::{CacheKey, FetchCache, SlotMarker, SlotState};
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::source::{ManifestSource, RemoteRef};

/// Trait for git operations - allows mocking in tests
pub trait GitOperations: Send + Sync {
    /// Shallow checkout of `url` at `ref_name` (default branch when `None`)
    /// into `target_dir`, returning the ref actually checked out.
    fn checkout(&self, url: &str, ref_name: Option<&str>, target_dir: &Path) -> Result<String>;

    /// Update an existing checkout to the current tip of `ref_name`.
    fn update(&self, url: &str, ref_name: &str, repo_dir: &Path) -> Result<()>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command.
pub struct DefaultGitOperations;

impl GitOperations for DefaultGitOperations {
    fn checkout(&self, url: &str, ref_name: Option<&str>, target_dir: &Path) -> Result<String> {
        crate::git::checkout_shallow(url, ref_name, target_dir)
    }

    fn update(&self, url: &str, ref_name: &str, repo_dir: &Path) -> Result<()> {
        crate::git::update_checkout(url, ref_name, repo_dir)
    }
}

impl From<&RemoteRef> for CacheKey {
    fn from(remote: &RemoteRef) -> Self {
        CacheKey::new(&remote.repo, remote.r#ref.as_deref())
    }
}

/// Resolves manifest sources to local paths and bytes
pub struct SourceFetcher {
    git_ops: Box<dyn GitOperations>,
    cache: FetchCache,
}

impl SourceFetcher {
    /// Fetcher using the system `git` and a cache under `cache_root`
    pub fn new(cache_root: PathBuf) -> Self {
        Self::with_operations(Box::new(DefaultGitOperations), cache_root)
    }

    /// Fetcher with a custom `GitOperations` implementation
    pub fn with_operations(git_ops: Box<dyn GitOperations>, cache_root: PathBuf) -> Self {
        Self {
            git_ops,
            cache: FetchCache::new(cache_root),
        }
    }

    pub fn cache(&self) -> &FetchCache {
        &self.cache
    }

    /// Ensure the checkout for `key` exists, returning its directory
    pub fn checkout(&self, key: &CacheKey, cancel: &CancellationToken) -> Result<PathBuf> {
        cancel.check()?;
        if let Some(path) = self.cache.ready_path(key) {
            debug!("Cache hit (in-run) for {}@{}", key.url, ref_label(key));
            return Ok(path);
        }

        let lock = self.cache.lock_for(key);
        let _guard = lock.lock().map_err(|_| Error::LockPoisoned {
            context: format!("fetch lock for {}", key.url),
        })?;

        // Another caller may have finished while we waited
        if let Some(path) = self.cache.ready_path(key) {
            debug!("Cache hit (after wait) for {}@{}", key.url, ref_label(key));
            return Ok(path);
        }
        cancel.check()?;

        let slot = self.cache.slot_path(key);
        match self.cache.inspect(&slot)? {
            SlotState::Ready(_) => {
                debug!("Cache hit (disk) for {}@{} at {}", key.url, ref_label(key), slot.display());
            }
            SlotState::Stale => {
                self.cache.discard_stale(&slot)?;
                self.fetch_into(key, &slot)?;
            }
            SlotState::Missing => {
                debug!("Cache miss for {}@{}", key.url, ref_label(key));
                self.fetch_into(key, &slot)?;
            }
        }

        self.cache.mark_ready(key.clone(), slot.clone());
        Ok(slot)
    }

    fn fetch_into(&self, key: &CacheKey, slot: &Path) -> Result<()> {
        info!("Fetching {}@{}", key.url, ref_label(key));
        if let Some(parent) = slot.parent() {
            fs::create_dir_all(parent)?;
        }

        match self.git_ops.checkout(&key.url, key.r#ref.as_deref(), slot) {
            Ok(resolved) => self.cache.write_marker(slot, &SlotMarker::new(key, &resolved)),
            Err(e) => {
                if slot.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(slot) {
                        warn!(
                            "Failed to remove partial checkout {}: {}",
                            slot.display(),
                            cleanup
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Local path for a source, checking out remote repositories as needed.
    ///
    /// The path is not checked for existence.
    pub fn materialize(&self, source: &ManifestSource, cancel: &CancellationToken) -> Result<PathBuf> {
        match source {
            ManifestSource::Local(path) => Ok(path.clone()),
            ManifestSource::Remote(remote) => {
                let slot = self.checkout(&CacheKey::from(remote), cancel)?;
                Ok(match &remote.path {
                    Some(sub) => slot.join(sub),
                    None => slot,
                })
            }
        }
    }

    /// Read the bytes of a file source
    pub fn fetch(&self, source: &ManifestSource, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let path = self.materialize(source, cancel)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound {
                path: source.to_string(),
                context: "file does not exist".to_string(),
            },
            _ => Error::Io(e),
        })
    }

    /// Force one key to be brought up to date with its remote
    pub fn refresh(&self, key: &CacheKey) -> Result<()> {
        let lock = self.cache.lock_for(key);
        let _guard = lock.lock().map_err(|_| Error::LockPoisoned {
            context: format!("fetch lock for {}", key.url),
        })?;

        let slot = self.cache.slot_path(key);
        match self.cache.inspect(&slot)? {
            SlotState::Ready(marker) => {
                info!("Refreshing {}@{}", key.url, marker.resolved_ref);
                self.git_ops.update(&key.url, &marker.resolved_ref, &slot)?;
                self.cache
                    .write_marker(&slot, &SlotMarker::new(key, &marker.resolved_ref))?;
            }
            SlotState::Stale => {
                self.cache.discard_stale(&slot)?;
                self.fetch_into(key, &slot)?;
            }
            SlotState::Missing => self.fetch_into(key, &slot)?,
        }

        self.cache.mark_ready(key.clone(), slot);
        Ok(())
    }

    /// Refresh every completed slot, returning the keys refreshed
    pub fn refresh_all(&self) -> Result<Vec<CacheKey>> {
        let mut refreshed = Vec::new();
        for entry in self.cache.list()? {
            let key = entry.marker.key();
            self.refresh(&key)?;
            refreshed.push(key);
        }
        Ok(refreshed)
    }
}

fn ref_label(key: &CacheKey) -> &str {
    key.r#ref.as_deref().unwrap_or("HEAD")
}

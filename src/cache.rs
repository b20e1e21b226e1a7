//! # Caching
//!
//! Two caches live here:
//!
//! - **`FetchCache`**: the on-disk store of remote checkouts, one slot per
//!   (repository URL, ref). It hands out a per-key lock so duplicate fetches of
//!   the same key serialise while different keys proceed in parallel, and keeps
//!   an in-run index of ready slots that can be read without taking any lock.
//! - **`MemoCache`**: a small in-process memo used within one resolution run,
//!   for example to resolve a shared base app only once.

use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the marker file written into a slot once its checkout completes
pub const MARKER_FILE: &str = ".d0s-cache.json";

/// Cache key combining URL and reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub url: String,
    /// `None` follows the remote's default branch
    pub r#ref: Option<String>,
}

impl CacheKey {
    pub fn new(url: &str, r#ref: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            r#ref: r#ref.map(str::to_string),
        }
    }
}

/// Contents of a slot's marker file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMarker {
    pub url: String,
    /// Ref as requested, `None` for the default branch
    pub r#ref: Option<String>,
    /// Ref actually checked out
    pub resolved_ref: String,
    /// Seconds since the Unix epoch
    pub fetched_at: u64,
}

impl SlotMarker {
    pub fn new(key: &CacheKey, resolved_ref: &str) -> Self {
        let fetched_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            url: key.url.clone(),
            r#ref: key.r#ref.clone(),
            resolved_ref: resolved_ref.to_string(),
            fetched_at,
        }
    }

    pub fn key(&self) -> CacheKey {
        CacheKey {
            url: self.url.clone(),
            r#ref: self.r#ref.clone(),
        }
    }
}

/// State of a slot directory on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing on disk
    Missing,
    /// Directory without a marker: an interrupted checkout
    Stale,
    /// Completed checkout
    Ready(SlotMarker),
}

/// A listed cache slot
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub marker: SlotMarker,
}

/// On-disk cache of remote checkouts
#[derive(Debug)]
pub struct FetchCache {
    root: PathBuf,
    locks: DashMap<CacheKey, Arc<Mutex<()>>>,
    ready: DashMap<CacheKey, PathBuf>,
}

impl FetchCache {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            locks: DashMap::new(),
            ready: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a key's checkout
    pub fn slot_path(&self, key: &CacheKey) -> PathBuf {
        crate::git::url_to_cache_path(&self.root, &key.url, key.r#ref.as_deref())
    }

    /// The lock serialising work on one key
    pub fn lock_for(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Checkout directory for a key already verified during this run
    pub fn ready_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.ready.get(key).map(|entry| entry.value().clone())
    }

    pub fn mark_ready(&self, key: CacheKey, path: PathBuf) {
        self.ready.insert(key, path);
    }

    /// Drop a key from the in-run index so the next fetch re-checks disk
    pub fn forget(&self, key: &CacheKey) {
        self.ready.remove(key);
    }

    /// Inspect a slot directory.
    ///
    /// A marker without a `.git` directory beside it, or a marker that cannot
    /// be parsed, is reported as a corrupt slot.
    pub fn inspect(&self, slot: &Path) -> Result<SlotState> {
        if !slot.exists() {
            return Ok(SlotState::Missing);
        }

        let marker_path = slot.join(MARKER_FILE);
        if !marker_path.exists() {
            return Ok(SlotState::Stale);
        }

        let content = fs::read_to_string(&marker_path)?;
        let marker: SlotMarker = serde_json::from_str(&content).map_err(|e| Error::Cache {
            message: format!("unreadable marker {}: {}", marker_path.display(), e),
        })?;

        if !slot.join(".git").is_dir() {
            return Err(Error::Cache {
                message: format!(
                    "slot {} for {} has a marker but no checkout; run `d0s cache clean`",
                    slot.display(),
                    marker.url
                ),
            });
        }

        Ok(SlotState::Ready(marker))
    }

    pub fn write_marker(&self, slot: &Path, marker: &SlotMarker) -> Result<()> {
        let content = serde_json::to_string_pretty(marker)?;
        fs::write(slot.join(MARKER_FILE), content)?;
        Ok(())
    }

    /// Remove a slot directory that was left half-written
    pub fn discard_stale(&self, slot: &Path) -> Result<()> {
        warn!("Discarding incomplete cache slot {}", slot.display());
        fs::remove_dir_all(slot)?;
        Ok(())
    }

    /// List completed slots, sorted by URL then ref
    pub fn list(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        if !self.root.exists() {
            return Ok(entries);
        }

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            match self.inspect(&path) {
                Ok(SlotState::Ready(marker)) => entries.push(CacheEntry { path, marker }),
                Ok(_) => debug!("Skipping incomplete cache slot {}", path.display()),
                Err(e) => warn!("Skipping cache slot {}: {}", path.display(), e),
            }
        }

        entries.sort_by(|a, b| {
            (a.marker.url.as_str(), a.marker.r#ref.as_deref())
                .cmp(&(b.marker.url.as_str(), b.marker.r#ref.as_deref()))
        });
        Ok(entries)
    }

    /// Delete one key's slot. Returns whether anything was removed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        self.forget(key);
        let slot = self.slot_path(key);
        if slot.exists() {
            fs::remove_dir_all(&slot)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Delete every slot under the cache root. Returns the number removed.
    pub fn clean(&self) -> Result<usize> {
        self.ready.clear();
        if !self.root.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// In-process memo for the duration of one resolution run
#[derive(Debug)]
pub struct MemoCache<K, V> {
    cache: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> MemoCache<K, V> {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Get a cached value, or compute and cache it if not present.
    ///
    /// The lock is not held while `processor` runs, so a processor may itself
    /// consult the memo for other keys.
    pub fn get_or_process<F>(&self, key: K, processor: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(cached) = self.get(&key)? {
            return Ok(cached);
        }

        let result = processor()?;

        let mut cache = self.cache.lock().map_err(|_| Error::LockPoisoned {
            context: "memo cache".to_string(),
        })?;
        Ok(cache.entry(key).or_insert(result).clone())
    }

    /// Get a value from the memo without computing
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let cache = self.cache.lock().map_err(|_| Error::LockPoisoned {
            context: "memo cache".to_string(),
        })?;
        Ok(cache.get(key).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        let cache = self.cache.lock().map_err(|_| Error::LockPoisoned {
            context: "memo cache".to_string(),
        })?;
        Ok(cache.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

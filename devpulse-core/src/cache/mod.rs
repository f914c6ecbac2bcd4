//! Disk cache for network-derived data
//!
//! Every response pulled from the remote API goes through [`DiskCache::cached`],
//! which stores the produced value as `<root>/<key parts joined by "-">.json`.
//!
//! ## Validity
//!
//! The cache uses a single, whole-cache time-to-live. A marker file,
//! `last-fetch-date.txt`, holds the time of the most recent write of *any*
//! entry. While `now - marker < ttl` every existing entry is trusted; once the
//! marker is older than the TTL no entry is trusted and every call goes to the
//! producer again.
//!
//! Each miss refreshes the marker, so validity at startup is remembered: if
//! the marker had already expired when the cache was initialized, only
//! entries written by this instance are trusted afterwards. Older files are
//! refetched even though the marker now looks fresh.
//!
//! ## Recovery
//!
//! An entry that cannot be read or deserialized (partial write, schema drift)
//! is deleted and refetched. The caller never sees that error.
//!
//! ## Concurrency
//!
//! Calls for the same key are serialized through a per-key async lock, so a
//! second concurrent caller waits for the first and then reads the entry it
//! wrote instead of running its own producer. Different keys never block each
//! other. The directory itself is not locked across processes; concurrent
//! runs fall back to last-writer-wins.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;

use crate::error::Result;

/// Name of the shared TTL marker file.
pub const MARKER_FILE: &str = "last-fetch-date.txt";

const KEY_DELIMITER: &str = "-";

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-[01]\d-[0-3]\dT[0-2]\d:[0-5]\d:[0-5]\d\.\d+([+-][0-2]\d:[0-5]\d|Z)$")
        .expect("valid regex")
});

/// Returns true for strict ISO-8601 timestamps with fractional seconds,
/// e.g. `2024-03-01T10:00:00.000Z` or `2024-03-01T10:00:00.000+05:30`.
pub fn looks_like_date(value: &str) -> bool {
    ISO_DATE.is_match(value)
}

/// Parses a strict ISO-8601 timestamp; anything else is `None`.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if !looks_like_date(value) {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// TTL-gated, corruption-tolerant cache of JSON values on disk.
pub struct DiskCache {
    root: PathBuf,
    ttl: Duration,
    created: OnceCell<()>,
    /// Marker validity when the cache was initialized
    valid_at_start: OnceCell<bool>,
    /// Entries written by this instance
    written: Mutex<HashSet<PathBuf>>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DiskCache {
    /// Create a cache rooted at `root`. Nothing touches the disk until
    /// [`init`](Self::init) or the first [`cached`](Self::cached) call.
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            created: OnceCell::new(),
            valid_at_start: OnceCell::new(),
            written: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Ensure the cache directory exists and record whether the marker is
    /// valid. Runs once; later calls are no-ops.
    pub async fn init(&self) -> Result<()> {
        self.created
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.root).await?;
                tracing::debug!(root = %self.root.display(), "Cache directory ready");
                Ok::<(), crate::error::Error>(())
            })
            .await?;
        self.valid_at_start
            .get_or_init(|| async {
                let valid = self.is_valid().await;
                tracing::debug!(valid, "Cache validity at startup");
                valid
            })
            .await;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// File name for a key. Path separators inside a part are replaced so a
    /// key can never escape the cache root.
    pub fn entry_path(&self, key_parts: &[&str]) -> PathBuf {
        let joined = key_parts
            .iter()
            .map(|part| part.replace(['/', '\\'], "_"))
            .collect::<Vec<_>>()
            .join(KEY_DELIMITER);
        self.root.join(format!("{}.json", joined))
    }

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(MARKER_FILE)
    }

    /// Time of the most recent write, if the marker exists and parses.
    pub async fn last_fetch(&self) -> Option<DateTime<Utc>> {
        let contents = tokio::fs::read_to_string(self.marker_path()).await.ok()?;
        parse_date(contents.trim())
    }

    /// Whether the marker is currently within the TTL.
    pub async fn is_valid(&self) -> bool {
        match self.last_fetch().await {
            Some(last_fetch) => Utc::now() - last_fetch < self.ttl,
            None => false,
        }
    }

    /// Return the cached value for `key_parts`, or run `produce` and cache
    /// its result.
    ///
    /// Producer errors are returned unchanged and nothing is written.
    pub async fn cached<T, F, Fut>(&self, key_parts: &[&str], produce: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.init().await?;

        let path = self.entry_path(key_parts);
        let key = path.to_string_lossy().into_owned();
        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.read_or_produce(&path, produce).await
        };
        drop(lock);
        self.release_key(&key);
        result
    }

    async fn read_or_produce<T, F, Fut>(&self, path: &Path, produce: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.trusts(path).await {
            match tokio::fs::read(path).await {
                Ok(contents) => match serde_json::from_slice::<T>(&contents) {
                    Ok(value) => {
                        tracing::debug!(path = %path.display(), "Cache hit");
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Corrupt cache entry, deleting and going to the network instead"
                        );
                        self.remove_entry(path).await;
                    }
                },
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Unreadable cache entry, deleting and going to the network instead"
                    );
                    self.remove_entry(path).await;
                }
            }
        }

        tracing::debug!(path = %path.display(), "Cache miss");
        let value = produce().await?;

        let body = serde_json::to_vec(&value)?;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        tokio::try_join!(
            tokio::fs::write(path, body),
            tokio::fs::write(self.marker_path(), now)
        )?;
        self.written_entries().insert(path.to_path_buf());

        Ok(value)
    }

    /// An entry is trusted while the marker is valid, and only if the marker
    /// was already valid at startup or this instance wrote the entry.
    async fn trusts(&self, path: &Path) -> bool {
        if !self.is_valid().await {
            return false;
        }
        self.valid_at_start.get().copied().unwrap_or(false)
            || self.written_entries().contains(path)
    }

    fn written_entries(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn remove_entry(&self, path: &Path) {
        self.written_entries().remove(path);
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to delete cache entry");
            }
        }
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.entry(key.to_string()).or_default().clone()
    }

    /// Drop the per-key lock once nobody else is waiting on it.
    fn release_key(&self, key: &str) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = in_flight.get(key) {
            if Arc::strong_count(lock) == 1 {
                in_flight.remove(key);
            }
        }
    }

    /// Delete every cached entry and the marker.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.written_entries().clear();

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_cache_file = path.extension().is_some_and(|ext| ext == "json")
                || path.file_name().is_some_and(|name| name == MARKER_FILE);
            if is_cache_file {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        tracing::info!(root = %self.root.display(), removed, "Cleared disk cache");
        Ok(())
    }
}

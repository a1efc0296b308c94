//! Dedup cache of seen-message fingerprints.
//!
//! The store records when each fingerprint was first seen. There is no
//! eviction; the set grows for as long as the mailbox is watched.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::filter::Fingerprint;
use crate::{Error, Result};

/// A cache shared by every cycle run for one credential.
///
/// A cycle holds the lock from load to persist.
pub type SharedCache = Arc<tokio::sync::Mutex<Box<dyn CacheStore>>>;

/// Wraps a store for sharing between the foreground and the monitor.
#[must_use]
pub fn shared(store: impl CacheStore + 'static) -> SharedCache {
    let store: Box<dyn CacheStore> = Box::new(store);
    Arc::new(tokio::sync::Mutex::new(store))
}

/// Durable set of seen fingerprints.
pub trait CacheStore: Send + Sync {
    /// Merges the durable store into memory.
    ///
    /// A missing or unreadable store is logged and treated as empty.
    fn load(&mut self);

    /// Returns true if the fingerprint has been recorded.
    fn contains(&self, fingerprint: &Fingerprint) -> bool;

    /// Records a fingerprint. Adding a known fingerprint is a no-op.
    fn add(&mut self, fingerprint: Fingerprint);

    /// Number of recorded fingerprints.
    fn size(&self) -> usize;

    /// Writes pending additions to the durable store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn persist(&mut self) -> Result<()>;

    /// Describes the store.
    fn status(&self) -> CacheStatus;
}

/// Snapshot of a cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    /// Number of recorded fingerprints.
    pub entries: usize,
    /// Whether the durable store exists.
    pub store_exists: bool,
    /// Size of the durable store in bytes.
    pub store_bytes: u64,
    /// Earliest first-seen timestamp.
    pub oldest_entry: Option<String>,
    /// Latest first-seen timestamp.
    pub newest_entry: Option<String>,
    /// Where the store lives, if on disk.
    pub location: Option<String>,
}

/// Fingerprint → first-seen timestamp, shared by both stores.
#[derive(Debug, Default)]
struct SeenSet {
    entries: BTreeMap<Fingerprint, String>,
    dirty: bool,
}

impl SeenSet {
    fn add(&mut self, fingerprint: Fingerprint) {
        if !self.entries.contains_key(&fingerprint) {
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            self.entries.insert(fingerprint, now);
            self.dirty = true;
        }
    }

    fn merge(&mut self, loaded: BTreeMap<Fingerprint, String>) {
        for (fingerprint, first_seen) in loaded {
            self.entries.entry(fingerprint).or_insert(first_seen);
        }
    }

    fn status(&self) -> CacheStatus {
        CacheStatus {
            entries: self.entries.len(),
            store_exists: false,
            store_bytes: 0,
            oldest_entry: self.entries.values().min().cloned(),
            newest_entry: self.entries.values().max().cloned(),
            location: None,
        }
    }
}

/// In-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    seen: SeenSet,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCache {
    fn load(&mut self) {}

    fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.entries.contains_key(fingerprint)
    }

    fn add(&mut self, fingerprint: Fingerprint) {
        self.seen.add(fingerprint);
    }

    fn size(&self) -> usize {
        self.seen.entries.len()
    }

    fn persist(&mut self) -> Result<()> {
        self.seen.dirty = false;
        Ok(())
    }

    fn status(&self) -> CacheStatus {
        self.seen.status()
    }
}

/// JSON file cache: `{"<fingerprint>": "<first seen, RFC 3339>", ...}`.
///
/// A bare JSON array of fingerprints is also accepted on load.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    seen: SeenSet,
}

impl JsonFileCache {
    /// Creates a cache backed by the given file. Nothing is read until
    /// [`CacheStore::load`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: SeenSet::default(),
        }
    }

    /// Creates a cache at the platform cache directory
    /// (`~/.cache/mailwatch/seen.json` on Linux).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no cache directory.
    pub fn at_default_location() -> Result<Self> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| Error::Config("no cache directory on this platform".to_string()))?;
        Ok(Self::new(dir.join("mailwatch").join("seen.json")))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_store(&self) -> Result<BTreeMap<Fingerprint, String>> {
        let bytes = fs::read(&self.path)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        let loaded_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

        let entries = match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, first_seen)| {
                    let first_seen = first_seen
                        .as_str()
                        .map_or_else(|| loaded_at.clone(), str::to_string);
                    (Fingerprint::from_hex(key), first_seen)
                })
                .collect(),
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(Fingerprint::from_hex))
                .map(|fingerprint| (fingerprint, loaded_at.clone()))
                .collect(),
            _ => {
                return Err(Error::CacheFormat(serde::de::Error::custom(
                    "expected an object or a list of fingerprints",
                )));
            }
        };
        Ok(entries)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("seen.json"), ToOwned::to_owned);
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Writes `bytes` to `tmp`, syncs it, then renames it over `path`, so a
/// crash leaves either the old store or the new one.
fn replace_file(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, path)?;

    #[cfg(unix)]
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        // Persist the rename itself.
        if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
            debug!(dir = %dir.display(), error = %e, "could not sync cache directory");
        }
    }
    Ok(())
}

impl CacheStore for JsonFileCache {
    fn load(&mut self) {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no cache store yet");
            return;
        }
        match self.read_store() {
            Ok(loaded) => {
                debug!(path = %self.path.display(), entries = loaded.len(), "cache loaded");
                self.seen.merge(loaded);
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cache store unreadable, starting empty");
            }
        }
    }

    fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.entries.contains_key(fingerprint)
    }

    fn add(&mut self, fingerprint: Fingerprint) {
        self.seen.add(fingerprint);
    }

    fn size(&self) -> usize {
        self.seen.entries.len()
    }

    fn persist(&mut self) -> Result<()> {
        if !self.seen.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(&self.seen.entries)?;
        replace_file(&self.temp_path(), &self.path, &bytes)?;

        self.seen.dirty = false;
        debug!(path = %self.path.display(), entries = self.seen.entries.len(), "cache persisted");
        Ok(())
    }

    fn status(&self) -> CacheStatus {
        let metadata = fs::metadata(&self.path).ok();
        CacheStatus {
            store_exists: metadata.is_some(),
            store_bytes: metadata.map_or(0, |m| m.len()),
            location: Some(self.path.display().to_string()),
            ..self.seen.status()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::from_hex(s)
    }

    #[test]
    fn test_memory_cache_idempotent_add() {
        let mut cache = MemoryCache::new();
        cache.add(fp("a"));
        cache.add(fp("a"));
        assert_eq!(cache.size(), 1);
        assert!(cache.contains(&fp("a")));
        assert!(!cache.contains(&fp("b")));
    }

    #[test]
    fn test_file_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("seen.json");

        let mut cache = JsonFileCache::new(&path);
        cache.load();
        cache.add(fp("abc"));
        cache.persist().unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("seen.json.tmp").exists());

        let mut reloaded = JsonFileCache::new(&path);
        reloaded.load();
        assert!(reloaded.contains(&fp("abc")));
        assert_eq!(reloaded.size(), 1);
    }

    #[test]
    fn test_persist_replaces_store_over_stale_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        let tmp = dir.path().join("seen.json.tmp");

        let mut first = JsonFileCache::new(&path);
        first.add(fp("a"));
        first.persist().unwrap();
        fs::write(&tmp, b"{ half written").unwrap();

        let mut second = JsonFileCache::new(&path);
        second.load();
        second.add(fp("b"));
        second.persist().unwrap();

        assert!(!tmp.exists());
        let mut reloaded = JsonFileCache::new(&path);
        reloaded.load();
        assert!(reloaded.contains(&fp("a")));
        assert!(reloaded.contains(&fp("b")));
    }

    #[test]
    fn test_file_cache_tolerates_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        fs::write(&path, b"{not json").unwrap();

        let mut cache = JsonFileCache::new(&path);
        cache.load();
        assert_eq!(cache.size(), 0);

        fs::write(&path, b"42").unwrap();
        cache.load();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_file_cache_accepts_list_and_legacy_values() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.json");
        fs::write(&list, br#"["a", "b", 3]"#).unwrap();
        let mut cache = JsonFileCache::new(&list);
        cache.load();
        assert_eq!(cache.size(), 2);

        let object = dir.path().join("object.json");
        fs::write(
            &object,
            br#"{"x": "2025-01-02T00:00:00Z", "y": "2024-06-01T00:00:00Z"}"#,
        )
        .unwrap();
        let mut cache = JsonFileCache::new(&object);
        cache.load();
        let status = cache.status();
        assert_eq!(status.entries, 2);
        assert_eq!(status.oldest_entry.as_deref(), Some("2024-06-01T00:00:00Z"));
        assert_eq!(status.newest_entry.as_deref(), Some("2025-01-02T00:00:00Z"));
        assert!(status.store_exists);
        assert!(status.store_bytes > 0);
    }

    #[test]
    fn test_persist_is_noop_when_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");

        let mut cache = JsonFileCache::new(&path);
        cache.load();
        cache.persist().unwrap();
        assert!(!path.exists());
        assert!(!cache.status().store_exists);
    }

    #[test]
    fn test_load_merges_with_unsaved_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        fs::write(&path, br#"{"old": "2025-01-01T00:00:00Z"}"#).unwrap();

        let mut cache = JsonFileCache::new(&path);
        cache.add(fp("new"));
        cache.load();
        assert!(cache.contains(&fp("old")));
        assert!(cache.contains(&fp("new")));
    }

    #[tokio::test]
    async fn test_shared_cache() {
        let cache = shared(MemoryCache::new());
        cache.lock().await.add(fp("a"));
        assert_eq!(cache.lock().await.size(), 1);
    }
}

//! Duplicate-suppression cache for file cross-posts.
//!
//! When the adapter uploads a file, Slack later reports that same file back
//! as an inbound event. The cache records recent uploads so the echo can be
//! recognized and dropped:
//!
//! | Family | Key | Valid for |
//! |--------|-----|-----------|
//! | file id | `file:<id>` | 60s |
//! | file name | `filename:<name>` | 10s |
//! | channel binding | `file_download_channel:<id>` | until evicted |
//!
//! The name window exists because our own upload notification arrives
//! later than Slack's inbound event for the same file. Expiry is checked by
//! the reader; nothing is actively purged. Eviction is strict LRU across all
//! families.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Total entries across all key families.
pub const DEDUP_CAPACITY: usize = 5000;

const FILE_ID_TTL: Duration = Duration::from_secs(60);
const FILE_NAME_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct Entry {
    inserted_at: Instant,
    value: String,
}

/// Bounded LRU of recently seen or uploaded files.
pub struct DedupCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupCache {
    /// Creates a cache holding [`DEDUP_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEDUP_CAPACITY)
    }

    /// Creates a cache holding `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn put(&self, key: String, value: String) {
        self.entries.lock().put(
            key,
            Entry {
                inserted_at: Instant::now(),
                value,
            },
        );
    }

    fn fresh(&self, key: &str, ttl: Duration) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|e| e.inserted_at.elapsed() < ttl)
    }

    /// Records an uploaded file by its ID.
    pub fn mark_file_id(&self, file_id: &str) {
        self.put(format!("file:{file_id}"), String::new());
    }

    /// Records a file name about to be uploaded.
    pub fn mark_filename(&self, name: &str) {
        self.put(format!("filename:{name}"), String::new());
    }

    /// Remembers which channel a file was seen in.
    pub fn bind_file_channel(&self, file_id: &str, channel_id: &str) {
        self.put(
            format!("file_download_channel:{file_id}"),
            channel_id.to_string(),
        );
    }

    /// The channel a file was seen in, regardless of age.
    pub fn file_channel(&self, file_id: &str) -> Option<String> {
        self.entries
            .lock()
            .get(&format!("file_download_channel:{file_id}"))
            .map(|e| e.value.clone())
    }

    /// Returns `true` if the file ID was recorded under a minute ago, or
    /// the file name under ten seconds ago.
    pub fn file_cached(&self, file_id: &str, name: &str) -> bool {
        self.fresh(&format!("file:{file_id}"), FILE_ID_TTL)
            || self.fresh(&format!("filename:{name}"), FILE_NAME_TTL)
    }

    /// Number of live entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

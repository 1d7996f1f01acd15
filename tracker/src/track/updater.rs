//! The read-flip-write engine behind tracking-pixel hits.
//!
//! Every fetch of a recipient's pixel lands here as a token. The cycle is
//! decode → lock the post → load → flip the recipient's bit if unset →
//! write back. The whole load-flip-store sequence runs under a per-post
//! mutex: two hits for different recipients of the same post would
//! otherwise both read the same blob and the second write would erase the
//! first (lost update). Duplicate hits for one recipient are idempotent
//! and skip the write entirely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::Config;
use crate::stats::BitIndexError;
use crate::store::{FileStore, Store, StoreError};
use crate::token::{TokenCodec, TokenError};

/// What a tracking hit did to persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The open bit was newly set and the record written back.
    Recorded,
    /// The bit was already set; nothing was written.
    Duplicate,
    /// The hit was dropped; the endpoint still serves its pixel as usual.
    Ignored,
}

/// Why a tracking hit could not be recorded.
///
/// All variants are swallowed at [`TrackingUpdater::record_open`]; they
/// exist so call sites that want observability can tell "nothing to do"
/// from "something broke".
#[derive(Debug, Error)]
pub enum TrackError {
    /// The token failed to decode: tampered, truncated, or foreign input.
    #[error("tracking token rejected: {0}")]
    Token(#[from] TokenError),

    /// The post's write lock stayed busy past the configured bound.
    /// Dropping the hit is acceptable; corrupting the blob is not.
    #[error("post {post_id} busy, gave up waiting for its lock")]
    LockBusy { post_id: String },

    /// No record for the decoded id; the post was purged or the link is
    /// stale.
    #[error("no stored post for id {post_id}")]
    RecordNotFound { post_id: String },

    /// A validly signed token whose index exceeds the recipient count,
    /// e.g. after a corrected re-save shrank the list. Setting the bit
    /// would push the open count past the send count.
    #[error("recipient index {index} out of range for post {post_id} ({emails_sent} sent)")]
    IndexOutOfRange {
        post_id: String,
        index: u64,
        emails_sent: u64,
    },

    /// The stored open-state blob would not decode.
    #[error("open-state blob for post {post_id} is corrupt")]
    Stats {
        post_id: String,
        #[source]
        source: BitIndexError,
    },

    /// The store failed to load or persist the record.
    #[error("store failed for post {post_id}")]
    Store {
        post_id: String,
        #[source]
        source: StoreError,
    },
}

/// Records open events against persisted post records.
///
/// Cheap to clone: all clones share the store handle, the codec, and the
/// per-post lock registry, so one updater can serve every concurrent
/// tracking hit in the process.
pub struct TrackingUpdater<S> {
    inner: Arc<UpdaterInner<S>>,
}

struct UpdaterInner<S> {
    store: S,
    codec: TokenCodec,
    lock_wait: Duration,
    /// One async mutex per post id, held across the full load-flip-store
    /// cycle. The registry lives for the process lifetime; its entries
    /// are one `Mutex<()>` per post in the archive.
    locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<S> Clone for TrackingUpdater<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store> TrackingUpdater<S> {
    /// Create an updater over `store`, decoding tokens with `codec` and
    /// bounding per-post lock waits by `lock_wait`.
    pub fn new(store: S, codec: TokenCodec, lock_wait: Duration) -> Self {
        Self {
            inner: Arc::new(UpdaterInner {
                store,
                codec,
                lock_wait,
                locks: StdMutex::new(HashMap::new()),
            }),
        }
    }

    /// The codec this updater decodes with; the send pipeline uses the
    /// same one to mint the tokens it embeds in pixel URLs.
    pub fn codec(&self) -> &TokenCodec {
        &self.inner.codec
    }

    /// Handle a tracking hit.
    ///
    /// Never fails from the caller's point of view: whatever happens
    /// internally, the endpoint can return its 1×1 image. Failures
    /// surface as [`TrackOutcome::Ignored`] after a debug diagnostic.
    pub async fn record_open(&self, token: &str) -> TrackOutcome {
        match self.try_record_open(token).await {
            Ok(outcome) => outcome,
            Err(error) => {
                debug!(error = %error, "open_tracking_dropped");
                TrackOutcome::Ignored
            }
        }
    }

    /// Typed variant of [`Self::record_open`] for callers that track
    /// outcomes. Returns only `Recorded` or `Duplicate` on success.
    pub async fn try_record_open(&self, token: &str) -> Result<TrackOutcome, TrackError> {
        let (post_id, index) = self.inner.codec.decode(token)?;

        let lock = self.lock_for(&post_id);
        let _guard = timeout(self.inner.lock_wait, lock.lock())
            .await
            .map_err(|_| TrackError::LockBusy {
                post_id: post_id.clone(),
            })?;

        let mut record = self
            .inner
            .store
            .get(&post_id)
            .map_err(|source| TrackError::Store {
                post_id: post_id.clone(),
                source,
            })?
            .ok_or_else(|| TrackError::RecordNotFound {
                post_id: post_id.clone(),
            })?;

        if index >= record.stats.emails_sent {
            return Err(TrackError::IndexOutOfRange {
                post_id,
                index,
                emails_sent: record.stats.emails_sent,
            });
        }

        let mut opened = record
            .stats
            .open_bits()
            .map_err(|source| TrackError::Stats {
                post_id: post_id.clone(),
                source,
            })?;

        if opened.get(index as usize) {
            debug!(post_id = %post_id, index = index, "open_tracking_duplicate");
            return Ok(TrackOutcome::Duplicate);
        }

        opened.set(index as usize, true);
        record.stats.emails_opened = opened.serialize();

        if let Err(source) = self.inner.store.create(&record, true) {
            return Err(TrackError::Store { post_id, source });
        }

        info!(
            post_id = %record.id,
            index = index,
            emails_opened = opened.count_ones(),
            emails_sent = record.stats.emails_sent,
            "open_tracking_recorded"
        );
        Ok(TrackOutcome::Recorded)
    }

    /// Fetch or create the mutex guarding one post's records.
    fn lock_for(&self, post_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.inner.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(post_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }
}

impl TrackingUpdater<FileStore> {
    /// Wire an updater over the flat-file store described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let store = FileStore::open(&config.post_store_dir)?;
        let codec = TokenCodec::new(config.token_key.clone());
        Ok(Self::new(
            store,
            codec,
            Duration::from_millis(config.lock_wait_ms),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::PostRecord;
    use crate::stats::DeliveryStats;
    use crate::store::MemoryStore;
    use futures::future::join_all;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .try_init();
    }

    fn sample_record(id: &str, emails_sent: u64) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            url: format!("https://blog.example.com/{id}/"),
            date: "2024-03-01T09:30:00.000Z".to_string(),
            title: "Hello".to_string(),
            author: "Alice".to_string(),
            stats: DeliveryStats::new(emails_sent),
        }
    }

    fn updater(
        store: &Arc<MemoryStore>,
        codec: &TokenCodec,
    ) -> TrackingUpdater<Arc<MemoryStore>> {
        TrackingUpdater::new(Arc::clone(store), codec.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_record_open_sets_the_bit() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new("test-key");
        assert!(sample_record("abc123", 10).save(&store));

        let updater = updater(&store, &codec);
        let token = codec.encode("abc123", 3);

        assert_eq!(updater.record_open(&token).await, TrackOutcome::Recorded);

        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.stats.open_count().unwrap(), 1);
        assert!(record.stats.open_bits().unwrap().get(3));
    }

    #[tokio::test]
    async fn test_duplicate_hit_writes_only_once() {
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new("test-key");
        assert!(sample_record("abc123", 10).save(&store));
        let writes_after_save = store.write_count();

        let updater = updater(&store, &codec);
        let token = codec.encode("abc123", 3);

        assert_eq!(updater.record_open(&token).await, TrackOutcome::Recorded);
        assert_eq!(updater.record_open(&token).await, TrackOutcome::Duplicate);
        assert_eq!(updater.record_open(&token).await, TrackOutcome::Duplicate);

        // Exactly one tracking write after the initial save
        assert_eq!(store.write_count(), writes_after_save + 1);
        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.stats.open_count().unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_distinct_opens_lose_nothing() {
        init_tracing();
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new("test-key");
        assert!(sample_record("abc123", 50).save(&store));

        let updater = updater(&store, &codec);

        let handles: Vec<_> = (0..50u64)
            .map(|index| {
                let updater = updater.clone();
                let token = codec.encode("abc123", index);
                tokio::spawn(async move { updater.record_open(&token).await })
            })
            .collect();

        for outcome in join_all(handles).await {
            assert_eq!(outcome.unwrap(), TrackOutcome::Recorded);
        }

        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.stats.open_count().unwrap(), 50);
    }

    #[tokio::test]
    async fn test_malformed_token_is_silently_ignored() {
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new("test-key");
        let updater = updater(&store, &codec);

        assert_eq!(
            updater.record_open("complete garbage").await,
            TrackOutcome::Ignored
        );
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_post_is_silently_ignored() {
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new("test-key");
        let updater = updater(&store, &codec);

        let token = codec.encode("never-saved", 0);
        assert_eq!(updater.record_open(&token).await, TrackOutcome::Ignored);

        let error = updater.try_record_open(&token).await.unwrap_err();
        assert!(matches!(error, TrackError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_index_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new("test-key");
        assert!(sample_record("abc123", 2).save(&store));

        let updater = updater(&store, &codec);
        let token = codec.encode("abc123", 5);

        let error = updater.try_record_open(&token).await.unwrap_err();
        assert!(matches!(error, TrackError::IndexOutOfRange { index: 5, .. }));

        // Nothing was written and the count invariant holds
        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.stats.open_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_token_from_another_key_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new("test-key");
        assert!(sample_record("abc123", 10).save(&store));

        let updater = updater(&store, &codec);
        let foreign = TokenCodec::new("other-key").encode("abc123", 1);

        assert_eq!(updater.record_open(&foreign).await, TrackOutcome::Ignored);
        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.stats.open_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_from_config_runs_the_cycle_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            post_store_dir: dir.path().to_path_buf(),
            token_key: "test-key".to_string(),
            lock_wait_ms: 2000,
            tracking_base_url: "http://localhost:8080/t".to_string(),
        };

        let updater = TrackingUpdater::from_config(&config).unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(sample_record("abc123", 10).save(&store));

        let token = updater.codec().encode("abc123", 7);
        assert_eq!(updater.record_open(&token).await, TrackOutcome::Recorded);
        assert_eq!(updater.record_open(&token).await, TrackOutcome::Duplicate);

        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.stats.open_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_opens_accumulate_across_recipients() {
        let store = Arc::new(MemoryStore::new());
        let codec = TokenCodec::new("test-key");
        assert!(sample_record("abc123", 10).save(&store));

        let updater = updater(&store, &codec);

        for index in [0u64, 4, 9] {
            let token = codec.encode("abc123", index);
            assert_eq!(updater.record_open(&token).await, TrackOutcome::Recorded);
        }

        let record = store.get("abc123").unwrap().unwrap();
        assert_eq!(record.stats.open_count().unwrap(), 3);
        let bits = record.stats.open_bits().unwrap();
        assert!(bits.get(0) && bits.get(4) && bits.get(9));
        assert!(!bits.get(1));
    }
}

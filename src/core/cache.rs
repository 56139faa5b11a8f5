use crate::core::competitors::{
    CompetitorSearch, SearchEvent, SearchOutcome, SearchRequest, sort_by_velocity,
};
use crate::core::cursor::Cursor;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ENTRY_SUFFIX: &str = ".json";

/// Time-bounded store of completed search outcomes.
#[async_trait]
pub trait SearchCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SearchOutcome>>;
    async fn put(&self, key: &str, outcome: &SearchOutcome) -> Result<()>;
    /// Drops every entry, returning how many were removed.
    async fn clear(&self) -> Result<usize>;
}

/// Key covering everything that changes a search's result.
pub fn cache_key(request: &SearchRequest, cursor: Option<&Cursor>) -> Result<String> {
    let cursor = cursor.map(Cursor::encode).transpose()?;
    let canonical = serde_json::to_vec(&(request, cursor))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, SearchOutcome)>>,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (Instant, SearchOutcome)>> {
        // A poisoned map only ever holds complete entries.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SearchCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<SearchOutcome>> {
        let mut entries = self.lock();
        let live = entries
            .get(key)
            .map(|(expires, outcome)| (Instant::now() < *expires).then(|| outcome.clone()));
        match live {
            Some(Some(outcome)) => Ok(Some(outcome)),
            Some(None) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Also drops every expired entry, so unread keys do not pile up.
    async fn put(&self, key: &str, outcome: &SearchOutcome) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, (expires, _)| *expires > now);
        entries.insert(key.to_string(), (now + self.ttl, outcome.clone()));
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}

#[derive(Serialize, Deserialize)]
struct FileEntry {
    expires_at: DateTime<Utc>,
    outcome: SearchOutcome,
}

/// One JSON file per key, surviving restarts.
pub struct FileCache {
    dir: PathBuf,
    ttl: Duration,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{ENTRY_SUFFIX}"))
    }
}

#[async_trait]
impl SearchCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<SearchOutcome>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<FileEntry>(&bytes) {
            Ok(entry) if Utc::now() < entry.expires_at => Ok(Some(entry.outcome)),
            Ok(_) => {
                debug!(key, "Cache entry expired");
                let _ = fs::remove_file(&path).await;
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable cache entry");
                let _ = fs::remove_file(&path).await;
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, outcome: &SearchOutcome) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let entry = FileEntry {
            expires_at: Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            outcome: outcome.clone(),
        };
        fs::write(self.entry_path(key), serde_json::to_vec(&entry)?).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(ENTRY_SUFFIX))
            {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Competitor search with a cache check in front of it.
#[derive(Clone)]
pub struct CompetitorFinder {
    search: CompetitorSearch,
    cache: Option<Arc<dyn SearchCache>>,
}

impl CompetitorFinder {
    pub fn new(search: CompetitorSearch, cache: Option<Arc<dyn SearchCache>>) -> Self {
        Self { search, cache }
    }

    /// Cache failures degrade to a miss.
    pub async fn lookup(
        &self,
        request: &SearchRequest,
        cursor: Option<&Cursor>,
    ) -> Result<Option<SearchOutcome>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let key = cache_key(request, cursor)?;
        match cache.get(&key).await {
            Ok(hit) => {
                if hit.is_some() {
                    info!(key = %&key[..12], "Serving competitor search from cache");
                }
                Ok(hit)
            }
            Err(e) => {
                warn!(error = %e, "Cache read failed");
                Ok(None)
            }
        }
    }

    pub async fn store(
        &self,
        request: &SearchRequest,
        cursor: Option<&Cursor>,
        outcome: &SearchOutcome,
    ) -> Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let key = cache_key(request, cursor)?;
        if let Err(e) = cache.put(&key, outcome).await {
            warn!(error = %e, "Cache write failed");
        }
        Ok(())
    }

    pub async fn find(
        &self,
        request: SearchRequest,
        cursor: Option<Cursor>,
        cancel: CancellationToken,
    ) -> Result<SearchOutcome> {
        if let Some(hit) = self.lookup(&request, cursor.as_ref()).await? {
            return Ok(hit);
        }

        let outcome = self
            .search
            .run(request.clone(), cursor.clone(), cancel)
            .await?;
        self.store(&request, cursor.as_ref(), &outcome).await?;
        Ok(outcome)
    }

    /// Streams a search through `on_event`, serving from and filling the cache.
    ///
    /// A cancelled search returns the matches found so far, with a cursor at the
    /// first unconsumed page. It is not cached.
    pub async fn find_streaming(
        &self,
        request: SearchRequest,
        cursor: Option<Cursor>,
        cancel: CancellationToken,
        mut on_event: impl FnMut(&SearchEvent),
    ) -> Result<SearchOutcome> {
        if let Some(hit) = self.lookup(&request, cursor.as_ref()).await? {
            return Ok(hit);
        }

        let mut stream = self.search.stream(request.clone(), cursor.clone(), cancel);
        let mut videos = Vec::new();
        let mut pages = 0;

        while let Some(event) = stream.next().await {
            let event = event?;
            on_event(&event);
            match event {
                SearchEvent::Match(video) => videos.push(video),
                SearchEvent::Page { .. } => pages += 1,
                SearchEvent::Finished(summary) => {
                    let outcome = SearchOutcome::from_summary(videos, summary);
                    self.store(&request, cursor.as_ref(), &outcome).await?;
                    return Ok(outcome);
                }
                SearchEvent::Cancelled { cursor: resume } => {
                    sort_by_velocity(&mut videos);
                    return Ok(SearchOutcome {
                        videos,
                        scanned: resume.scanned,
                        pages,
                        next_cursor: Some(resume),
                        exhausted: false,
                    });
                }
                SearchEvent::Started { .. } => {}
            }
        }

        Err(Error::custom("search ended without a summary"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::competitors::tests::{FakeSource, request, video};

    fn outcome(ids: &[&str]) -> SearchOutcome {
        let now = Utc::now();
        SearchOutcome {
            videos: ids
                .iter()
                .map(|id| {
                    crate::core::competitors::CompetitorVideo::new(video(id, "c", 100, 2, 60), "t", now)
                })
                .collect(),
            scanned: ids.len(),
            pages: 1,
            next_cursor: None,
            exhausted: true,
        }
    }

    #[test]
    fn keys_change_with_filters_and_cursor() {
        let base = request(&["espresso"], 10);
        let mut filtered = base.clone();
        filtered.filters.min_views_per_day = 10.0;
        let cursor = Cursor::start(&base.terms);

        let plain = cache_key(&base, None).expect("key");
        assert_eq!(plain, cache_key(&base.clone(), None).expect("key"));
        assert_eq!(plain.len(), 64);
        assert_ne!(plain, cache_key(&filtered, None).expect("key"));
        assert_ne!(plain, cache_key(&base, Some(&cursor)).expect("key"));
    }

    #[tokio::test]
    async fn memory_cache_expires_entries() {
        let cache = MemoryCache::new(Duration::from_millis(30));
        let stored = outcome(&["a"]);
        cache.put("k", &stored).await.expect("put");
        assert_eq!(cache.get("k").await.expect("get"), Some(stored));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("k").await.expect("get"), None);
        assert_eq!(cache.clear().await.expect("clear"), 0);
    }

    #[tokio::test]
    async fn memory_cache_prunes_unread_expired_entries_on_put() {
        let cache = MemoryCache::new(Duration::from_millis(30));
        cache.put("old-1", &outcome(&["a"])).await.expect("put");
        cache.put("old-2", &outcome(&["b"])).await.expect("put");

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.put("fresh", &outcome(&["c"])).await.expect("put");

        assert_eq!(cache.lock().len(), 1);
        assert_eq!(cache.clear().await.expect("clear"), 1);
    }

    #[tokio::test]
    async fn file_cache_round_trips_and_clears() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path().join("cache"), Duration::from_secs(60));

        assert!(cache.get("missing").await.expect("get").is_none());

        let stored = outcome(&["a", "b"]);
        cache.put("k1", &stored).await.expect("put");
        cache.put("k2", &stored).await.expect("put");

        let hit = cache.get("k1").await.expect("get").expect("hit");
        assert_eq!(hit.videos.len(), 2);
        assert_eq!(hit.videos[0].video.id, "a");

        assert_eq!(cache.clear().await.expect("clear"), 2);
        assert!(cache.get("k1").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn file_cache_drops_expired_and_corrupt_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path(), Duration::from_secs(60));

        let expired = FileEntry {
            expires_at: Utc::now() - chrono::Duration::minutes(1),
            outcome: outcome(&["old"]),
        };
        let expired_path = dir.path().join("old.json");
        std::fs::write(&expired_path, serde_json::to_vec(&expired).expect("json")).expect("write");
        assert!(cache.get("old").await.expect("get").is_none());
        assert!(!expired_path.exists());

        let corrupt_path = dir.path().join("bad.json");
        std::fs::write(&corrupt_path, b"{not json").expect("write");
        assert!(cache.get("bad").await.expect("get").is_none());
        assert!(!corrupt_path.exists());
    }

    #[tokio::test]
    async fn finder_serves_repeat_searches_from_cache() {
        let source = Arc::new(
            FakeSource::default()
                .page("espresso", None, &["v1"], None)
                .video(video("v1", "c1", 1_000, 10, 300)),
        );
        let cache: Arc<dyn SearchCache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let finder = CompetitorFinder::new(CompetitorSearch::new(source.clone()), Some(cache.clone()));
        let req = request(&["espresso"], 5);

        let first = finder
            .find(req.clone(), None, CancellationToken::new())
            .await
            .expect("first");
        let second = finder
            .find(req, None, CancellationToken::new())
            .await
            .expect("second");

        assert_eq!(first, second);
        assert_eq!(source.search_calls(), 1);
        assert_eq!(cache.clear().await.expect("clear"), 1);
    }

    #[tokio::test]
    async fn cancelled_searches_are_not_cached() {
        let source = Arc::new(FakeSource::default().page("espresso", None, &[], None));
        let cache: Arc<dyn SearchCache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let finder = CompetitorFinder::new(CompetitorSearch::new(source), Some(cache.clone()));
        let req = request(&["espresso"], 5);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = finder.find(req.clone(), None, cancel).await.expect_err("cancelled");
        assert!(matches!(err, Error::Cancelled));
        assert!(finder.lookup(&req, None).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn streaming_reports_events_and_fills_cache() {
        let source = Arc::new(
            FakeSource::default()
                .page("espresso", None, &["v1", "v2"], None)
                .video(video("v1", "c1", 1_000, 10, 300))
                .video(video("v2", "c2", 9_000, 10, 300)),
        );
        let cache: Arc<dyn SearchCache> = Arc::new(MemoryCache::new(Duration::from_secs(60)));
        let finder = CompetitorFinder::new(CompetitorSearch::new(source.clone()), Some(cache));
        let req = request(&["espresso"], 5);

        let mut seen = Vec::new();
        let outcome = finder
            .find_streaming(req.clone(), None, CancellationToken::new(), |event| {
                if let SearchEvent::Match(hit) = event {
                    seen.push(hit.video.id.clone());
                }
            })
            .await
            .expect("search");

        assert_eq!(seen, vec!["v2", "v1"]);
        assert_eq!(outcome.videos.len(), 2);
        assert!(outcome.exhausted);
        assert!(finder.lookup(&req, None).await.expect("lookup").is_some());
    }

    #[tokio::test]
    async fn streaming_cancel_keeps_resume_cursor() {
        let source = Arc::new(FakeSource::default().page("espresso", None, &["v1"], None));
        let finder = CompetitorFinder::new(CompetitorSearch::new(source), None);
        let req = request(&["espresso"], 5);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = finder
            .find_streaming(req.clone(), None, cancel, |_| {})
            .await
            .expect("partial outcome");

        assert!(outcome.videos.is_empty());
        assert!(!outcome.exhausted);
        let resume = outcome.next_cursor.expect("cursor");
        assert_eq!(resume.query_index, 0);
        assert!(resume.page_token.is_none());
        assert!(resume.validate(&req.terms).is_ok());
    }
}

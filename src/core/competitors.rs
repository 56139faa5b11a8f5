use crate::config::SearchConfig;
use crate::core::cursor::Cursor;
use crate::core::niche::{Niche, NicheSource};
use crate::core::youtube::{SearchQuery, VideoDetails, VideoDuration, VideoSource};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationFilter {
    #[default]
    Any,
    /// YouTube Shorts, up to one minute.
    Shorts,
    /// Under four minutes.
    Short,
    /// Four to twenty minutes.
    Medium,
    /// Over twenty minutes.
    Long,
}

impl DurationFilter {
    pub const ALL: [DurationFilter; 5] = [
        DurationFilter::Any,
        DurationFilter::Shorts,
        DurationFilter::Short,
        DurationFilter::Medium,
        DurationFilter::Long,
    ];

    /// Unknown durations (zero seconds) only pass `Any`.
    pub fn matches(self, duration_secs: u64) -> bool {
        match self {
            DurationFilter::Any => true,
            DurationFilter::Shorts => (1..=60).contains(&duration_secs),
            DurationFilter::Short => (1..240).contains(&duration_secs),
            DurationFilter::Medium => (240..=1200).contains(&duration_secs),
            DurationFilter::Long => duration_secs > 1200,
        }
    }

    fn api_bucket(self) -> Option<VideoDuration> {
        match self {
            DurationFilter::Any => None,
            DurationFilter::Shorts | DurationFilter::Short => Some(VideoDuration::Short),
            DurationFilter::Medium => Some(VideoDuration::Medium),
            DurationFilter::Long => Some(VideoDuration::Long),
        }
    }

    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|d| *d == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for DurationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DurationFilter::Any => "any",
            DurationFilter::Shorts => "shorts",
            DurationFilter::Short => "short",
            DurationFilter::Medium => "medium",
            DurationFilter::Long => "long",
        };
        f.write_str(name)
    }
}

impl FromStr for DurationFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown duration filter '{s}' (any, shorts, short, medium, long)"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub max_age_days: Option<u32>,
    pub min_views_per_day: f64,
    pub min_views: u64,
    pub duration: DurationFilter,
    pub exclude_channel_ids: Vec<String>,
    pub exclude_video_ids: Vec<String>,
}

impl SearchFilters {
    pub fn accepts(&self, candidate: &CompetitorVideo) -> bool {
        let video = &candidate.video;
        if self.exclude_video_ids.contains(&video.id)
            || self.exclude_channel_ids.contains(&video.channel_id)
        {
            return false;
        }
        if let Some(max_age) = self.max_age_days
            && candidate.age_days > f64::from(max_age)
        {
            return false;
        }
        video.view_count >= self.min_views
            && candidate.views_per_day >= self.min_views_per_day
            && self.duration.matches(video.duration_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub terms: Vec<String>,
    pub filters: SearchFilters,
    /// Matches wanted per call; the final page may push the count past it.
    pub target: usize,
    /// Page budget per call.
    pub max_pages: usize,
    pub region_code: Option<String>,
    pub relevance_language: Option<String>,
}

impl SearchRequest {
    pub fn new(terms: Vec<String>, defaults: &SearchConfig) -> Self {
        Self {
            terms,
            filters: SearchFilters {
                max_age_days: defaults.max_age_days,
                min_views_per_day: defaults.min_views_per_day,
                min_views: defaults.min_views,
                ..SearchFilters::default()
            },
            target: defaults.target,
            max_pages: defaults.max_pages,
            region_code: None,
            relevance_language: None,
        }
    }

    /// Searches a niche's terms, leaving out the reference video and its channel.
    pub fn for_niche(niche: &Niche, defaults: &SearchConfig) -> Self {
        let mut request = Self::new(niche.terms.clone(), defaults);
        if let NicheSource::Video {
            video_id,
            channel_id,
        } = &niche.source
        {
            request.filters.exclude_video_ids.push(video_id.clone());
            if !channel_id.is_empty() {
                request.filters.exclude_channel_ids.push(channel_id.clone());
            }
        }
        request
    }

    pub fn validate(&self) -> Result<()> {
        if self.terms.iter().all(|t| t.trim().is_empty()) {
            return Err(Error::config("search needs at least one query term"));
        }
        if self.target == 0 {
            return Err(Error::config("search target must be at least 1"));
        }
        if self.max_pages == 0 {
            return Err(Error::config("search page budget must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorVideo {
    pub video: VideoDetails,
    pub views_per_day: f64,
    pub age_days: f64,
    pub matched_term: String,
}

impl CompetitorVideo {
    pub fn new(video: VideoDetails, matched_term: &str, now: DateTime<Utc>) -> Self {
        let age_days = (elapsed_days(video.published_at, now)).max(0.0);
        Self {
            views_per_day: views_per_day(video.view_count, video.published_at, now),
            age_days,
            matched_term: matched_term.to_string(),
            video,
        }
    }
}

/// View count divided by days since publish, with the day count floored at one.
pub fn views_per_day(views: u64, published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = elapsed_days(published_at, now).max(1.0);
    views as f64 / days
}

fn elapsed_days(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - published_at).num_seconds() as f64 / SECONDS_PER_DAY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSummary {
    /// Matches emitted by this call.
    pub matched: usize,
    /// Unique candidates examined across this call and the ones it resumed.
    pub scanned: usize,
    pub pages: usize,
    pub next_cursor: Option<Cursor>,
    pub exhausted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    Started {
        terms: Vec<String>,
    },
    Page {
        term: String,
        page: usize,
        candidates: usize,
        fresh: usize,
    },
    Match(CompetitorVideo),
    Finished(SearchSummary),
    Cancelled {
        cursor: Cursor,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Sorted by views per day, then views, both descending.
    pub videos: Vec<CompetitorVideo>,
    pub scanned: usize,
    pub pages: usize,
    pub next_cursor: Option<Cursor>,
    pub exhausted: bool,
}

impl SearchOutcome {
    pub fn from_summary(mut videos: Vec<CompetitorVideo>, summary: SearchSummary) -> Self {
        sort_by_velocity(&mut videos);
        Self {
            videos,
            scanned: summary.scanned,
            pages: summary.pages,
            next_cursor: summary.next_cursor,
            exhausted: summary.exhausted,
        }
    }
}

pub fn sort_by_velocity(videos: &mut [CompetitorVideo]) {
    videos.sort_by(|a, b| {
        b.views_per_day
            .total_cmp(&a.views_per_day)
            .then_with(|| b.video.view_count.cmp(&a.video.view_count))
    });
}

#[derive(Clone)]
pub struct CompetitorSearch {
    source: Arc<dyn VideoSource>,
}

impl CompetitorSearch {
    pub fn new(source: Arc<dyn VideoSource>) -> Self {
        Self { source }
    }

    /// Runs the search in a background task, yielding events as pages are processed.
    ///
    /// The stream ends after `Finished`, `Cancelled`, or the first `Err`.
    pub fn stream(
        &self,
        request: SearchRequest,
        cursor: Option<Cursor>,
        cancel: CancellationToken,
    ) -> ReceiverStream<Result<SearchEvent>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let source = Arc::clone(&self.source);

        tokio::spawn(async move {
            if let Err(e) = drive(source.as_ref(), &request, cursor, &cancel, &tx).await {
                warn!(error = %e, "Competitor search failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Collects a full call of [`CompetitorSearch::stream`].
    pub async fn run(
        &self,
        request: SearchRequest,
        cursor: Option<Cursor>,
        cancel: CancellationToken,
    ) -> Result<SearchOutcome> {
        let mut stream = self.stream(request, cursor, cancel);
        let mut videos = Vec::new();

        while let Some(event) = stream.next().await {
            match event? {
                SearchEvent::Match(video) => videos.push(video),
                SearchEvent::Finished(summary) => {
                    return Ok(SearchOutcome::from_summary(videos, summary));
                }
                SearchEvent::Cancelled { .. } => return Err(Error::Cancelled),
                SearchEvent::Started { .. } | SearchEvent::Page { .. } => {}
            }
        }

        Err(Error::custom("search ended without a summary"))
    }
}

type EventSender = mpsc::Sender<Result<SearchEvent>>;

/// False once the consumer has gone away.
async fn emit(tx: &EventSender, event: SearchEvent) -> bool {
    tx.send(Ok(event)).await.is_ok()
}

async fn drive(
    source: &dyn VideoSource,
    request: &SearchRequest,
    cursor: Option<Cursor>,
    cancel: &CancellationToken,
    tx: &EventSender,
) -> Result<()> {
    request.validate()?;
    let terms = &request.terms;
    let mut cursor = match cursor {
        Some(cursor) => {
            cursor.validate(terms)?;
            cursor
        }
        None => Cursor::start(terms),
    };

    let now = Utc::now();
    let published_after = request
        .filters
        .max_age_days
        .map(|days| now - Duration::days(i64::from(days)));

    info!(
        terms = terms.len(),
        target = request.target,
        resumed = cursor.scanned > 0,
        "Starting competitor search"
    );
    if !emit(tx, SearchEvent::Started { terms: terms.clone() }).await {
        return Ok(());
    }

    let mut matched = 0;
    let mut pages = 0;

    while matched < request.target && !cursor.is_exhausted(terms) {
        if pages >= request.max_pages {
            debug!(pages, "Page budget reached");
            break;
        }
        if cancel.is_cancelled() {
            return cancelled(tx, cursor).await;
        }

        let term = terms[cursor.query_index].clone();
        let query = SearchQuery {
            term: term.clone(),
            page_token: cursor.page_token.clone(),
            published_after,
            duration: request.filters.duration.api_bucket(),
            region_code: request.region_code.clone(),
            relevance_language: request.relevance_language.clone(),
        };

        let page = tokio::select! {
            _ = cancel.cancelled() => return cancelled(tx, cursor).await,
            page = source.search_page(&query) => page?,
        };
        pages += 1;

        let mut in_page = HashSet::new();
        let fresh: Vec<String> = page
            .video_ids
            .iter()
            .filter(|id| !cursor.seen_ids.contains(*id) && in_page.insert(id.as_str()))
            .cloned()
            .collect();

        let details = if fresh.is_empty() {
            Vec::new()
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return cancelled(tx, cursor).await,
                details = source.video_details(&fresh) => details?,
            }
        };

        // The page only counts as consumed once both calls succeeded.
        cursor.scanned += fresh.len();
        cursor.seen_ids.extend(fresh.iter().cloned());
        cursor.advance(page.next_page_token);

        let page_event = SearchEvent::Page {
            term: term.clone(),
            page: pages,
            candidates: page.video_ids.len(),
            fresh: fresh.len(),
        };
        if !emit(tx, page_event).await {
            return Ok(());
        }

        let mut hits: Vec<CompetitorVideo> = details
            .into_iter()
            .map(|video| CompetitorVideo::new(video, &term, now))
            .filter(|candidate| request.filters.accepts(candidate))
            .collect();
        sort_by_velocity(&mut hits);

        debug!(term = %term, fresh = fresh.len(), hits = hits.len(), "Processed page");
        matched += hits.len();
        for hit in hits {
            if !emit(tx, SearchEvent::Match(hit)).await {
                return Ok(());
            }
        }
    }

    let exhausted = cursor.is_exhausted(terms);
    info!(matched, scanned = cursor.scanned, pages, exhausted, "Competitor search finished");

    let summary = SearchSummary {
        matched,
        scanned: cursor.scanned,
        pages,
        next_cursor: (!exhausted).then_some(cursor),
        exhausted,
    };
    emit(tx, SearchEvent::Finished(summary)).await;
    Ok(())
}

async fn cancelled(tx: &EventSender, cursor: Cursor) -> Result<()> {
    info!(scanned = cursor.scanned, "Competitor search cancelled");
    emit(tx, SearchEvent::Cancelled { cursor }).await;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::youtube::SearchPage;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub(crate) fn video(id: &str, channel: &str, views: u64, age_days: i64, duration_secs: u64) -> VideoDetails {
        VideoDetails {
            id: id.to_string(),
            title: format!("Video {id}"),
            description: String::new(),
            channel_id: channel.to_string(),
            channel_title: format!("Channel {channel}"),
            tags: Vec::new(),
            published_at: Utc::now() - Duration::days(age_days),
            view_count: views,
            like_count: 0,
            comment_count: 0,
            duration_secs,
            thumbnail_url: None,
        }
    }

    /// In-memory YouTube: pages keyed by (term, page token).
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pages: HashMap<(String, Option<String>), SearchPage>,
        videos: HashMap<String, VideoDetails>,
        failing_term: Option<String>,
        pub(crate) queries: Mutex<Vec<SearchQuery>>,
    }

    impl FakeSource {
        pub(crate) fn page(mut self, term: &str, token: Option<&str>, ids: &[&str], next: Option<&str>) -> Self {
            self.pages.insert(
                (term.to_string(), token.map(str::to_string)),
                SearchPage {
                    video_ids: ids.iter().map(|s| s.to_string()).collect(),
                    next_page_token: next.map(str::to_string),
                    total_results: None,
                },
            );
            self
        }

        pub(crate) fn video(mut self, video: VideoDetails) -> Self {
            self.videos.insert(video.id.clone(), video);
            self
        }

        fn failing_on(mut self, term: &str) -> Self {
            self.failing_term = Some(term.to_string());
            self
        }

        pub(crate) fn search_calls(&self) -> usize {
            self.queries.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl VideoSource for FakeSource {
        async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage> {
            self.queries.lock().expect("lock").push(query.clone());
            if self.failing_term.as_deref() == Some(query.term.as_str()) {
                return Err(Error::QuotaExceeded("quota".to_string()));
            }
            Ok(self
                .pages
                .get(&(query.term.clone(), query.page_token.clone()))
                .cloned()
                .unwrap_or_default())
        }

        async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoDetails>> {
            Ok(ids.iter().filter_map(|id| self.videos.get(id).cloned()).collect())
        }
    }

    pub(crate) fn request(terms: &[&str], target: usize) -> SearchRequest {
        SearchRequest {
            terms: terms.iter().map(|s| s.to_string()).collect(),
            filters: SearchFilters::default(),
            target,
            max_pages: 10,
            region_code: None,
            relevance_language: None,
        }
    }

    fn ids(outcome: &SearchOutcome) -> Vec<&str> {
        outcome.videos.iter().map(|v| v.video.id.as_str()).collect()
    }

    fn dedup_source() -> FakeSource {
        FakeSource::default()
            .page("espresso", None, &["v1", "v2"], Some("T2"))
            .page("espresso", Some("T2"), &["v2", "v3", "v3"], None)
            .page("latte art", None, &["v1", "v4"], None)
            .video(video("v1", "c1", 1_000, 10, 300))
            .video(video("v2", "c2", 5_000, 10, 300))
            .video(video("v3", "c3", 300, 3, 300))
            .video(video("v4", "c4", 9_000, 30, 300))
    }

    #[test]
    fn views_per_day_floors_young_videos_at_one_day() {
        let now = Utc::now();
        assert_eq!(views_per_day(1_000, now - Duration::days(10), now), 100.0);
        assert_eq!(views_per_day(500, now - Duration::hours(2), now), 500.0);
        assert_eq!(views_per_day(500, now + Duration::days(3), now), 500.0);
        assert_eq!(views_per_day(0, now - Duration::days(3), now), 0.0);
    }

    #[test]
    fn duration_filter_buckets() {
        assert!(DurationFilter::Any.matches(0));
        assert!(DurationFilter::Shorts.matches(45));
        assert!(!DurationFilter::Shorts.matches(61));
        assert!(!DurationFilter::Shorts.matches(0));
        assert!(DurationFilter::Short.matches(239));
        assert!(DurationFilter::Medium.matches(240));
        assert!(DurationFilter::Medium.matches(1200));
        assert!(DurationFilter::Long.matches(1201));
        assert_eq!("Medium".parse::<DurationFilter>(), Ok(DurationFilter::Medium));
        assert!("huge".parse::<DurationFilter>().is_err());
        assert_eq!(DurationFilter::Long.next(), DurationFilter::Any);
    }

    #[test]
    fn filters_apply_every_rule() {
        let now = Utc::now();
        let filters = SearchFilters {
            max_age_days: Some(30),
            min_views_per_day: 50.0,
            min_views: 1_000,
            duration: DurationFilter::Medium,
            exclude_channel_ids: vec!["mine".to_string()],
            exclude_video_ids: vec!["ref".to_string()],
        };
        let check = |v: VideoDetails| filters.accepts(&CompetitorVideo::new(v, "t", now));

        assert!(check(video("ok", "c", 3_000, 10, 600)));
        assert!(!check(video("old", "c", 300_000, 45, 600)));
        assert!(!check(video("slow", "c", 1_000, 29, 600)));
        assert!(!check(video("few", "c", 900, 1, 600)));
        assert!(!check(video("short", "c", 3_000, 10, 100)));
        assert!(!check(video("own", "mine", 3_000, 10, 600)));
        assert!(!check(video("ref", "c", 3_000, 10, 600)));
    }

    #[test]
    fn niche_from_video_excludes_reference() {
        let niche = Niche {
            label: "x".to_string(),
            terms: vec!["x".to_string()],
            keywords: vec![],
            source: NicheSource::Video {
                video_id: "ref".to_string(),
                channel_id: "UCme".to_string(),
            },
        };
        let request = SearchRequest::for_niche(&niche, &SearchConfig::default());
        assert_eq!(request.filters.exclude_video_ids, vec!["ref"]);
        assert_eq!(request.filters.exclude_channel_ids, vec!["UCme"]);
        assert_eq!(request.target, 20);
    }

    #[tokio::test]
    async fn deduplicates_across_pages_and_terms() {
        let search = CompetitorSearch::new(Arc::new(dedup_source()));
        let outcome = search
            .run(request(&["espresso", "latte art"], 100), None, CancellationToken::new())
            .await
            .expect("search succeeds");

        assert_eq!(ids(&outcome), vec!["v2", "v4", "v1", "v3"]);
        assert_eq!(outcome.scanned, 4);
        assert_eq!(outcome.pages, 3);
        assert!(outcome.exhausted);
        assert!(outcome.next_cursor.is_none());
        assert_eq!(outcome.videos[1].matched_term, "latte art");
    }

    #[tokio::test]
    async fn refills_until_target_and_resumes_from_cursor() {
        let source = Arc::new(dedup_source());
        let search = CompetitorSearch::new(source.clone());
        let req = request(&["espresso", "latte art"], 3);

        let first = search
            .run(req.clone(), None, CancellationToken::new())
            .await
            .expect("first call");
        assert_eq!(ids(&first), vec!["v2", "v1", "v3"]);
        assert!(!first.exhausted);
        let cursor = first.next_cursor.clone().expect("more to load");
        assert_eq!(cursor.query_index, 1);
        assert_eq!(cursor.scanned, 3);

        let encoded = cursor.encode().expect("encodes");
        let resumed = Cursor::decode(&encoded).expect("decodes");
        let second = search
            .run(req, Some(resumed), CancellationToken::new())
            .await
            .expect("second call");
        assert_eq!(ids(&second), vec!["v4"]);
        assert_eq!(second.scanned, 4);
        assert!(second.exhausted);
        assert_eq!(source.search_calls(), 3);
    }

    #[tokio::test]
    async fn final_page_matches_are_all_kept() {
        let search = CompetitorSearch::new(Arc::new(dedup_source()));
        let outcome = search
            .run(request(&["espresso"], 1), None, CancellationToken::new())
            .await
            .expect("search succeeds");
        assert_eq!(ids(&outcome), vec!["v2", "v1"]);
        assert_eq!(outcome.pages, 1);
    }

    #[tokio::test]
    async fn page_budget_stops_with_resumable_cursor() {
        let source = FakeSource::default()
            .page("t", None, &["a"], Some("P2"))
            .page("t", Some("P2"), &["b"], Some("P3"))
            .page("t", Some("P3"), &["c"], None);
        let mut req = request(&["t"], 10);
        req.max_pages = 2;

        let outcome = CompetitorSearch::new(Arc::new(source))
            .run(req, None, CancellationToken::new())
            .await
            .expect("search succeeds");

        assert!(outcome.videos.is_empty());
        assert_eq!(outcome.pages, 2);
        assert!(!outcome.exhausted);
        let cursor = outcome.next_cursor.expect("cursor");
        assert_eq!(cursor.page_token.as_deref(), Some("P3"));
        assert_eq!(cursor.scanned, 2);
    }

    #[tokio::test]
    async fn filtered_search_forwards_api_hints() {
        let source = Arc::new(
            FakeSource::default()
                .page("t", None, &["fast", "slow", "long"], None)
                .video(video("fast", "c1", 10_000, 5, 500))
                .video(video("slow", "c2", 100, 5, 500))
                .video(video("long", "c3", 10_000, 5, 5_000)),
        );
        let mut req = request(&["t"], 10);
        req.filters.min_views_per_day = 100.0;
        req.filters.duration = DurationFilter::Medium;
        req.filters.max_age_days = Some(7);
        req.region_code = Some("US".to_string());

        let outcome = CompetitorSearch::new(source.clone())
            .run(req, None, CancellationToken::new())
            .await
            .expect("search succeeds");
        assert_eq!(ids(&outcome), vec!["fast"]);
        assert_eq!(outcome.scanned, 3);

        let queries = source.queries.lock().expect("lock");
        let query = &queries[0];
        assert_eq!(query.duration, Some(VideoDuration::Medium));
        assert_eq!(query.region_code.as_deref(), Some("US"));
        let after = query.published_after.expect("recency hint");
        let age = Utc::now() - after;
        assert!(age >= Duration::days(7) && age < Duration::days(8));
    }

    #[tokio::test]
    async fn streams_events_in_order() {
        let search = CompetitorSearch::new(Arc::new(dedup_source()));
        let events: Vec<SearchEvent> = search
            .stream(request(&["latte art"], 5), None, CancellationToken::new())
            .map(|e| e.expect("no errors"))
            .collect()
            .await;

        assert!(matches!(&events[0], SearchEvent::Started { terms } if terms.len() == 1));
        assert!(matches!(
            &events[1],
            SearchEvent::Page { page: 1, candidates: 2, fresh: 2, .. }
        ));
        assert!(matches!(&events[2], SearchEvent::Match(v) if v.video.id == "v4"));
        assert!(matches!(&events[3], SearchEvent::Match(v) if v.video.id == "v1"));
        match &events[4] {
            SearchEvent::Finished(summary) => {
                assert_eq!(summary.matched, 2);
                assert!(summary.exhausted);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn cancellation_returns_cursor_at_unconsumed_page() {
        let source = Arc::new(dedup_source());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let events: Vec<SearchEvent> = CompetitorSearch::new(source.clone())
            .stream(request(&["espresso"], 5), None, cancel.clone())
            .map(|e| e.expect("no errors"))
            .collect()
            .await;

        match events.last() {
            Some(SearchEvent::Cancelled { cursor }) => {
                assert_eq!(cursor.query_index, 0);
                assert!(cursor.page_token.is_none());
                assert_eq!(cursor.scanned, 0);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(source.search_calls(), 0);

        let err = CompetitorSearch::new(source)
            .run(request(&["espresso"], 5), None, cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, Error::Cancelled));
    }

    /// Serves page one, then hangs on the `T2` page until the search is cancelled.
    struct StallingSource {
        inner: FakeSource,
        stalled: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl VideoSource for StallingSource {
        async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage> {
            if query.page_token.as_deref() == Some("T2") {
                self.stalled.notify_one();
                std::future::pending::<()>().await;
            }
            self.inner.search_page(query).await
        }

        async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoDetails>> {
            self.inner.video_details(ids).await
        }
    }

    #[tokio::test]
    async fn cancel_during_request_keeps_consumed_pages() {
        let stalled = Arc::new(tokio::sync::Notify::new());
        let source = StallingSource {
            inner: FakeSource::default()
                .page("espresso", None, &["a", "b"], Some("T2"))
                .video(video("a", "c1", 1_000, 10, 300))
                .video(video("b", "c2", 5_000, 10, 300)),
            stalled: stalled.clone(),
        };
        let cancel = CancellationToken::new();
        let mut stream = CompetitorSearch::new(Arc::new(source)).stream(
            request(&["espresso"], 5),
            None,
            cancel.clone(),
        );

        let mut matches = Vec::new();
        while matches.len() < 2 {
            match stream.next().await.expect("event").expect("no errors") {
                SearchEvent::Match(hit) => matches.push(hit.video.id),
                SearchEvent::Started { .. } | SearchEvent::Page { .. } => {}
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(matches, vec!["b", "a"]);

        stalled.notified().await;
        cancel.cancel();

        let cursor = match stream.next().await.expect("event").expect("no errors") {
            SearchEvent::Cancelled { cursor } => cursor,
            other => panic!("expected cancellation, got {other:?}"),
        };
        assert!(stream.next().await.is_none());
        assert_eq!(cursor.query_index, 0);
        assert_eq!(cursor.page_token.as_deref(), Some("T2"));
        assert_eq!(cursor.scanned, 2);
        assert_eq!(
            cursor.seen_ids.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let resumed = Arc::new(
            FakeSource::default()
                .page("espresso", Some("T2"), &["b", "c"], None)
                .video(video("c", "c3", 2_000, 10, 300)),
        );
        let outcome = CompetitorSearch::new(resumed.clone())
            .run(request(&["espresso"], 5), Some(cursor), CancellationToken::new())
            .await
            .expect("resumes");
        let queries = resumed.queries.lock().expect("lock");
        assert_eq!(queries[0].page_token.as_deref(), Some("T2"));
        assert_eq!(ids(&outcome), vec!["c"]);
        assert_eq!(outcome.scanned, 3);
    }

    #[tokio::test]
    async fn source_errors_end_the_stream() {
        let source = dedup_source().failing_on("latte art");
        let err = CompetitorSearch::new(Arc::new(source))
            .run(request(&["espresso", "latte art"], 100), None, CancellationToken::new())
            .await
            .expect_err("quota error");
        assert!(matches!(err, Error::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn rejects_invalid_requests_and_foreign_cursors() {
        let search = CompetitorSearch::new(Arc::new(FakeSource::default()));

        let err = search
            .run(request(&[], 5), None, CancellationToken::new())
            .await
            .expect_err("no terms");
        assert!(matches!(err, Error::Config(_)));

        let err = search
            .run(request(&["a"], 0), None, CancellationToken::new())
            .await
            .expect_err("zero target");
        assert!(matches!(err, Error::Config(_)));

        let foreign = Cursor::start(&["other".to_string()]);
        let err = search
            .run(request(&["a"], 5), Some(foreign), CancellationToken::new())
            .await
            .expect_err("foreign cursor");
        assert!(matches!(err, Error::InvalidCursor(_)));
    }
}

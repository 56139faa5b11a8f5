use crate::config::YouTubeConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum IDs the `videos` endpoint accepts per call, and the page size we ask `search` for.
pub const MAX_RESULTS_PER_PAGE: usize = 50;

const MAX_VIDEO_ID_LEN: usize = 128;
pub(crate) const MISSING_API_KEY: &str = "YouTube API key missing; set YOUTUBE_API_KEY or youtube.api_key";

/// Coarse duration buckets understood by the search endpoint's `videoDuration` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoDuration {
    Short,
    Medium,
    Long,
}

impl VideoDuration {
    fn as_param(self) -> &'static str {
        match self {
            VideoDuration::Short => "short",
            VideoDuration::Medium => "medium",
            VideoDuration::Long => "long",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub term: String,
    pub page_token: Option<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub duration: Option<VideoDuration>,
    pub region_code: Option<String>,
    pub relevance_language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub video_ids: Vec<String>,
    pub next_page_token: Option<String>,
    pub total_results: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub id: String,
    pub title: String,
    pub description: String,
    pub channel_id: String,
    pub channel_title: String,
    pub tags: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub view_count: u64,
    pub like_count: u64,
    pub comment_count: u64,
    /// Zero when the API reports no parseable duration (live streams, premieres).
    pub duration_secs: u64,
    pub thumbnail_url: Option<String>,
}

impl VideoDetails {
    pub fn url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}

/// Source of candidate videos for competitor search.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage>;

    /// Returns details for the IDs the API still knows about, in any order.
    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoDetails>>;
}

#[derive(Clone)]
pub struct YouTubeClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(config: &YouTubeConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::config(MISSING_API_KEY))?;

        let http = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        Ok(response.json::<T>().await?)
    }

    /// Looks up a single video, failing when it does not exist or is private.
    pub async fn video(&self, video_id: &str) -> Result<VideoDetails> {
        let video_id = sanitize_video_id(video_id)?;
        self.video_details(std::slice::from_ref(&video_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::custom(format!("Video {video_id} not found")))
    }
}

#[async_trait]
impl VideoSource for YouTubeClient {
    async fn search_page(&self, query: &SearchQuery) -> Result<SearchPage> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("type", "video".to_string()),
            ("order", "viewCount".to_string()),
            ("maxResults", MAX_RESULTS_PER_PAGE.to_string()),
            ("q", query.term.clone()),
        ];
        if let Some(token) = &query.page_token {
            params.push(("pageToken", token.clone()));
        }
        if let Some(after) = query.published_after {
            params.push((
                "publishedAfter",
                after.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }
        if let Some(duration) = query.duration {
            params.push(("videoDuration", duration.as_param().to_string()));
        }
        if let Some(region) = &query.region_code {
            params.push(("regionCode", region.clone()));
        }
        if let Some(language) = &query.relevance_language {
            params.push(("relevanceLanguage", language.clone()));
        }

        let response: SearchResponse = self.get_json("search", &params).await?;
        let video_ids: Vec<String> = response
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect();

        debug!(
            term = %query.term,
            results = video_ids.len(),
            has_next = response.next_page_token.is_some(),
            "Fetched search page"
        );

        Ok(SearchPage {
            video_ids,
            next_page_token: response.next_page_token,
            total_results: response.page_info.and_then(|info| info.total_results),
        })
    }

    async fn video_details(&self, ids: &[String]) -> Result<Vec<VideoDetails>> {
        let mut videos = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_RESULTS_PER_PAGE) {
            let params = [
                ("part", "snippet,statistics,contentDetails".to_string()),
                ("id", chunk.join(",")),
                ("maxResults", MAX_RESULTS_PER_PAGE.to_string()),
            ];
            let response: VideosResponse = self.get_json("videos", &params).await?;
            videos.extend(response.items.into_iter().filter_map(VideoItem::into_details));
        }

        if videos.len() < ids.len() {
            debug!(
                requested = ids.len(),
                returned = videos.len(),
                "Some videos were unavailable"
            );
        }

        Ok(videos)
    }
}

fn api_error(status: StatusCode, body: &str) -> Error {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
    let (message, reasons) = match parsed {
        Some(ErrorResponse { error }) => (
            error.message,
            error.errors.into_iter().map(|e| e.reason).collect::<Vec<_>>(),
        ),
        None => (body.trim().to_string(), Vec::new()),
    };

    if status == StatusCode::FORBIDDEN
        && reasons
            .iter()
            .any(|r| r == "quotaExceeded" || r == "dailyLimitExceeded")
    {
        warn!("YouTube quota exhausted");
        return Error::QuotaExceeded(message);
    }

    Error::Api {
        service: "youtube",
        status: status.as_u16(),
        message,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    next_page_token: Option<String>,
    page_info: Option<PageInfo>,
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    total_results: Option<u64>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    statistics: Option<Statistics>,
    content_details: Option<ContentDetails>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    published_at: DateTime<Utc>,
    #[serde(default)]
    channel_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Deserialize, Default)]
struct Thumbnails {
    maxres: Option<Thumbnail>,
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: String,
}

// Counts arrive as strings and are omitted when the owner hides them.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

impl VideoItem {
    fn into_details(self) -> Option<VideoDetails> {
        let snippet = self.snippet?;
        let count = |value: Option<&String>| value.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
        let stats = self.statistics.as_ref();
        let thumbs = snippet.thumbnails;
        let thumbnail_url = thumbs
            .maxres
            .or(thumbs.high)
            .or(thumbs.medium)
            .or(thumbs.default)
            .map(|t| t.url);

        Some(VideoDetails {
            id: self.id,
            title: html_escape::decode_html_entities(&snippet.title).into_owned(),
            description: html_escape::decode_html_entities(&snippet.description).into_owned(),
            channel_id: snippet.channel_id,
            channel_title: html_escape::decode_html_entities(&snippet.channel_title).into_owned(),
            tags: snippet.tags,
            published_at: snippet.published_at,
            view_count: count(stats.and_then(|s| s.view_count.as_ref())),
            like_count: count(stats.and_then(|s| s.like_count.as_ref())),
            comment_count: count(stats.and_then(|s| s.comment_count.as_ref())),
            duration_secs: self
                .content_details
                .and_then(|c| c.duration)
                .and_then(|d| parse_iso8601_duration(&d))
                .unwrap_or(0),
            thumbnail_url,
        })
    }
}

/// Parses the ISO 8601 durations YouTube reports, e.g. `PT1H2M3S` or `P1DT5M`.
pub fn parse_iso8601_duration(raw: &str) -> Option<u64> {
    let rest = raw.trim().strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    let mut number = String::new();
    let mut in_time = false;
    let mut saw_component = false;

    for c in rest.chars() {
        match c {
            '0'..='9' => number.push(c),
            'T' if !in_time && number.is_empty() => in_time = true,
            'W' | 'D' | 'H' | 'M' | 'S' => {
                let value: u64 = number.parse().ok()?;
                number.clear();
                let unit = match (c, in_time) {
                    ('W', false) => 7 * 86_400,
                    ('D', false) => 86_400,
                    ('H', true) => 3_600,
                    ('M', true) => 60,
                    ('S', true) => 1,
                    _ => return None,
                };
                total = total.checked_add(value.checked_mul(unit)?)?;
                saw_component = true;
            }
            _ => return None,
        }
    }

    if !number.is_empty() || !saw_component {
        return None;
    }
    Some(total)
}

pub fn extract_video_id(url: &str) -> Option<String> {
    // Extract video ID from various YouTube URL formats
    let raw_id = if let Some(v_param) = url.split("v=").nth(1) {
        v_param.split('&').next().unwrap_or(v_param)
    } else if let Some(youtu_be) = url.split("youtu.be/").nth(1) {
        youtu_be.split(['?', '/']).next().unwrap_or(youtu_be)
    } else if let Some(path) = url
        .split("/shorts/")
        .nth(1)
        .or_else(|| url.split("/embed/").nth(1))
        .or_else(|| url.split("/live/").nth(1))
    {
        path.split(['?', '/', '&']).next().unwrap_or(path)
    } else {
        url
    };

    sanitize_video_id(raw_id).ok()
}

/// Ensure a video identifier is safe for downstream use (filesystem paths, API calls, etc.).
/// Only ASCII alphanumeric characters plus `_` and `-` are allowed.
pub fn sanitize_video_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(Error::custom("Video ID cannot be empty"));
    }

    if trimmed.len() > MAX_VIDEO_ID_LEN {
        return Err(Error::custom("Video ID is unexpectedly long"));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(Error::custom(
            "Video ID contains unsupported characters; expected only letters, numbers, '-' or '_'",
        ));
    }

    Ok(trimmed.to_string())
}

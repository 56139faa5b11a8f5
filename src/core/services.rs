use crate::config::Config;
use crate::core::cache::{CompetitorFinder, FileCache, MemoryCache, SearchCache};
use crate::core::competitors::{CompetitorSearch, SearchRequest};
use crate::core::ideas::{IdeaService, VideoIdea, render_markdown};
use crate::core::keywords::{DataForSeoClient, KeywordMetrics, rank_keywords};
use crate::core::niche::{self, Niche};
use crate::core::storage::StorageService;
use crate::core::youtube::{MISSING_API_KEY, YouTubeClient, extract_video_id};
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const IDEA_KEYWORD_POOL: usize = 50;
const IDEA_KEYWORDS: usize = 15;
const IDEA_COMPETITORS: usize = 10;

/// Clients built once from the config and shared by the CLI and the TUI.
#[derive(Clone)]
pub struct Services {
    config: Arc<Config>,
    youtube: Option<YouTubeClient>,
    finder: Option<CompetitorFinder>,
    cache: Option<Arc<dyn SearchCache>>,
    pub storage: StorageService,
}

pub struct IdeaReport {
    pub niche: Niche,
    pub ideas: Vec<VideoIdea>,
    pub keywords: Vec<KeywordMetrics>,
    pub path: PathBuf,
}

impl Services {
    /// YouTube-backed operations report the missing key when they are used, not here.
    pub fn new(config: Config, use_cache: bool) -> Self {
        let youtube = match YouTubeClient::new(&config.youtube) {
            Ok(client) => Some(client),
            Err(e) => {
                debug!(error = %e, "YouTube client unavailable");
                None
            }
        };

        let cache: Option<Arc<dyn SearchCache>> = (use_cache && config.cache.enabled).then(|| {
            if config.cache.persist {
                Arc::new(FileCache::new(config.cache.dir.clone(), config.cache.ttl()))
                    as Arc<dyn SearchCache>
            } else {
                Arc::new(MemoryCache::new(config.cache.ttl()))
            }
        });
        let finder = youtube
            .clone()
            .map(|client| CompetitorFinder::new(CompetitorSearch::new(Arc::new(client)), cache.clone()));

        Self {
            storage: StorageService::new(config.storage.dir.clone()),
            config: Arc::new(config),
            youtube,
            finder,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn youtube(&self) -> Result<&YouTubeClient> {
        self.youtube.as_ref().ok_or_else(missing_youtube_key)
    }

    pub fn finder(&self) -> Result<&CompetitorFinder> {
        self.finder.as_ref().ok_or_else(missing_youtube_key)
    }

    /// Drops every cached search; works without API keys.
    pub async fn clear_cache(&self) -> Result<usize> {
        match &self.cache {
            Some(cache) => cache.clear().await,
            None => Ok(0),
        }
    }

    /// Infers a niche from a YouTube link or bare video ID, else from the input as free text.
    pub async fn niche_for(&self, input: &str) -> Result<Niche> {
        if is_video_link(input) {
            self.niche_for_video(input).await
        } else {
            niche::infer_from_text(input)
        }
    }

    pub async fn niche_for_video(&self, input: &str) -> Result<Niche> {
        let video_id = extract_video_id(input)
            .ok_or_else(|| Error::custom(format!("Invalid video URL or ID: {input}")))?;
        let video = self.youtube()?.video(&video_id).await?;
        niche::infer_from_video(&video)
    }

    /// Search request for a niche using the configured defaults.
    pub fn request_for(&self, niche: &Niche) -> SearchRequest {
        let mut request = SearchRequest::for_niche(niche, &self.config.search);
        request.region_code = self.config.youtube.region_code.clone();
        request.relevance_language = self.config.youtube.relevance_language.clone();
        request
    }

    pub async fn keywords(&self, seed: &str, limit: usize) -> Result<Vec<KeywordMetrics>> {
        let client = DataForSeoClient::new(&self.config.dataforseo)?;
        let metrics = client.keyword_suggestions(seed, limit.max(1)).await?;
        Ok(rank_keywords(metrics, limit))
    }

    /// Generates ideas for a seed and saves the markdown report.
    ///
    /// Keyword metrics and competitor titles enrich the prompt when their services
    /// are configured; without them the ideas rest on the niche alone.
    pub async fn idea_report(&self, seed: &str, count: usize) -> Result<IdeaReport> {
        let niche = niche::infer_from_text(seed)?;

        let keywords = match self.keywords(seed, IDEA_KEYWORD_POOL).await {
            Ok(mut keywords) => {
                keywords.truncate(IDEA_KEYWORDS);
                keywords
            }
            Err(e) => {
                warn!(error = %e, "Continuing without keyword metrics");
                Vec::new()
            }
        };

        let competitor_titles = match self.finder() {
            Ok(finder) => {
                let mut request = self.request_for(&niche);
                request.target = IDEA_COMPETITORS;
                match finder.find(request, None, CancellationToken::new()).await {
                    Ok(outcome) => outcome
                        .videos
                        .into_iter()
                        .take(IDEA_COMPETITORS)
                        .map(|v| v.video.title)
                        .collect(),
                    Err(e) => {
                        warn!(error = %e, "Continuing without competitor titles");
                        Vec::new()
                    }
                }
            }
            Err(_) => Vec::new(),
        };

        let ideas = IdeaService::new(&self.config.llm)
            .generate(&niche, &keywords, &competitor_titles, count)
            .await?;
        let markdown = render_markdown(&niche, &ideas, &keywords);
        let path = self.storage.save_ideas(&niche.label, &markdown).await?;

        Ok(IdeaReport {
            niche,
            ideas,
            keywords,
            path,
        })
    }
}

fn missing_youtube_key() -> Error {
    Error::config(MISSING_API_KEY)
}

const VIDEO_ID_LEN: usize = 11;

pub fn is_video_link(input: &str) -> bool {
    let input = input.trim();
    let lower = input.to_ascii_lowercase();
    lower.contains("youtube.com/") || lower.contains("youtu.be/") || looks_like_video_id(input)
}

/// Eleven ID characters with at least one that plain lowercase words lack.
fn looks_like_video_id(input: &str) -> bool {
    input.len() == VIDEO_ID_LEN
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && input
            .chars()
            .any(|c| c.is_ascii_digit() || c.is_ascii_uppercase() || c == '-' || c == '_')
}

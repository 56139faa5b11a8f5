use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "channelboost.toml";

const YOUTUBE_API_KEY_ENV: &str = "YOUTUBE_API_KEY";
const DATAFORSEO_LOGIN_ENV: &str = "DATAFORSEO_LOGIN";
const DATAFORSEO_PASSWORD_ENV: &str = "DATAFORSEO_PASSWORD";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub youtube: YouTubeConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub dataforseo: DataForSeoConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub region_code: Option<String>,
    pub relevance_language: Option<String>,
    pub timeout_secs: u64,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            region_code: None,
            relevance_language: None,
            timeout_secs: 20,
        }
    }
}

impl YouTubeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Defaults applied to competitor searches when the caller does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub target: usize,
    pub max_age_days: Option<u32>,
    pub min_views_per_day: f64,
    pub min_views: u64,
    pub max_pages: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            target: 20,
            max_age_days: Some(90),
            min_views_per_day: 0.0,
            min_views: 0,
            max_pages: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// `false` keeps entries in memory for the lifetime of the process only.
    pub persist: bool,
    pub dir: PathBuf,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persist: true,
            dir: PathBuf::from(".channelboost/cache"),
            ttl_secs: 6 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataForSeoConfig {
    pub login: Option<String>,
    pub password: Option<String>,
    pub base_url: String,
    pub location_code: u32,
    pub language_code: String,
}

impl Default for DataForSeoConfig {
    fn default() -> Self {
        Self {
            login: None,
            password: None,
            base_url: "https://api.dataforseo.com".to_string(),
            location_code: 2840,
            language_code: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5.2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".channelboost"),
        }
    }
}

impl Config {
    /// Loads the config file (explicit path, else `channelboost.toml` when present),
    /// then overlays secrets from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(YOUTUBE_API_KEY_ENV) {
            self.youtube.api_key = Some(key);
        }
        if let Some(login) = non_empty(DATAFORSEO_LOGIN_ENV) {
            self.dataforseo.login = Some(login);
        }
        if let Some(password) = non_empty(DATAFORSEO_PASSWORD_ENV) {
            self.dataforseo.password = Some(password);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.target == 0 {
            return Err(Error::config("search.target must be at least 1"));
        }
        if self.search.max_pages == 0 {
            return Err(Error::config("search.max_pages must be at least 1"));
        }
        if !self.search.min_views_per_day.is_finite() || self.search.min_views_per_day < 0.0 {
            return Err(Error::config(
                "search.min_views_per_day must be a non-negative number",
            ));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(Error::config("cache.ttl_secs must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").expect("empty config parses");
        assert_eq!(config.search.target, 20);
        assert_eq!(config.search.max_pages, 10);
        assert_eq!(config.dataforseo.location_code, 2840);
        assert!(config.cache.enabled);
        assert!(config.youtube.api_key.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [search]
            target = 50
            min_views_per_day = 250.5

            [cache]
            enabled = false
            "#,
        )
        .expect("config parses");

        assert_eq!(config.search.target, 50);
        assert_eq!(config.search.min_views_per_day, 250.5);
        assert_eq!(config.search.max_age_days, Some(90));
        assert!(!config.cache.enabled);
        assert!(config.cache.persist);
        assert_eq!(config.cache.ttl_secs, 6 * 60 * 60);
    }

    #[test]
    fn env_overrides_secrets() {
        let env: HashMap<&str, &str> = [
            (YOUTUBE_API_KEY_ENV, "yt-key"),
            (DATAFORSEO_LOGIN_ENV, "login"),
            (DATAFORSEO_PASSWORD_ENV, "   "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::parse("[dataforseo]\npassword = \"from-file\"\n").expect("parses");
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.youtube.api_key.as_deref(), Some("yt-key"));
        assert_eq!(config.dataforseo.login.as_deref(), Some("login"));
        assert_eq!(config.dataforseo.password.as_deref(), Some("from-file"));
    }

    #[test]
    fn rejects_invalid_values() {
        let zero_target = Config::parse("[search]\ntarget = 0\n").expect("parses");
        assert!(matches!(zero_target.validate(), Err(Error::Config(_))));

        let negative = Config::parse("[search]\nmin_views_per_day = -1.0\n").expect("parses");
        assert!(negative.validate().is_err());

        let zero_ttl = Config::parse("[cache]\nttl_secs = 0\n").expect("parses");
        assert!(zero_ttl.validate().is_err());
    }

    #[test]
    fn reports_malformed_toml() {
        assert!(matches!(Config::parse("[search"), Err(Error::Toml(_))));
    }
}

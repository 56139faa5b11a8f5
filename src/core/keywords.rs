use crate::config::DataForSeoConfig;
use crate::error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::cmp::Ordering;
use tracing::{debug, info};

const SUGGESTIONS_PATH: &str = "/v3/dataforseo_labs/google/keyword_suggestions/live";
const STATUS_OK: u32 = 20000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMetrics {
    pub keyword: String,
    pub search_volume: u64,
    /// Paid-search competition, 0.0 (none) to 1.0 (saturated).
    pub competition: f64,
    pub cpc: Option<f64>,
}

impl KeywordMetrics {
    pub fn opportunity(&self) -> f64 {
        self.search_volume as f64 * (1.0 - self.competition.clamp(0.0, 1.0))
    }
}

/// Highest opportunity first; ties broken alphabetically.
pub fn rank_keywords(mut metrics: Vec<KeywordMetrics>, limit: usize) -> Vec<KeywordMetrics> {
    metrics.sort_by(|a, b| {
        b.opportunity()
            .partial_cmp(&a.opportunity())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    metrics.truncate(limit);
    metrics
}

#[derive(Clone)]
pub struct DataForSeoClient {
    http: Client,
    base_url: String,
    login: String,
    password: String,
    location_code: u32,
    language_code: String,
}

impl DataForSeoClient {
    pub fn new(config: &DataForSeoConfig) -> Result<Self> {
        let (Some(login), Some(password)) = (config.login.clone(), config.password.clone()) else {
            return Err(Error::config(
                "DataForSEO credentials missing; set DATAFORSEO_LOGIN and DATAFORSEO_PASSWORD",
            ));
        };

        Ok(Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            login,
            password,
            location_code: config.location_code,
            language_code: config.language_code.clone(),
        })
    }

    pub async fn keyword_suggestions(&self, seed: &str, limit: usize) -> Result<Vec<KeywordMetrics>> {
        let seed = seed.trim();
        if seed.is_empty() {
            return Err(Error::custom("Seed keyword cannot be empty"));
        }

        let body = json!([{
            "keyword": seed,
            "location_code": self.location_code,
            "language_code": self.language_code,
            "limit": limit,
            "include_seed_keyword": true,
        }]);

        info!(seed, limit, "Requesting keyword suggestions");
        let response = self
            .http
            .post(format!("{}{SUGGESTIONS_PATH}", self.base_url))
            .basic_auth(&self.login, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api {
                service: "dataforseo",
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let envelope: Envelope = response.json().await?;
        let metrics = envelope.into_metrics()?;
        debug!(count = metrics.len(), "Parsed keyword suggestions");
        Ok(metrics)
    }
}

// DataForSEO wraps every reply in task envelopes with their own status codes.
#[derive(Deserialize)]
struct Envelope {
    status_code: u32,
    #[serde(default)]
    status_message: String,
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Deserialize)]
struct Task {
    status_code: u32,
    #[serde(default)]
    status_message: String,
    #[serde(default)]
    result: Option<Vec<TaskResult>>,
}

#[derive(Deserialize)]
struct TaskResult {
    seed_keyword_data: Option<Item>,
    #[serde(default)]
    items: Option<Vec<Item>>,
}

#[derive(Deserialize)]
struct Item {
    keyword: String,
    keyword_info: Option<KeywordInfo>,
}

#[derive(Deserialize)]
struct KeywordInfo {
    search_volume: Option<u64>,
    competition: Option<f64>,
    cpc: Option<f64>,
}

impl Envelope {
    fn into_metrics(self) -> Result<Vec<KeywordMetrics>> {
        if self.status_code != STATUS_OK {
            return Err(dataforseo_error(self.status_code, self.status_message));
        }

        let mut metrics: Vec<KeywordMetrics> = Vec::new();
        for task in self.tasks {
            if task.status_code != STATUS_OK {
                return Err(dataforseo_error(task.status_code, task.status_message));
            }
            for result in task.result.into_iter().flatten() {
                let items = result
                    .seed_keyword_data
                    .into_iter()
                    .chain(result.items.into_iter().flatten());
                for item in items {
                    if metrics.iter().any(|m| m.keyword == item.keyword) {
                        continue;
                    }
                    let info = item.keyword_info;
                    metrics.push(KeywordMetrics {
                        keyword: item.keyword,
                        search_volume: info.as_ref().and_then(|i| i.search_volume).unwrap_or(0),
                        competition: info.as_ref().and_then(|i| i.competition).unwrap_or(0.0),
                        cpc: info.as_ref().and_then(|i| i.cpc),
                    });
                }
            }
        }
        Ok(metrics)
    }
}

fn dataforseo_error(code: u32, message: String) -> Error {
    Error::Api {
        service: "dataforseo",
        status: u16::try_from(code / 100).unwrap_or(u16::MAX),
        message: format!("{code}: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> DataForSeoClient {
        DataForSeoClient::new(&DataForSeoConfig {
            login: Some("user".to_string()),
            password: Some("pass".to_string()),
            base_url: server.uri(),
            ..DataForSeoConfig::default()
        })
        .expect("client builds")
    }

    fn metric(keyword: &str, volume: u64, competition: f64) -> KeywordMetrics {
        KeywordMetrics {
            keyword: keyword.to_string(),
            search_volume: volume,
            competition,
            cpc: None,
        }
    }

    #[test]
    fn requires_credentials() {
        let result = DataForSeoClient::new(&DataForSeoConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn ranks_by_uncontested_volume() {
        let ranked = rank_keywords(
            vec![
                metric("crowded", 10_000, 0.95),
                metric("sweet spot", 4_000, 0.1),
                metric("tiny", 50, 0.0),
                metric("also sweet", 4_000, 0.1),
            ],
            3,
        );
        let names: Vec<&str> = ranked.iter().map(|m| m.keyword.as_str()).collect();
        assert_eq!(names, vec!["also sweet", "sweet spot", "crowded"]);
    }

    #[tokio::test]
    async fn parses_seed_and_suggestions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SUGGESTIONS_PATH))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 20000,
                "status_message": "Ok.",
                "tasks": [{
                    "status_code": 20000,
                    "status_message": "Ok.",
                    "result": [{
                        "seed_keyword": "home espresso",
                        "seed_keyword_data": {
                            "keyword": "home espresso",
                            "keyword_info": { "search_volume": 2400, "competition": 0.8, "cpc": 1.1 }
                        },
                        "items": [
                            { "keyword": "home espresso machine", "keyword_info": { "search_volume": 9900, "competition": 1.0 } },
                            { "keyword": "home espresso", "keyword_info": { "search_volume": 2400 } },
                            { "keyword": "home espresso setup", "keyword_info": null }
                        ]
                    }]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let metrics = client_for(&server)
            .keyword_suggestions("home espresso", 10)
            .await
            .expect("suggestions");

        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0].keyword, "home espresso");
        assert_eq!(metrics[0].cpc, Some(1.1));
        assert_eq!(metrics[1].search_volume, 9900);
        assert_eq!(metrics[2].search_volume, 0);
    }

    #[tokio::test]
    async fn task_errors_become_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SUGGESTIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 20000,
                "tasks": [{ "status_code": 40501, "status_message": "Invalid Field: 'location_code'." }]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .keyword_suggestions("x", 5)
            .await
            .expect_err("task error");
        match err {
            Error::Api { service, status, message } => {
                assert_eq!(service, "dataforseo");
                assert_eq!(status, 405);
                assert!(message.contains("location_code"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn http_failures_surface_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .keyword_suggestions("x", 5)
            .await
            .expect_err("auth error");
        assert!(matches!(err, Error::Api { status: 401, .. }));
    }

    #[tokio::test]
    async fn empty_seed_is_rejected() {
        let server = MockServer::start().await;
        assert!(client_for(&server).keyword_suggestions("  ", 5).await.is_err());
    }
}

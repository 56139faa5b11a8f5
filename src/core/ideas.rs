use crate::config::LlmConfig;
use crate::core::keywords::KeywordMetrics;
use crate::core::niche::Niche;
use crate::error::{Error, Result};
use async_openai::{
    self,
    types::responses::{
        CreateResponseArgs, EasyInputMessageArgs, InputItem, InputParam, OutputItem,
        OutputMessageContent, Role,
    },
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Write as _;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You are a YouTube strategist. You propose specific, clickable video ideas \
that target real search demand and avoid copying existing titles.";
const OPENAI_OPT_IN_ENV: &str = "CHANNELBOOST_ALLOW_OPENAI";
const MAX_OUTPUT_TOKENS: u32 = 4_000;
const MAX_PROMPT_KEYWORDS: usize = 15;
const MAX_PROMPT_TITLES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoIdea {
    pub title: String,
    pub keyword: Option<String>,
}

#[derive(Clone)]
pub struct IdeaService {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl IdeaService {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: async_openai::Client::new(),
            model: config.model.clone(),
        }
    }

    pub async fn generate(
        &self,
        niche: &Niche,
        keywords: &[KeywordMetrics],
        competitor_titles: &[String],
        count: usize,
    ) -> Result<Vec<VideoIdea>> {
        enforce_openai_opt_in()?;

        let request = CreateResponseArgs::default()
            .max_output_tokens(MAX_OUTPUT_TOKENS)
            .model(self.model.as_str())
            .input(InputParam::Items(vec![
                InputItem::EasyMessage(
                    EasyInputMessageArgs::default()
                        .role(Role::System)
                        .content(SYSTEM_PROMPT)
                        .build()?,
                ),
                InputItem::EasyMessage(
                    EasyInputMessageArgs::default()
                        .role(Role::User)
                        .content(build_prompt(niche, keywords, competitor_titles, count))
                        .build()?,
                ),
            ]))
            .build()?;

        info!(niche = %niche.label, count, "Requesting video ideas");
        let response = self.client.responses().create(request).await?;

        let mut content = String::new();
        for output in response.output {
            if let OutputItem::Message(out) = output {
                for c in out.content {
                    match c {
                        OutputMessageContent::OutputText(text) => content.push_str(&text.text),
                        other => warn!("Unexpected content type: {other:?}"),
                    }
                }
            }
        }

        let ideas = parse_ideas(&content);
        if ideas.is_empty() {
            return Err(Error::custom("The model returned no usable video ideas"));
        }
        Ok(ideas)
    }
}

fn enforce_openai_opt_in() -> Result<()> {
    match env::var(OPENAI_OPT_IN_ENV) {
        Ok(val)
            if matches!(
                val.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            ) =>
        {
            Ok(())
        }
        _ => Err(Error::custom(format!(
            "Idea generation requires explicit opt-in. Set {OPENAI_OPT_IN_ENV}=1 to enable uploads to OpenAI."
        ))),
    }
}

pub fn build_prompt(
    niche: &Niche,
    keywords: &[KeywordMetrics],
    competitor_titles: &[String],
    count: usize,
) -> String {
    let mut prompt = format!("Niche: {}\n", niche.label);
    if !niche.keywords.is_empty() {
        let _ = writeln!(prompt, "Related words: {}", niche.keywords.join(", "));
    }

    if !keywords.is_empty() {
        prompt.push_str("\nSearch demand (keyword | monthly searches | competition 0-1):\n");
        for k in keywords.iter().take(MAX_PROMPT_KEYWORDS) {
            let _ = writeln!(prompt, "- {} | {} | {:.2}", k.keyword, k.search_volume, k.competition);
        }
    }

    if !competitor_titles.is_empty() {
        prompt.push_str("\nFast-growing competitor videos:\n");
        for title in competitor_titles.iter().take(MAX_PROMPT_TITLES) {
            let _ = writeln!(prompt, "- {title}");
        }
    }

    let _ = write!(
        prompt,
        "\nWrite {count} video ideas, one per line, formatted as `N. Title | target keyword`. \
         No other text."
    );
    prompt
}

/// Reads `1. Title | keyword` lines; `-`/`*` bullets and a missing keyword are tolerated.
pub fn parse_ideas(text: &str) -> Vec<VideoIdea> {
    text.lines()
        .filter_map(|line| {
            let line = strip_list_marker(line.trim())?;
            let (title, keyword) = match line.split_once('|') {
                Some((title, keyword)) => (title, Some(keyword)),
                None => (line, None),
            };

            let title = clean(title);
            if title.is_empty() {
                return None;
            }
            Some(VideoIdea {
                title,
                keyword: keyword.map(clean).filter(|k| !k.is_empty()),
            })
        })
        .collect()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return Some(rest.trim_start());
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..]
        .strip_prefix(['.', ')'])
        .map(str::trim_start)
}

fn clean(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '"' | '`' | '*' | '“' | '”'))
        .trim()
        .to_string()
}

pub fn render_markdown(niche: &Niche, ideas: &[VideoIdea], keywords: &[KeywordMetrics]) -> String {
    let mut out = format!("# Video ideas: {}\n\n", niche.label);
    let _ = writeln!(out, "Generated {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M"));

    out.push_str("## Ideas\n\n");
    for (i, idea) in ideas.iter().enumerate() {
        match &idea.keyword {
            Some(keyword) => {
                let _ = writeln!(out, "{}. {} (keyword: {keyword})", i + 1, idea.title);
            }
            None => {
                let _ = writeln!(out, "{}. {}", i + 1, idea.title);
            }
        }
    }

    if !keywords.is_empty() {
        out.push_str("\n## Keywords\n\n| Keyword | Volume | Competition |\n|---------|--------|-------------|\n");
        for k in keywords {
            let _ = writeln!(out, "| {} | {} | {:.2} |", k.keyword, k.search_volume, k.competition);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::niche::NicheSource;

    fn niche() -> Niche {
        Niche {
            label: "home espresso".to_string(),
            terms: vec!["home espresso".to_string()],
            keywords: vec!["espresso".to_string(), "grinder".to_string()],
            source: NicheSource::Text,
        }
    }

    #[test]
    fn parses_numbered_and_bulleted_lines() {
        let text = "Here are your ideas:\n\
                    1. \"I Tried 5 Budget Grinders\" | budget espresso grinder\n\
                    2) Dialing In Espresso in 60 Seconds|\n\
                    - **Latte Art for Beginners** | latte art\n\
                    \n\
                    3.   \n\
                    2024 was a great year";
        let ideas = parse_ideas(text);

        assert_eq!(
            ideas,
            vec![
                VideoIdea {
                    title: "I Tried 5 Budget Grinders".to_string(),
                    keyword: Some("budget espresso grinder".to_string()),
                },
                VideoIdea {
                    title: "Dialing In Espresso in 60 Seconds".to_string(),
                    keyword: None,
                },
                VideoIdea {
                    title: "Latte Art for Beginners".to_string(),
                    keyword: Some("latte art".to_string()),
                },
            ]
        );
    }

    #[test]
    fn prompt_includes_demand_and_competitors() {
        let keywords = vec![KeywordMetrics {
            keyword: "espresso grinder".to_string(),
            search_volume: 5400,
            competition: 0.25,
            cpc: None,
        }];
        let prompt = build_prompt(&niche(), &keywords, &["Best grinder 2025".to_string()], 7);

        assert!(prompt.starts_with("Niche: home espresso\n"));
        assert!(prompt.contains("Related words: espresso, grinder"));
        assert!(prompt.contains("- espresso grinder | 5400 | 0.25"));
        assert!(prompt.contains("- Best grinder 2025"));
        assert!(prompt.contains("Write 7 video ideas"));
    }

    #[test]
    fn markdown_lists_ideas_and_keywords() {
        let ideas = vec![
            VideoIdea {
                title: "Budget setup".to_string(),
                keyword: Some("cheap espresso".to_string()),
            },
            VideoIdea {
                title: "Milk steaming".to_string(),
                keyword: None,
            },
        ];
        let md = render_markdown(&niche(), &ideas, &[]);
        assert!(md.starts_with("# Video ideas: home espresso"));
        assert!(md.contains("1. Budget setup (keyword: cheap espresso)"));
        assert!(md.contains("2. Milk steaming\n"));
        assert!(!md.contains("## Keywords"));
    }
}

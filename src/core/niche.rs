use crate::core::youtube::VideoDetails;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on query terms per niche; each term costs search quota.
pub const MAX_TERMS: usize = 6;
const MAX_KEYWORDS: usize = 10;
const PHRASE_WORDS: usize = 4;
const MAX_TAG_TERMS: usize = 3;
const MAX_TAG_WORDS: usize = 5;
const MAX_HASHTAG_TERMS: usize = 2;

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "being", "best", "but", "by", "can", "could", "did", "do", "does", "doing",
    "don't", "down", "each", "ep", "episode", "every", "feat", "few", "for", "from", "ft", "full",
    "get", "got", "had", "has", "have", "he", "her", "here", "him", "his", "how", "i", "i'm",
    "if", "in", "into", "is", "it", "it's", "its", "just", "like", "make", "me", "more", "most",
    "my", "new", "no", "not", "now", "of", "official", "on", "one", "only", "or", "other", "our",
    "out", "over", "part", "really", "she", "short", "shorts", "should", "so", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "top", "up", "very", "video", "videos", "vs", "want", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "why", "will", "with", "would",
    "you", "you're", "your",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NicheSource {
    Text,
    Video { video_id: String, channel_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Niche {
    pub label: String,
    /// Search queries, most specific first.
    pub terms: Vec<String>,
    pub keywords: Vec<String>,
    pub source: NicheSource,
}

pub fn infer_from_text(text: &str) -> Result<Niche> {
    let tokens = tokenize(text);
    let keywords: Vec<&String> = tokens.iter().filter(|t| is_keyword(t)).collect();
    if keywords.is_empty() {
        return Err(Error::custom(
            "Could not infer a niche: the description has no usable keywords",
        ));
    }

    let mut terms = TermList::default();
    terms.push(phrase(keywords.iter().map(|k| k.as_str())));
    for bigram in repeated_bigrams(&tokens) {
        terms.push(bigram);
    }

    let ranked = rank(keywords.iter().map(|k| (k.to_string(), 1)));
    for keyword in &ranked {
        terms.push(keyword.clone());
    }

    Ok(build_niche(terms, ranked, NicheSource::Text))
}

pub fn infer_from_video(video: &VideoDetails) -> Result<Niche> {
    let title_tokens = tokenize(&video.title);
    let title_keywords: Vec<&String> = title_tokens.iter().filter(|t| is_keyword(t)).collect();
    let hashtags = extract_hashtags(&format!("{}\n{}", video.title, video.description));
    let tags: Vec<String> = video
        .tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty() && tag.split_whitespace().count() <= MAX_TAG_WORDS)
        .collect();

    let mut terms = TermList::default();
    if !title_keywords.is_empty() {
        terms.push(phrase(title_keywords.iter().map(|k| k.as_str())));
    }
    for tag in tags.iter().take(MAX_TAG_TERMS) {
        terms.push(tag.clone());
    }
    for hashtag in hashtags.iter().take(MAX_HASHTAG_TERMS) {
        terms.push(hashtag.clone());
    }

    let weighted = title_keywords
        .iter()
        .map(|k| (k.to_string(), 3))
        .chain(
            tags.iter()
                .flat_map(|tag| tokenize(tag))
                .filter(|t| is_keyword(t))
                .map(|t| (t, 2)),
        )
        .chain(hashtags.iter().map(|h| (h.clone(), 2)));
    let ranked = rank(weighted);
    for keyword in &ranked {
        terms.push(keyword.clone());
    }

    if terms.is_empty() {
        return Err(Error::custom(format!(
            "Could not infer a niche from video {}: no title keywords, tags or hashtags",
            video.id
        )));
    }

    Ok(build_niche(
        terms,
        ranked,
        NicheSource::Video {
            video_id: video.id.clone(),
            channel_id: video.channel_id.clone(),
        },
    ))
}

/// Hashtags in order of first appearance, lowercased and without the `#`.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut prev: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        let at_boundary = prev.is_none_or(|p| p.is_whitespace() || matches!(p, '(' | ','));
        prev = Some(c);
        if c != '#' || !at_boundary {
            continue;
        }

        let mut tag = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_alphanumeric() || next == '_' {
                tag.push(next);
                chars.next();
                prev = Some(next);
            } else {
                break;
            }
        }

        let tag = tag.to_lowercase();
        if tag.chars().any(char::is_alphabetic) && !found.contains(&tag) {
            found.push(tag);
        }
    }

    found
}

fn build_niche(terms: TermList, ranked: Vec<String>, source: NicheSource) -> Niche {
    let terms = terms.0;
    Niche {
        label: terms.first().cloned().unwrap_or_default(),
        terms,
        keywords: ranked.into_iter().take(MAX_KEYWORDS).collect(),
        source,
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn is_keyword(token: &str) -> bool {
    token.chars().count() > 1
        && !token.chars().all(|c| c.is_ascii_digit())
        && !STOPWORDS.contains(&token)
}

fn phrase<'a>(keywords: impl Iterator<Item = &'a str>) -> String {
    let mut words: Vec<&str> = Vec::with_capacity(PHRASE_WORDS);
    for word in keywords {
        if words.len() == PHRASE_WORDS {
            break;
        }
        if !words.contains(&word) {
            words.push(word);
        }
    }
    words.join(" ")
}

/// Adjacent keyword pairs seen at least twice, most frequent first.
fn repeated_bigrams(tokens: &[String]) -> Vec<String> {
    let pairs = tokens
        .windows(2)
        .filter(|w| is_keyword(&w[0]) && is_keyword(&w[1]) && w[0] != w[1])
        .map(|w| (format!("{} {}", w[0], w[1]), 1));

    let mut counts: Vec<(String, u32)> = Vec::new();
    for (pair, weight) in pairs {
        match counts.iter_mut().find(|(p, _)| *p == pair) {
            Some((_, count)) => *count += weight,
            None => counts.push((pair, weight)),
        }
    }
    counts.retain(|(_, count)| *count >= 2);
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(pair, _)| pair).collect()
}

/// Ranks by total weight; the stable sort keeps first appearance on ties.
fn rank(items: impl Iterator<Item = (String, u32)>) -> Vec<String> {
    let mut scores: Vec<(String, u32)> = Vec::new();
    for (item, weight) in items {
        match scores.iter_mut().find(|(existing, _)| *existing == item) {
            Some((_, score)) => *score += weight,
            None => scores.push((item, weight)),
        }
    }
    scores.sort_by(|a, b| b.1.cmp(&a.1));
    scores.into_iter().map(|(item, _)| item).collect()
}

#[derive(Default)]
struct TermList(Vec<String>);

impl TermList {
    fn push(&mut self, term: String) {
        let term = term.split_whitespace().collect::<Vec<_>>().join(" ");
        if term.is_empty() || self.0.len() >= MAX_TERMS || self.0.contains(&term) {
            return;
        }
        self.0.push(term);
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

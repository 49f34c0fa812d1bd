use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum_macros::{Display, EnumString};

lazy_static! {
    static ref PUNCTUATION: Regex = Regex::new(r"[,.!?:\-]").unwrap();
    static ref MOVIE_AND_FACT: Regex = Regex::new(r"^(?:in\s+)?(.+?\s*\(\d{4}\)),?\s*(.+)$").unwrap();
    static ref NON_ALPHANUMERIC: Regex = Regex::new(r"[^a-z0-9]").unwrap();
}

const KEYWORD_OVERLAP_THRESHOLD: f64 = 0.7;
const SEQUENCE_THRESHOLD: f64 = 0.8;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "was", "were", "is", "are", "been", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "must", "can", "this", "that", "these",
    "those", "then", "than", "so", "as", "her", "his", "their", "our",
];

/// How two titles are compared when deciding whether one repeats the
/// other. Chosen once, when a library is built.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TitlePolicy {
    /// Byte equality after trimming surrounding whitespace.
    Exact,
    /// Trimmed, case-folded, inner whitespace collapsed.
    #[default]
    Normalized,
    /// `Normalized`, plus fuzzy matching of facts about the same movie.
    Similar,
}

impl TitlePolicy {
    /// Set key for `title`. Two titles with equal keys are always
    /// duplicates under this policy.
    pub fn key(&self, title: &str) -> String {
        match self {
            TitlePolicy::Exact => title.trim().to_string(),
            TitlePolicy::Normalized | TitlePolicy::Similar => fold(title),
        }
    }

    /// Whether `candidate` repeats `existing`.
    pub fn matches(&self, candidate: &str, existing: &str) -> bool {
        if self.key(candidate) == self.key(existing) {
            return true;
        }
        match self {
            TitlePolicy::Similar => titles_similar(candidate, existing),
            _ => false,
        }
    }

    /// Whether a key lookup alone answers membership.
    pub fn is_exact_keyed(&self) -> bool {
        !matches!(self, TitlePolicy::Similar)
    }
}

/// Trim, lowercase and collapse runs of whitespace to a single space.
pub fn fold(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `fold`, with sentence punctuation removed. Parentheses survive so that
/// release years stay attached to movie names.
pub fn normalize_fact(text: &str) -> String {
    fold(&PUNCTUATION.replace_all(&text.to_lowercase(), ""))
}

/// Split `In <Movie> (<Year>), <fact>` into its lowercase movie and fact.
pub fn split_movie_and_fact(title: &str) -> Option<(String, String)> {
    let lower = title.trim().to_lowercase();
    let captures = MOVIE_AND_FACT.captures(&lower)?;
    let movie = captures.get(1)?.as_str().trim().to_string();
    let fact = captures.get(2)?.as_str().trim().to_string();
    Some((movie, fact))
}

fn keywords(fact: &str) -> HashSet<String> {
    fact.to_lowercase()
        .split_whitespace()
        .map(|word| NON_ALPHANUMERIC.replace_all(word, "").into_owned())
        .filter(|word| word.len() > 2 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

fn keyword_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// 1.0 for identical strings, falling towards 0.0 as the edit distance
/// approaches the length of the longer string.
fn sequence_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - distance::levenshtein(a, b) as f64 / longest as f64
}

/// Whether two facts say the same thing in different words.
pub fn facts_similar(a: &str, b: &str) -> bool {
    let (norm_a, norm_b) = (normalize_fact(a), normalize_fact(b));
    if norm_a == norm_b {
        return true;
    }

    let (keys_a, keys_b) = (keywords(a), keywords(b));
    if !keys_a.is_empty()
        && !keys_b.is_empty()
        && keyword_overlap(&keys_a, &keys_b) >= KEYWORD_OVERLAP_THRESHOLD
    {
        return true;
    }

    sequence_similarity(&norm_a, &norm_b) >= SEQUENCE_THRESHOLD
}

/// Titles naming the same movie are compared by their facts only; titles
/// about different movies never match; anything else is compared whole.
pub fn titles_similar(a: &str, b: &str) -> bool {
    match (split_movie_and_fact(a), split_movie_and_fact(b)) {
        (Some((movie_a, fact_a)), Some((movie_b, fact_b))) => {
            normalize_fact(&movie_a) == normalize_fact(&movie_b) && facts_similar(&fact_a, &fact_b)
        }
        _ => facts_similar(a, b),
    }
}

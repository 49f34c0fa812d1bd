use crate::deduplication::{BulkAddOutcome, TitleSet};
use crate::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref LEADING_NUMBERING: Regex = Regex::new(r"^[\d\-.\s]+").unwrap();
}

/// Used titles quoted back to the generator, at most.
pub const EXCLUSION_LIMIT: usize = 20;
const MIN_TITLE_CHARS: usize = 6;

/// Produces a script from a prompt. The model behind it is not this
/// crate's concern.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Result of one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptSession {
    pub session_id: String,
    pub channel: String,
    pub script: String,
    /// Every title found in the script, repeats included.
    pub titles: Vec<String>,
    pub outcome: BulkAddOutcome,
}

/// Full prompt for one run: the exclusion line, the channel prompt, then
/// any extra instructions.
pub fn compose_prompt(base_prompt: &str, used: &TitleSet, extra: Option<&str>) -> String {
    let mut prompt = if used.is_empty() {
        base_prompt.to_string()
    } else {
        let excluded: Vec<&str> = used.sorted().into_iter().take(EXCLUSION_LIMIT).collect();
        format!(
            "EXISTING FACTS (DO NOT REPEAT): {}\n\n{}",
            excluded.join(" | "),
            base_prompt
        )
    };

    if let Some(extra) = extra.map(str::trim).filter(|extra| !extra.is_empty()) {
        prompt.push(' ');
        prompt.push_str(extra);
    }
    prompt
}

fn title_line(line: &str) -> Option<&str> {
    let head = line.get(..5)?;
    if !head.eq_ignore_ascii_case("TITLE") {
        return None;
    }
    let rest = &line[5..];
    match rest.chars().next()? {
        ':' | ' ' => Some(&rest[1..]),
        c if !c.is_alphabetic() => Some(rest),
        _ => None,
    }
}

/// Titles announced by `TITLE` lines of a script, in order.
pub fn extract_titles(script: &str) -> Vec<String> {
    script
        .lines()
        .filter_map(|line| title_line(line.trim()))
        .filter_map(|title| {
            let title = title.trim();
            let title = title.strip_suffix(" SHORT").unwrap_or(title).trim();
            let title = LEADING_NUMBERING.replace(title, "");
            let title = title.trim();
            (title.chars().count() >= MIN_TITLE_CHARS).then(|| title.to_string())
        })
        .collect()
}

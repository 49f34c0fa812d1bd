use crate::normalize::{fold, TitlePolicy};
use crate::pagination::{paginate, TitlePage};
use crate::store::Payload;
use crate::Result;
use serde::Serialize;
use std::collections::HashMap;

/// The used titles of one channel.
///
/// Keeps the titles as they were first written, in store order, plus a
/// key index built with the set's `TitlePolicy` so that exact and
/// normalized lookups are O(1). The `Similar` policy falls back to a
/// scan once the key lookup misses.
#[derive(Debug, Clone, Default)]
pub struct TitleSet {
    policy: TitlePolicy,
    titles: Vec<String>,
    keys: HashMap<String, usize>,
}

/// Result of filtering a batch against a `TitleSet`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAddOutcome {
    /// First occurrence of every new title, in input order.
    pub added: Vec<String>,
    /// Rejected titles paired with the title they repeat.
    pub duplicates: Vec<(String, String)>,
}

impl BulkAddOutcome {
    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }
}

impl TitleSet {
    pub fn new(policy: TitlePolicy) -> Self {
        Self {
            policy,
            titles: Vec::new(),
            keys: HashMap::new(),
        }
    }

    /// Build a set from stored titles. Blank lines are skipped, and so is
    /// any title that repeats an earlier one.
    pub fn from_titles<I, T>(policy: TitlePolicy, titles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut set = Self::new(policy);
        for title in titles {
            set.insert(title.as_ref());
        }
        set
    }

    pub fn from_payload(policy: TitlePolicy, payload: &Payload) -> Result<Self> {
        Ok(Self::from_titles(policy, payload.lines()?))
    }

    pub fn policy(&self) -> TitlePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }

    /// Titles in the order they were recorded.
    pub fn titles(&self) -> &[String] {
        &self.titles
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.titles.iter().map(String::as_str)
    }

    /// The stored title `title` collides with, if any.
    pub fn find_match(&self, title: &str) -> Option<&str> {
        if let Some(&idx) = self.keys.get(&self.policy.key(title)) {
            return Some(&self.titles[idx]);
        }
        if self.policy.is_exact_keyed() {
            return None;
        }
        self.titles
            .iter()
            .find(|existing| self.policy.matches(title, existing))
            .map(String::as_str)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.find_match(title).is_some()
    }

    /// Check-then-insert. Returns true if `title` was new.
    pub fn insert(&mut self, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() || self.contains(title) {
            return false;
        }
        self.keys.insert(self.policy.key(title), self.titles.len());
        self.titles.push(title.to_string());
        true
    }

    /// Remove the title whose key equals `title`'s key, returning the
    /// stored spelling. Fuzzy matches are never removed.
    pub fn remove(&mut self, title: &str) -> Option<String> {
        let idx = self.keys.remove(&self.policy.key(title))?;
        let removed = self.titles.remove(idx);
        for slot in self.keys.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Split `candidates` into the titles that are new to this set and
    /// the ones that repeat either the set or an earlier candidate. The
    /// set itself is left unchanged.
    pub fn filter_new<I, T>(&self, candidates: I) -> BulkAddOutcome
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut scratch = self.clone();
        let mut outcome = BulkAddOutcome::default();

        for candidate in candidates {
            let candidate = candidate.as_ref().trim();
            if candidate.is_empty() {
                continue;
            }
            match scratch.find_match(candidate) {
                Some(existing) => outcome
                    .duplicates
                    .push((candidate.to_string(), existing.to_string())),
                None => {
                    scratch.insert(candidate);
                    outcome.added.push(candidate.to_string());
                }
            }
        }

        outcome
    }

    /// Titles sorted case-insensitively, ties broken by the raw spelling,
    /// so that the order does not depend on how the set was filled.
    pub fn sorted(&self) -> Vec<&str> {
        let mut sorted: Vec<(String, &str)> = self
            .titles
            .iter()
            .map(|title| (fold(title), title.as_str()))
            .collect();
        sorted.sort();
        sorted.into_iter().map(|(_, title)| title).collect()
    }

    pub fn page(&self, page: usize, page_size: usize) -> Result<TitlePage> {
        paginate(&self.sorted(), page, page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = TitleSet::new(TitlePolicy::Normalized);
        assert!(set.insert("Inception"));
        assert!(set.contains("Inception"));
        assert!(!set.insert("Inception"));
        assert!(!set.insert("  INCEPTION "));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_blank_titles_are_ignored() {
        let mut set = TitleSet::new(TitlePolicy::Normalized);
        assert!(!set.insert("   "));
        assert!(set.is_empty());
    }

    #[test]
    fn test_filter_new_keeps_first_occurrence_in_order() {
        let set = TitleSet::from_titles(TitlePolicy::Normalized, ["Up"]);
        let outcome = set.filter_new(["Inception", "Memento", "inception", "Up", "Memento", "Heat"]);

        assert_eq!(outcome.added, ["Inception", "Memento", "Heat"]);
        assert_eq!(
            outcome.duplicates,
            [
                ("inception".to_string(), "Inception".to_string()),
                ("Up".to_string(), "Up".to_string()),
                ("Memento".to_string(), "Memento".to_string()),
            ]
        );
        // The set itself is untouched
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_exact_policy_keeps_case_variants() {
        let set = TitleSet::from_titles(TitlePolicy::Exact, ["Inception", "inception"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_similar_policy_finds_reworded_fact() {
        let set = TitleSet::from_titles(
            TitlePolicy::Similar,
            ["In Titanic (1997), James Cameron drew the sketch of Rose himself"],
        );
        let probe = "In Titanic (1997), the sketch of Rose was drawn by James Cameron himself";

        assert_eq!(
            set.find_match(probe),
            Some("In Titanic (1997), James Cameron drew the sketch of Rose himself")
        );
    }

    #[test]
    fn test_remove_keeps_index_consistent() {
        let mut set = TitleSet::from_titles(TitlePolicy::Normalized, ["A title", "B title", "C title"]);
        assert_eq!(set.remove("a TITLE"), Some("A title".to_string()));
        assert_eq!(set.remove("missing"), None);

        assert!(set.contains("C title"));
        assert_eq!(set.find_match("c title"), Some("C title"));
        assert!(set.insert("A title"));
        assert_eq!(set.titles(), ["B title", "C title", "A title"]);
    }

    #[test]
    fn test_sorted_is_case_insensitive() {
        let set = TitleSet::from_titles(TitlePolicy::Exact, ["up", "Inception", "Amelie", "Up"]);
        assert_eq!(set.sorted(), ["Amelie", "Inception", "Up", "up"]);
    }

    #[test]
    fn test_from_payload_rejects_documents() {
        assert!(TitleSet::from_payload(TitlePolicy::Normalized, &Payload::empty_document()).is_err());
    }
}

//! Keyword normalization, deduplication, and batch arithmetic
//!
//! Everything here is a pure function over strings. Normalization decides
//! which raw keywords are queryable at all; deduplication collapses casing
//! and spacing variants onto one canonical key while remembering the original
//! spellings for the caller.

use std::collections::HashMap;

/// Words that carry no query value on their own
const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Normalized keys shorter than this are rejected
const MIN_KEY_LEN: usize = 2;

/// Normalized keys longer than this are truncated
const MAX_KEY_LEN: usize = 80;

/// One normalized keyword with the raw spellings that mapped onto it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryItem {
    /// Canonical query key
    pub key: String,

    /// Original inputs, in arrival order
    pub originals: Vec<String>,
}

/// Normalize a raw keyword into a canonical query key
///
/// Lowercases, collapses whitespace, and strips characters outside
/// `[a-z0-9_ '-]`. Returns `None` for non-ASCII input, keys shorter than two
/// characters, and keys consisting only of stop words.
pub fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.is_ascii() {
        return None;
    }

    let lowered = trimmed.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '-' | '\''))
        .collect();

    let mut key = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if key.len() < MIN_KEY_LEN {
        return None;
    }
    if key.len() > MAX_KEY_LEN {
        // All-ASCII by this point, truncation cannot split a character
        key.truncate(MAX_KEY_LEN);
        key = key.trim_end().to_string();
    }

    if key.split(' ').all(|word| STOP_WORDS.contains(&word)) {
        return None;
    }

    Some(key)
}

/// Collapse raw keywords onto normalized keys, preserving arrival order
///
/// Unqueryable inputs are dropped with a debug log; duplicates extend the
/// existing item's original list.
pub fn dedupe(keywords: &[String]) -> Vec<QueryItem> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut items: Vec<QueryItem> = Vec::new();

    for raw in keywords {
        let Some(key) = normalize(raw) else {
            tracing::debug!(keyword = %raw, "dropping unqueryable keyword");
            continue;
        };

        match index.get(&key) {
            Some(&i) => items[i].originals.push(raw.clone()),
            None => {
                index.insert(key.clone(), items.len());
                items.push(QueryItem {
                    key,
                    originals: vec![raw.clone()],
                });
            }
        }
    }

    items
}

/// Split keys into batches of at most `size`
pub fn split_into_batches(keys: &[String], size: usize) -> Vec<Vec<String>> {
    keys.chunks(size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Split a batch in half for poison-item isolation
///
/// Only meaningful for batches of two or more; a single-item batch yields an
/// empty left half.
pub fn bisect(batch: &[String]) -> (Vec<String>, Vec<String>) {
    let mid = batch.len() / 2;
    (batch[..mid].to_vec(), batch[mid..].to_vec())
}

/// Singular/plural-tolerant key comparison
///
/// Keys match when identical or when one equals the other plus a trailing
/// "s". A deliberate imprecision: "glasses"/"glasse" style false pairs are
/// accepted in exchange for catching the overwhelmingly common English
/// plural, and downstream consumers rely on it.
pub fn keys_match(a: &str, b: &str) -> bool {
    a == b || a.strip_suffix('s') == Some(b) || b.strip_suffix('s') == Some(a)
}

/// Align fetched entries to the batch keys they answer
///
/// Exact key matches win; remaining batch keys take the first fetched entry
/// whose key matches under the plural tolerance. Fetched entries answering no
/// batch key are discarded, keeping results a subset of the input.
pub fn align_results<V>(batch: &[String], mut fetched: HashMap<String, V>) -> HashMap<String, V> {
    let mut aligned = HashMap::with_capacity(batch.len());

    for key in batch {
        if let Some(value) = fetched.remove(key) {
            aligned.insert(key.clone(), value);
            continue;
        }

        let candidate = fetched.keys().find(|other| keys_match(key, other)).cloned();
        if let Some(candidate) = candidate {
            if let Some(value) = fetched.remove(&candidate) {
                aligned.insert(key.clone(), value);
            }
        }
    }

    aligned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Game Time  "), Some("game time".to_string()));
        assert_eq!(normalize("game   time"), Some("game time".to_string()));
        assert_eq!(normalize("game\ttime"), Some("game time".to_string()));
    }

    #[test]
    fn test_normalize_rejects_non_ascii() {
        assert_eq!(normalize("café"), None);
        assert_eq!(normalize("ゲーム"), None);
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("rock & roll!"), Some("rock roll".to_string()));
        assert_eq!(normalize("mother's day"), Some("mother's day".to_string()));
        assert_eq!(normalize("t-shirt"), Some("t-shirt".to_string()));
    }

    #[test]
    fn test_normalize_rejects_short_keys() {
        assert_eq!(normalize("a"), None);
        // "c++" strips to "c", below the minimum length
        assert_eq!(normalize("c++"), None);
        assert_eq!(normalize("go"), Some("go".to_string()));
    }

    #[test]
    fn test_normalize_rejects_stop_word_only() {
        assert_eq!(normalize("the"), None);
        assert_eq!(normalize("of the and"), None);
        assert_eq!(normalize("the office"), Some("the office".to_string()));
    }

    #[test]
    fn test_normalize_truncates_long_keys() {
        let raw = "x".repeat(200);
        let key = normalize(&raw).unwrap();
        assert_eq!(key.len(), 80);
    }

    #[test]
    fn test_dedupe_collapses_variants() {
        let items = dedupe(&strings(&["Game Time", "game   time", "rust", "GAME TIME"]));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "game time");
        assert_eq!(items[0].originals.len(), 3);
        assert_eq!(items[1].key, "rust");
    }

    #[test]
    fn test_dedupe_drops_invalid() {
        let items = dedupe(&strings(&["", "the", "rust"]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "rust");
    }

    #[test]
    fn test_split_into_batches() {
        let keys = strings(&["a1", "b1", "c1", "d1", "e1", "f1", "g1"]);
        let batches = split_into_batches(&keys, 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 3);
        assert_eq!(batches[2], strings(&["g1"]));

        // A zero size is treated as one
        assert_eq!(split_into_batches(&keys, 0).len(), 7);
    }

    #[test]
    fn test_bisect() {
        let batch = strings(&["a1", "b1", "c1", "d1", "e1"]);
        let (left, right) = bisect(&batch);
        assert_eq!(left, strings(&["a1", "b1"]));
        assert_eq!(right, strings(&["c1", "d1", "e1"]));

        let (left, right) = bisect(&strings(&["only"]));
        assert!(left.is_empty());
        assert_eq!(right.len(), 1);
    }

    #[test]
    fn test_keys_match_plural_tolerance() {
        assert!(keys_match("game", "game"));
        assert!(keys_match("game", "games"));
        assert!(keys_match("games", "game"));
        assert!(!keys_match("game", "gaming"));
        assert!(!keys_match("game", "gamers"));
    }

    #[test]
    fn test_align_results_exact_and_plural() {
        let batch = strings(&["game", "rust"]);
        let mut fetched = HashMap::new();
        fetched.insert("games".to_string(), 1u32);
        fetched.insert("rust".to_string(), 2u32);
        fetched.insert("unrelated".to_string(), 3u32);

        let aligned = align_results(&batch, fetched);
        assert_eq!(aligned.len(), 2);
        assert_eq!(aligned["game"], 1);
        assert_eq!(aligned["rust"], 2);
        assert!(!aligned.contains_key("unrelated"));
    }
}

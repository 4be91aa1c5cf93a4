//! Keyword Tokenizer
//!
//! Shared tokenization for the skill keyword index and memory retrieval.
//! Splits text into CJK runs and ASCII words; CJK text carries no spaces,
//! so a contiguous run is treated as one keyword.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Han}]+|[a-zA-Z]+").expect("static pattern"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Chinese function words
        "的", "是", "在", "了", "和", "与", "或", "有", "这", "那", "一个", "可以", "用于",
        "支持", "我", "你", "他", "她", "它",
        // English function words
        "the", "a", "an", "of", "to", "for", "and", "or", "is", "are", "in", "on", "with",
    ]
    .into_iter()
    .collect()
});

/// Extract lowercase keywords, dropping stop words and single characters
///
/// Order is preserved and duplicates removed.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for m in WORD_PATTERN.find_iter(text) {
        let word = m.as_str().to_lowercase();
        if word.chars().count() < 2 || STOP_WORDS.contains(word.as_str()) {
            continue;
        }
        if seen.insert(word.clone()) {
            keywords.push(word);
        }
    }

    keywords
}

/// Split camel/Pascal-case and snake_case identifiers into lowercase parts
pub fn split_identifier(name: &str) -> Vec<String> {
    static IDENT_PATTERN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[A-Z]?[a-z]+|[A-Z]+(?=[A-Z]|$)|\d+").expect("static pattern"));

    name.split('_')
        .flat_map(|part| IDENT_PATTERN.find_iter(part).map(|m| m.as_str().to_lowercase()))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Rough token estimate for context budgeting (2 chars per token)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_keywords() {
        let kws = extract_keywords("Search the web for Rust documentation");
        assert!(kws.contains(&"search".to_string()));
        assert!(kws.contains(&"rust".to_string()));
        assert!(!kws.contains(&"the".to_string()));
    }

    #[test]
    fn test_cjk_keywords() {
        let kws = extract_keywords("用于在备忘录应用中记录信息");
        assert!(kws.iter().any(|k| k.contains("备忘录")));
    }

    #[test]
    fn test_dedup() {
        let kws = extract_keywords("weather weather weather");
        assert_eq!(kws.len(), 1);
    }

    #[test]
    fn test_split_identifier() {
        assert_eq!(split_identifier("notes_operator"), vec!["notes", "operator"]);
        assert_eq!(split_identifier("WebScraper"), vec!["web", "scraper"]);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens("abcd"), 2);
    }
}

//! Default tokenization
//!
//! Unicode word segmentation plus lower-casing. CJK ideographs come out
//! of segmentation one per token, which the engine's length partition
//! then routes to the char index; alphabetic scripts produce multi-code-
//! point tokens that land in the word index. When segmentation yields
//! nothing for non-empty input, a split on maximal alphanumeric runs
//! stands in. Callers with other needs (stemming, n-grams,
//! language-specific analyzers) supply their own closures in the engine
//! config; the length partition stays with the engine either way.

use unicode_segmentation::UnicodeSegmentation;

/// Segment `text` into lower-cased tokens.
pub fn default_tokenize(text: &str) -> Vec<String> {
    let tokens: Vec<String> = text.unicode_words().map(|w| w.to_lowercase()).collect();
    if tokens.is_empty() && !text.is_empty() {
        return fallback_tokenize(text);
    }
    tokens
}

/// Split `text` into maximal alphanumeric runs, lower-cased.
fn fallback_tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_english() {
        assert_eq!(default_tokenize("Hello world"), vec!["hello", "world"]);
    }

    #[test]
    fn test_punctuation_is_dropped() {
        assert_eq!(
            default_tokenize("rust-lang: fast, safe."),
            vec!["rust", "lang", "fast", "safe"]
        );
    }

    #[test]
    fn test_cjk_splits_per_ideograph() {
        assert_eq!(default_tokenize("世界"), vec!["世", "界"]);
        assert_eq!(
            default_tokenize("Hello 世界"),
            vec!["hello", "世", "界"]
        );
    }

    #[test]
    fn test_numbers_survive() {
        assert_eq!(default_tokenize("version 42"), vec!["version", "42"]);
    }

    #[test]
    fn test_empty_and_symbol_only_input() {
        assert!(default_tokenize("").is_empty());
        assert!(default_tokenize("   ").is_empty());
        assert!(default_tokenize("+++ --- !!!").is_empty());
    }

    #[test]
    fn test_fallback_splits_alphanumeric_runs() {
        assert_eq!(
            fallback_tokenize("Rust-Lang_2024"),
            vec!["rust", "lang", "2024"]
        );
        assert_eq!(fallback_tokenize("...mixed入口..."), vec!["mixed入口"]);
        assert!(fallback_tokenize("+++").is_empty());
    }

    #[test]
    fn test_fallback_agrees_with_segmentation_on_dead_ends() {
        // Both paths find nothing in symbol-only text, so the fallback
        // never invents tokens segmentation would have rejected.
        for text in ["()[]{}", "-- ~~ ::"] {
            assert!(default_tokenize(text).is_empty());
            assert!(fallback_tokenize(text).is_empty());
        }
    }
}

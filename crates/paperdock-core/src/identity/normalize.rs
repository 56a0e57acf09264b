//! Title and author normalization for identity resolution.
//!
//! The normalization policy is the deduplication contract: two provider
//! records merge iff their normalized titles are byte-identical. Keep any
//! change here in sync with the resolver tests.

use unicode_normalization::UnicodeNormalization;

/// Normalize a title for comparison.
///
/// - NFKD-decomposes so diacritics separate from their base letters
/// - Keeps only ASCII alphanumerics and whitespace
/// - Lowercases
/// - Collapses whitespace runs
/// - Strips a leading article ("a", "an", "the")
pub fn normalize_title(title: &str) -> String {
    let mut result: String = title
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .collect();

    result = result.to_lowercase();
    result = collapse_whitespace(&result);

    for prefix in ["a ", "an ", "the "] {
        if let Some(rest) = result.strip_prefix(prefix) {
            result = rest.to_string();
            break;
        }
    }

    result.trim().to_string()
}

/// Normalize an author name: same character treatment as titles, with
/// honorifics and generational suffixes removed.
pub fn normalize_author(author: &str) -> String {
    let mut result: String = author
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace() || *c == ',')
        .collect();

    result = result.to_lowercase();

    for title in ["dr ", "prof ", "professor ", "mr ", "mrs ", "ms "] {
        result = result.replace(title, "");
    }

    for suffix in [" jr", " sr", " ii", " iii", " iv", " phd", " md"] {
        if let Some(rest) = result.strip_suffix(suffix) {
            result = rest.to_string();
        }
    }

    collapse_whitespace(&result).trim().to_string()
}

/// Extract the surname from an author name, handling both
/// "Last, First" and "First Last" forms.
pub fn extract_surname(author: &str) -> String {
    let normalized = normalize_author(author);

    if let Some(comma_pos) = normalized.find(',') {
        return normalized[..comma_pos].trim().to_string();
    }

    normalized
        .split_whitespace()
        .last()
        .unwrap_or(&normalized)
        .to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;

    for c in s.chars() {
        if c.is_ascii_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(c);
            prev_was_space = false;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_case_and_articles() {
        assert_eq!(normalize_title("The Quick Brown Fox"), "quick brown fox");
        assert_eq!(normalize_title("A Study in Scarlet"), "study in scarlet");
        assert_eq!(normalize_title("Machine   Learning"), "machine learning");
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(normalize_title("Attention, Is All: You Need!"), "attention is all you need");
        assert_eq!(normalize_title("BERT: Pre-training of Deep"), "bert pretraining of deep");
    }

    #[test]
    fn folds_diacritics() {
        assert_eq!(normalize_title("Études Françaises"), "etudes francaises");
        assert_eq!(normalize_title("Naïve Bayes"), "naive bayes");
    }

    #[test]
    fn strips_only_one_leading_article() {
        assert_eq!(normalize_title("The A Team"), "a team");
    }

    #[test]
    fn author_normalization() {
        assert_eq!(normalize_author("Dr. John Smith"), "john smith");
        assert_eq!(normalize_author("John Smith Jr."), "john smith");
        assert_eq!(normalize_author("François Müller"), "francois muller");
    }

    #[test]
    fn surname_extraction() {
        assert_eq!(extract_surname("John Smith"), "smith");
        assert_eq!(extract_surname("Smith, John"), "smith");
        assert_eq!(extract_surname("Dr. John Smith Jr."), "smith");
    }

    proptest! {
        #[test]
        fn normalized_titles_are_ascii_lowercase(title in ".{0,200}") {
            let normalized = normalize_title(&title);
            prop_assert!(normalized.is_ascii());
            prop_assert!(!normalized.chars().any(|c| c.is_ascii_uppercase()));
        }

        #[test]
        fn normalized_titles_have_no_whitespace_runs(title in ".{0,200}") {
            let normalized = normalize_title(&title);
            prop_assert!(!normalized.contains("  "));
            prop_assert!(!normalized.starts_with(' '));
            prop_assert!(!normalized.ends_with(' '));
        }
    }
}

//! Keyword relevance scoring, independent of the vector index.
//!
//! Candidates are prefiltered in the store with per-token `CONTAINS` and
//! rescored here by blending a fuzzy subsequence match with Jaro-Winkler
//! similarity.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use strsim::jaro_winkler;

/// Relevance of `text` for `query` in [0, 1]. An exact (case-insensitive)
/// match scores 1.0.
pub(crate) fn keyword_score(query: &str, text: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let text_lower = text.to_lowercase();
    if query_lower.is_empty() {
        return 0.0;
    }

    let matcher = SkimMatcherV2::default();
    // The self-match score is the ceiling for this query, which turns the
    // unbounded skim score into a ratio.
    let fuzzy = match matcher.fuzzy_match(&text_lower, &query_lower) {
        Some(score) => {
            let ceiling = matcher
                .fuzzy_match(&query_lower, &query_lower)
                .unwrap_or(score.max(1));
            (score as f32 / ceiling.max(1) as f32).clamp(0.0, 1.0)
        }
        None => 0.0,
    };

    let similarity = jaro_winkler(&query_lower, &text_lower) as f32;

    (0.5 * fuzzy + 0.5 * similarity).clamp(0.0, 1.0)
}

/// Lowercased query tokens used for the store-side prefilter.
pub(crate) fn query_tokens(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_scores_highest() {
        let exact = keyword_score("ada lovelace", "Ada Lovelace");
        let partial = keyword_score("ada lovelace", "Ada King, Countess of Lovelace");
        let unrelated = keyword_score("ada lovelace", "Thomas Edison");
        assert!((exact - 1.0).abs() < 1e-6);
        assert!(exact > partial);
        assert!(partial > unrelated);
    }

    #[test]
    fn test_empty_query_scores_zero() {
        assert_eq!(keyword_score("", "anything"), 0.0);
    }

    #[test]
    fn test_query_tokens_split_and_lowercase() {
        assert_eq!(
            query_tokens("Graph-Database engines!"),
            vec!["graph", "database", "engines"]
        );
        assert!(query_tokens("  ").is_empty());
    }
}

//! Rank fusion for hybrid search.
//!
//! Each candidate list is min-max normalized independently, then combined
//! as `vector_weight * norm_vector + keyword_weight * norm_keyword`, with
//! 0 contributed for a candidate missing from one list. Ordering is total:
//! descending fused score, ties broken by ascending entity id.

use std::collections::HashMap;

/// Min-max normalize scores to [0, 1] within one list. A list whose
/// scores are all equal normalizes to 1.0 for every member.
pub(crate) fn normalize_scores(ranked: &[(String, f32)]) -> Vec<(String, f32)> {
    if ranked.is_empty() {
        return Vec::new();
    }
    let max = ranked.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
    let min = ranked.iter().map(|(_, s)| *s).fold(f32::MAX, f32::min);
    let span = max - min;

    ranked
        .iter()
        .map(|(id, score)| {
            let normalized = if span > 0.0 { (score - min) / span } else { 1.0 };
            (id.clone(), normalized)
        })
        .collect()
}

/// Fuse two independently-ranked lists into one deterministic ordering.
pub(crate) fn fuse_ranked_lists(
    vector_results: &[(String, f32)],
    keyword_results: &[(String, f32)],
    vector_weight: f32,
    keyword_weight: f32,
) -> Vec<(String, f32)> {
    let vector_norm = normalize_scores(vector_results);
    let keyword_norm: HashMap<String, f32> = normalize_scores(keyword_results)
        .into_iter()
        .collect();

    let mut fused: HashMap<String, f32> = HashMap::new();
    for (id, score) in &vector_norm {
        fused.insert(id.clone(), vector_weight * score);
    }
    for (id, score) in &keyword_norm {
        *fused.entry(id.clone()).or_insert(0.0) += keyword_weight * score;
    }

    let mut out: Vec<(String, f32)> = fused.into_iter().collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(pairs: &[(&str, f32)]) -> Vec<(String, f32)> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_normalize_spans_zero_to_one() {
        let normalized = normalize_scores(&ranked(&[("a", 10.0), ("b", 5.0), ("c", 0.0)]));
        assert_eq!(normalized[0].1, 1.0);
        assert_eq!(normalized[1].1, 0.5);
        assert_eq!(normalized[2].1, 0.0);
    }

    #[test]
    fn test_normalize_equal_scores_become_one() {
        let normalized = normalize_scores(&ranked(&[("a", 3.0), ("b", 3.0)]));
        assert!(normalized.iter().all(|(_, s)| *s == 1.0));
        assert!(normalize_scores(&[]).is_empty());
    }

    #[test]
    fn test_fusion_weights_and_missing_candidates() {
        let vector = ranked(&[("a", 1.0), ("b", 0.0)]);
        let keyword = ranked(&[("b", 2.0), ("c", 1.0)]);
        let fused = fuse_ranked_lists(&vector, &keyword, 0.6, 0.4);

        let by_id: HashMap<&str, f32> = fused.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        // a: 0.6*1.0 + 0 (absent from keyword list)
        assert!((by_id["a"] - 0.6).abs() < 1e-6);
        // b: 0.6*0.0 + 0.4*1.0
        assert!((by_id["b"] - 0.4).abs() < 1e-6);
        // c: 0 + 0.4*0.0
        assert!(by_id["c"].abs() < 1e-6);
    }

    #[test]
    fn test_fusion_is_deterministic_across_calls() {
        let vector = ranked(&[("x", 0.8), ("y", 0.8), ("z", 0.1)]);
        let keyword = ranked(&[("y", 0.5), ("x", 0.5)]);
        let first = fuse_ranked_lists(&vector, &keyword, 0.5, 0.5);
        for _ in 0..10 {
            assert_eq!(fuse_ranked_lists(&vector, &keyword, 0.5, 0.5), first);
        }
        // x and y tie exactly; ascending id breaks the tie.
        assert_eq!(first[0].0, "x");
        assert_eq!(first[1].0, "y");
    }

    #[test]
    fn test_weights_need_not_sum_to_one() {
        let vector = ranked(&[("a", 1.0)]);
        let keyword = ranked(&[("a", 1.0)]);
        let fused = fuse_ranked_lists(&vector, &keyword, 2.0, 3.0);
        assert!((fused[0].1 - 5.0).abs() < 1e-6);
    }
}

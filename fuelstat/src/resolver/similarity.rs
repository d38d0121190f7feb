//! String similarity measures for company names.
//!
//! Two independent measures, both in `[0, 1]`:
//!
//! - [`edit_ratio`]: normalised Levenshtein distance over the whole string.
//!   Catches typos and spacing variants (`GOIL` / `G OIL`).
//! - [`token_set_ratio`]: compares the shared token set against each side's
//!   leftovers, so a name that is a token subset of another scores 1.0
//!   (`STAR OIL` / `STAR OIL GH`).
//!
//! [`combined_score`] is their arithmetic mean.

use std::collections::BTreeSet;

/// Normalised Levenshtein similarity.
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Token-set similarity.
///
/// With `common` the sorted intersection and `rest_a`/`rest_b` the sorted
/// differences, the score is the best edit ratio among
/// `common` vs `common + rest_a`, `common` vs `common + rest_b` and
/// `common + rest_a` vs `common + rest_b`.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return if tokens_a.is_empty() && tokens_b.is_empty() { 1.0 } else { 0.0 };
    }

    let common = join(tokens_a.intersection(&tokens_b));
    let rest_a = join(tokens_a.difference(&tokens_b));
    let rest_b = join(tokens_b.difference(&tokens_a));

    let with_a = concat(&common, &rest_a);
    let with_b = concat(&common, &rest_b);

    let mut best = edit_ratio(&with_a, &with_b);
    if !common.is_empty() {
        best = best
            .max(edit_ratio(&common, &with_a))
            .max(edit_ratio(&common, &with_b));
    }
    best
}

/// Mean of [`edit_ratio`] and [`token_set_ratio`].
pub fn combined_score(a: &str, b: &str) -> f64 {
    (edit_ratio(a, b) + token_set_ratio(a, b)) / 2.0
}

fn join<'a>(tokens: impl Iterator<Item = &'a &'a str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

fn concat(left: &str, right: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right.to_string(),
        (_, true) => left.to_string(),
        _ => format!("{} {}", left, right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_names() {
        assert_eq!(edit_ratio("GOIL", "GOIL"), 1.0);
        assert_eq!(token_set_ratio("GOIL", "GOIL"), 1.0);
        assert_eq!(combined_score("GOIL", "GOIL"), 1.0);
    }

    #[test]
    fn test_token_order_is_ignored() {
        assert_eq!(token_set_ratio("OIL STAR", "STAR OIL"), 1.0);
        assert!(edit_ratio("OIL STAR", "STAR OIL") < 0.5);
    }

    #[test]
    fn test_subset_scores_full_token_set() {
        assert_eq!(token_set_ratio("STAR OIL", "STAR OIL GH"), 1.0);
        let combined = combined_score("STAR OIL", "STAR OIL GH");
        assert!(combined > 0.85, "{combined}");
    }

    #[test]
    fn test_distinct_names_score_low() {
        assert!(combined_score("GOIL", "PUMA ENERGY") < 0.5);
        assert!(combined_score("STAR OIL", "SO ENERGY") < 0.85);
        assert_eq!(token_set_ratio("", "GOIL"), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let pairs = [("GOIL", "G OIL"), ("ZEN PETROLEUM", "ZEN PETROLEUM GH"), ("A", "B")];
        for (a, b) in pairs {
            assert_eq!(combined_score(a, b), combined_score(b, a));
        }
    }
}

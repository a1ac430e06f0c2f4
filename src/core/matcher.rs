//! Type-label inference - Collapses near-duplicate product names into one group.
//!
//! When an item arrives without a product type, its name is compared against
//! the family's existing labeled products and the best match's label is
//! reused, so "Oatly Oat Milk" and "Oat Milk Barista" end up tracked as one
//! type. The similarity rule is a heuristic, not correctness-critical, so it
//! sits behind the [`TypeMatcher`] trait; the ledger and caches only ever
//! see the trait.

use std::collections::HashSet;

/// Minimum token length kept for comparison; shorter tokens are noise.
const MIN_TOKEN_LEN: usize = 3;

/// Pluggable similarity matcher for inferring a type label from a name.
pub trait TypeMatcher {
    /// Returns the type label of the best-matching candidate, if any
    /// candidate is similar enough. Candidates are `(product name, label)`
    /// pairs of the family's already-labeled products.
    fn infer_type(&self, name: &str, candidates: &[(String, String)]) -> Option<String>;
}

/// Token-overlap similarity: case-folded, whitespace-tokenized names with
/// tokens shorter than three characters discarded; the score is the overlap
/// divided by the larger of the two token-set sizes.
#[derive(Debug, Clone)]
pub struct TokenOverlapMatcher {
    /// Minimum score for a match to be accepted
    pub threshold: f64,
}

impl TokenOverlapMatcher {
    /// Creates a matcher with the given acceptance threshold.
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for TokenOverlapMatcher {
    fn default() -> Self {
        Self::new(0.6)
    }
}

fn tokens(name: &str) -> HashSet<String> {
    name.to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
        .map(ToString::to_string)
        .collect()
}

fn overlap_ratio(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let larger = a.len().max(b.len());
    if larger == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = a.intersection(b).count() as f64 / larger as f64;
    ratio
}

impl TypeMatcher for TokenOverlapMatcher {
    fn infer_type(&self, name: &str, candidates: &[(String, String)]) -> Option<String> {
        let name_tokens = tokens(name);
        if name_tokens.is_empty() {
            return None;
        }

        let mut best: Option<(f64, &str)> = None;
        for (candidate_name, label) in candidates {
            let score = overlap_ratio(&name_tokens, &tokens(candidate_name));
            if best.is_none_or(|(best_score, _)| score > best_score) {
                best = Some((score, label));
            }
        }

        best.filter(|&(score, _)| score >= self.threshold)
            .map(|(_, label)| label.to_string())
    }
}

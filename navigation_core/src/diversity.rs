//! Diversity metrics - entropy-based observability over routing results.
//!
//! Read-only aggregations. Nothing here feeds back into routing.

use quest_model::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::router::RouteResult;
use crate::strategies::StrategyKind;

/// Shannon entropy in bits of a frequency distribution. Zero counts are ignored.
pub fn shannon_entropy(counts: impl IntoIterator<Item = usize>) -> f64 {
    let counts: Vec<usize> = counts.into_iter().filter(|&c| c > 0).collect();
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let entropy: f64 = counts
        .iter()
        .map(|&count| {
            let p = count as f64 / total;
            -p * p.log2()
        })
        .sum();
    // Clamp the -0.0 a single-bucket distribution produces
    entropy.max(0.0)
}

/// Entropy of a tag collection's frequency distribution.
pub fn tag_entropy<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> f64 {
    let mut frequencies: BTreeMap<&str, usize> = BTreeMap::new();
    for tag in tags {
        *frequencies.entry(tag.as_str()).or_default() += 1;
    }
    shannon_entropy(frequencies.into_values())
}

/// Entropy of which strategies won across a batch of results.
pub fn source_diversity(results: &[RouteResult]) -> f64 {
    shannon_entropy(strategy_counts(results).into_values())
}

fn strategy_counts(results: &[RouteResult]) -> BTreeMap<StrategyKind, usize> {
    let mut counts = BTreeMap::new();
    for kind in results.iter().filter_map(|r| r.metrics().winning_strategy) {
        *counts.entry(kind).or_default() += 1;
    }
    counts
}

/// Batch summary for simulation runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityReport {
    /// Mean tag entropy over accepted routes.
    pub tag_entropy: f64,
    pub source_diversity: f64,
    pub strategy_counts: BTreeMap<StrategyKind, usize>,
    pub routes: usize,
    pub no_routes: usize,
}

impl DiversityReport {
    /// Summarize a run of routes.
    pub fn from_results(results: &[RouteResult]) -> Self {
        let accepted: Vec<f64> = results
            .iter()
            .filter(|r| !r.is_no_route())
            .map(|r| r.metrics().tag_entropy)
            .collect();
        let tag_entropy = if accepted.is_empty() {
            0.0
        } else {
            accepted.iter().sum::<f64>() / accepted.len() as f64
        };

        Self {
            tag_entropy,
            source_diversity: source_diversity(results),
            strategy_counts: strategy_counts(results),
            routes: accepted.len(),
            no_routes: results.len() - accepted.len(),
        }
    }
}

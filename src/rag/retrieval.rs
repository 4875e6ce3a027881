//! Ranking of hits gathered from several collections.

use std::collections::HashMap;

use serde::Serialize;

use super::store::SearchHit;

/// Which collections a query searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "collections", rename_all = "snake_case")]
pub enum CollectionScope {
    All,
    Only(Vec<String>),
}

impl CollectionScope {
    pub fn is_all(&self) -> bool {
        matches!(self, CollectionScope::All)
    }
}

/// Most hits a single restaurant may contribute when every collection is
/// searched.
pub fn diversity_cap(k: usize) -> usize {
    (k / 2).max(2)
}

/// Flattens per-collection results (in collection order) and sorts them by
/// descending similarity. The sort is stable, so ties keep collection
/// order.
pub fn merge_ranked(per_collection: Vec<Vec<SearchHit>>, limit: usize) -> Vec<SearchHit> {
    let mut merged: Vec<SearchHit> = per_collection.into_iter().flatten().collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(limit);
    merged
}

/// Keeps at most `cap` hits per restaurant among the first `k`. When the
/// cap leaves fewer than `k` hits, the skipped ones fill the gap in rank
/// order, so a single-restaurant index still returns `k` results.
pub fn diversify(ranked: Vec<SearchHit>, k: usize, cap: usize) -> Vec<SearchHit> {
    let mut per_restaurant: HashMap<&str, usize> = HashMap::new();
    let mut keep = vec![false; ranked.len()];
    let mut kept = 0;

    for (index, hit) in ranked.iter().enumerate() {
        if kept == k {
            break;
        }
        let count = per_restaurant
            .entry(hit.chunk.metadata.restaurant.as_str())
            .or_default();
        if *count < cap {
            *count += 1;
            keep[index] = true;
            kept += 1;
        }
    }

    for flag in keep.iter_mut() {
        if kept == k {
            break;
        }
        if !*flag {
            *flag = true;
            kept += 1;
        }
    }

    ranked
        .into_iter()
        .zip(keep)
        .filter_map(|(hit, keep)| keep.then_some(hit))
        .collect()
}

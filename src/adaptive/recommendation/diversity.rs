use std::collections::HashSet;

use crate::adaptive::types::RecommendationItem;

/// Keeps the top `n / 2` of `ranked` as-is, fills the rest with the best items
/// from topics not yet selected, then backfills by rank. `ranked` must already
/// be sorted best first.
pub fn apply_diversity(ranked: Vec<RecommendationItem>, n: usize) -> Vec<RecommendationItem> {
    if ranked.len() <= n {
        return ranked;
    }

    let keep = n / 2;
    let slots = n - keep;
    let mut ranked = ranked.into_iter();
    let mut selected: Vec<RecommendationItem> = ranked.by_ref().take(keep).collect();
    let rest: Vec<RecommendationItem> = ranked.collect();

    let mut topics: HashSet<String> = selected.iter().map(|r| r.topic.clone()).collect();
    let mut picked = vec![false; rest.len()];
    let mut filled = 0;

    for (idx, item) in rest.iter().enumerate() {
        if filled == slots {
            break;
        }
        if topics.insert(item.topic.clone()) {
            picked[idx] = true;
            filled += 1;
        }
    }

    let diverse: Vec<usize> = (0..rest.len()).filter(|&i| picked[i]).collect();
    let backfill: Vec<usize> = (0..rest.len())
        .filter(|&i| !picked[i])
        .take(slots - filled)
        .collect();

    let mut rest: Vec<Option<RecommendationItem>> = rest.into_iter().map(Some).collect();
    for idx in diverse.into_iter().chain(backfill) {
        if let Some(item) = rest[idx].take() {
            selected.push(item);
        }
    }
    selected
}

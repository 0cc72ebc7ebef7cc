// Reciprocal Rank Fusion (RRF)

use std::collections::HashMap;
use std::hash::Hash;

/// Standard RRF constant from Cormack, Clarke and Buettcher (SIGIR 2009).
///
/// Smaller values put more emphasis on the top of each list.
pub const RRF_K: f64 = 60.0;

/// One ranked input list and the weight applied to its contributions.
#[derive(Debug, Clone, Copy)]
pub struct WeightedList<'a, T> {
    pub items: &'a [T],
    pub weight: f64,
}

impl<'a, T> WeightedList<'a, T> {
    pub fn new(items: &'a [T], weight: f64) -> Self {
        Self { items, weight }
    }
}

/// Contribution of rank `rank` (1-indexed) in a list of the given weight.
pub fn contribution(weight: f64, rank: usize, k: f64) -> f64 {
    weight / (k + rank as f64)
}

/// Combines ranked lists by weighted reciprocal rank.
///
/// RRF formula: `score(d) = sum_r weight_r / (k + rank_r(d))`
///
/// Every occurrence of an item adds its contribution, so an item present in
/// several lists accumulates all of them. Output is sorted by score
/// descending; equal scores keep first-seen order across the lists in the
/// order they were given.
pub fn reciprocal_rank_fusion<T: Clone + Eq + Hash>(lists: &[WeightedList<'_, T>], k: f64) -> Vec<(T, f64)> {
    let mut slot: HashMap<&T, usize> = HashMap::new();
    let mut fused: Vec<(T, f64)> = Vec::new();

    for list in lists {
        for (rank, item) in list.items.iter().enumerate() {
            let add = contribution(list.weight, rank + 1, k);
            match slot.get(item) {
                Some(&i) => fused[i].1 += add,
                None => {
                    slot.insert(item, fused.len());
                    fused.push((item.clone(), add));
                }
            }
        }
    }

    // sort_by is stable, which preserves first-seen order on ties
    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused
}

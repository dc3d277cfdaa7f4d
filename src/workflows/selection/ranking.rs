use std::cmp::Ordering;

/// Stable descending sort by `key`. Items with equal keys keep their input order.
pub fn rank<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    // `sort_by` is stable; NaN keys compare equal.
    items.sort_by(|left, right| {
        key(right)
            .partial_cmp(&key(left))
            .unwrap_or(Ordering::Equal)
    });
    items
}

/// Rank the full collection, then keep the first `limit` items.
pub fn rank_top<T, F>(items: Vec<T>, key: F, limit: usize) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    let mut ranked = rank(items, key);
    ranked.truncate(limit);
    ranked
}

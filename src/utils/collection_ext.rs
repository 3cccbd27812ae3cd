//! Collection helpers shared by the historic store, trend analyzer, and
//! regression detector for grouping and keying result sets.

use std::collections::HashMap;
use std::hash::Hash;

/// Turn a `Vec` into a `HashMap` keyed by `key_fn`.
///
/// # Example
/// ```ignore
/// let runs: Vec<Run> = ...;
/// let by_id = vec_to_map(runs, |r| r.id.clone());
/// ```
#[inline]
pub fn vec_to_map<T, K, F>(items: Vec<T>, key_fn: F) -> HashMap<K, T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    items.into_iter().map(|item| (key_fn(&item), item)).collect()
}

/// Group items by key, used to bucket per-client / per-method metric pairs
/// before aggregation.
///
/// # Example
/// ```ignore
/// let pairs: Vec<MetricPair> = ...;
/// let by_client = group_by(pairs, |p| p.client.clone());
/// ```
#[inline]
pub fn group_by<T, K, F>(items: Vec<T>, key_fn: F) -> HashMap<K, Vec<T>>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut map: HashMap<K, Vec<T>> = HashMap::new();
    for item in items {
        map.entry(key_fn(&item)).or_default().push(item);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_by_buckets_items_by_key() {
        let items = vec![("geth", 1), ("geth", 2), ("reth", 3)];
        let grouped = group_by(items, |(client, _)| *client);
        assert_eq!(grouped.get("geth").unwrap().len(), 2);
        assert_eq!(grouped.get("reth").unwrap().len(), 1);
    }

    #[test]
    fn vec_to_map_keys_by_selector() {
        let items = vec![(1, "a"), (2, "b")];
        let map = vec_to_map(items, |(id, _)| *id);
        assert_eq!(map.get(&1), Some(&(1, "a")));
    }
}

//! # Id Maps
//!
//! Total mappings between id spaces, composable across pipeline stages.
//! Every stage (renumber, stitch, dedup, size filter) emits one of these,
//! and the whole chain folds into a single map before any volume is
//! relabeled.

use crate::model::{SegId, BACKGROUND};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A mapping `old_id -> new_id`, total over its declared domain. Ids absent
/// from the map pass through unchanged under both composition and volume
/// application. Background never remaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMap {
    entries: FxHashMap<SegId, SegId>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (SegId, SegId)>) -> Self {
        let mut map = Self::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        map
    }

    /// Insert one mapping. Background is a fixpoint: mapping it anywhere
    /// else is a programming error.
    pub fn insert(&mut self, from: SegId, to: SegId) {
        debug_assert!(
            !from.is_background() || to.is_background(),
            "background must not remap"
        );
        self.entries.insert(from, to);
    }

    pub fn get(&self, id: SegId) -> Option<SegId> {
        self.entries.get(&id).copied()
    }

    /// Destination of `id`, falling back to `id` itself when unmapped.
    pub fn resolve(&self, id: SegId) -> SegId {
        self.entries.get(&id).copied().unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegId, SegId)> + '_ {
        self.entries.iter().map(|(&k, &v)| (k, v))
    }

    /// Redirect this map's outputs through `next`, in place: afterwards
    /// `self[k] == next.resolve(old_self[k])` for every key. This is the
    /// composition `chain(self, next)`; it is associative, so an arbitrary
    /// pipeline of maps folds into one.
    pub fn compose(&mut self, next: &IdMap) {
        for value in self.entries.values_mut() {
            *value = next.resolve(*value);
        }
    }

    /// `chain(first, second)` as a new map, keyed by `first`'s domain plus
    /// any of `second`'s keys that `first` does not cover.
    pub fn chained(first: &IdMap, second: &IdMap) -> IdMap {
        let mut out = first.clone();
        out.compose(second);
        for (k, v) in second.iter() {
            out.entries.entry(k).or_insert(v);
        }
        out
    }

    /// Ensure every id in `domain` has an entry, identity-mapping the
    /// missing ones, so the map is total over that domain.
    pub fn expand(&mut self, domain: impl IntoIterator<Item = SegId>) {
        for id in domain {
            self.entries.entry(id).or_insert(id);
        }
    }

    /// Ids mapped to background by this map.
    pub fn removed(&self) -> impl Iterator<Item = SegId> + '_ {
        self.entries
            .iter()
            .filter(|(k, v)| v.is_background() && !k.is_background())
            .map(|(&k, _)| k)
    }
}

impl FromIterator<(SegId, SegId)> for IdMap {
    fn from_iter<I: IntoIterator<Item = (SegId, SegId)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

/// Fold an ordered list of stage maps into the single map equivalent to
/// applying them in sequence.
pub fn fold_chain<'a>(maps: impl IntoIterator<Item = &'a IdMap>) -> IdMap {
    let mut iter = maps.into_iter();
    let Some(first) = iter.next() else {
        return IdMap::new();
    };
    let mut folded = first.clone();
    for next in iter {
        folded = IdMap::chained(&folded, next);
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(u64, u64)]) -> IdMap {
        entries
            .iter()
            .map(|&(k, v)| (SegId(k), SegId(v)))
            .collect()
    }

    #[test]
    fn resolve_falls_through() {
        let m = map(&[(3, 1)]);
        assert_eq!(m.resolve(SegId(3)), SegId(1));
        assert_eq!(m.resolve(SegId(4)), SegId(4));
        assert_eq!(m.resolve(BACKGROUND), BACKGROUND);
    }

    #[test]
    fn compose_redirects_through_next() {
        let mut renumber = map(&[(1, 10), (2, 11), (3, 12)]);
        let stitch = map(&[(11, 10)]);
        renumber.compose(&stitch);
        assert_eq!(renumber.resolve(SegId(1)), SegId(10));
        assert_eq!(renumber.resolve(SegId(2)), SegId(10));
        assert_eq!(renumber.resolve(SegId(3)), SegId(12));
    }

    #[test]
    fn chain_is_associative() {
        let a = map(&[(1, 2), (5, 6)]);
        let b = map(&[(2, 3), (6, 0)]);
        let c = map(&[(3, 4)]);

        let left = IdMap::chained(&IdMap::chained(&a, &b), &c);
        let right = IdMap::chained(&a, &IdMap::chained(&b, &c));
        for id in 0..8 {
            assert_eq!(left.resolve(SegId(id)), right.resolve(SegId(id)));
        }
        assert_eq!(left.resolve(SegId(1)), SegId(4));
        assert_eq!(left.resolve(SegId(5)), SegId(0));
    }

    #[test]
    fn fold_chain_matches_sequential_application() {
        let stages = [map(&[(1, 2)]), map(&[(2, 3)]), map(&[(3, 0)])];
        let folded = fold_chain(&stages);
        assert_eq!(folded.resolve(SegId(1)), BACKGROUND);
        assert_eq!(folded.resolve(SegId(7)), SegId(7));
    }

    #[test]
    fn expand_makes_map_total() {
        let mut m = map(&[(2, 1)]);
        m.expand([SegId(1), SegId(2), SegId(3)]);
        assert_eq!(m.get(SegId(3)), Some(SegId(3)));
        assert_eq!(m.get(SegId(2)), Some(SegId(1)));
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn removed_lists_background_mappings() {
        let m = map(&[(4, 0), (5, 5), (6, 0)]);
        let mut removed: Vec<_> = m.removed().collect();
        removed.sort_unstable();
        assert_eq!(removed, vec![SegId(4), SegId(6)]);
    }
}

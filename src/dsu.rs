//! # Disjoint Set Union
//!
//! Union-Find over segment ids with union-by-rank and path halving. Both
//! merge criteria in the pipeline (face adjacency and partner-pair
//! duplicates) reduce to components of this structure, and both pick
//! `min(component)` as the surviving representative so the outcome is
//! independent of edge insertion order.

use crate::idmap::IdMap;
use crate::model::SegId;
use rustc_hash::FxHashMap;

/// Disjoint-set forest keyed by segment id.
#[derive(Debug, Clone, Default)]
pub struct DisjointSet {
    parent: FxHashMap<SegId, SegId>,
    rank: FxHashMap<SegId, u32>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an id as its own singleton set if unseen.
    pub fn insert(&mut self, id: SegId) {
        self.parent.entry(id).or_insert(id);
        self.rank.entry(id).or_insert(0);
    }

    pub fn contains(&self, id: SegId) -> bool {
        self.parent.contains_key(&id)
    }

    /// Find the root of `id`, compressing with path halving. Untracked ids
    /// are their own root.
    pub fn find(&mut self, id: SegId) -> SegId {
        let Some(&parent) = self.parent.get(&id) else {
            return id;
        };
        if parent == id {
            return id;
        }

        let mut current = id;
        let mut parent = parent;
        loop {
            let grandparent = self.parent.get(&parent).copied().unwrap_or(parent);
            if grandparent == parent {
                break;
            }
            self.parent.insert(current, grandparent);
            current = grandparent;
            parent = self.parent.get(&current).copied().unwrap_or(current);
            if parent == current {
                break;
            }
        }
        parent
    }

    /// Merge the sets containing `a` and `b`, inserting either if unseen.
    pub fn union(&mut self, a: SegId, b: SegId) {
        self.insert(a);
        self.insert(b);

        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }

        let rank_a = self.rank.get(&root_a).copied().unwrap_or(0);
        let rank_b = self.rank.get(&root_b).copied().unwrap_or(0);
        if rank_a < rank_b {
            self.parent.insert(root_a, root_b);
        } else if rank_a > rank_b {
            self.parent.insert(root_b, root_a);
        } else {
            self.parent.insert(root_a, root_b);
            self.rank.insert(root_b, rank_b + 1);
        }
    }

    pub fn same_set(&mut self, a: SegId, b: SegId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Group all tracked ids by root. Each component's ids come back sorted.
    pub fn components(&mut self) -> Vec<Vec<SegId>> {
        let ids: Vec<SegId> = self.parent.keys().copied().collect();
        let mut by_root: FxHashMap<SegId, Vec<SegId>> = FxHashMap::default();
        for id in ids {
            let root = self.find(id);
            by_root.entry(root).or_default().push(id);
        }

        let mut components: Vec<Vec<SegId>> = by_root.into_values().collect();
        for component in &mut components {
            component.sort_unstable();
        }
        components.sort_unstable_by_key(|c| c[0]);
        components
    }

    /// The id map collapsing every component onto its minimum member.
    /// Singleton components map to themselves, so re-running a merge over
    /// already-merged ids yields the identity.
    pub fn merge_map(&mut self) -> IdMap {
        let mut map = IdMap::new();
        for component in self.components() {
            let target = component[0];
            for id in component {
                map.insert(id, target);
            }
        }
        map
    }
}

/// Build the min-representative merge map for a batch of undirected edges.
pub fn merge_map_from_edges(edges: impl IntoIterator<Item = (SegId, SegId)>) -> IdMap {
    let mut dsu = DisjointSet::new();
    for (a, b) in edges {
        dsu.union(a, b);
    }
    dsu.merge_map()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_find_basics() {
        let mut dsu = DisjointSet::new();
        dsu.union(SegId(1), SegId(2));
        dsu.union(SegId(3), SegId(4));
        assert!(dsu.same_set(SegId(1), SegId(2)));
        assert!(!dsu.same_set(SegId(2), SegId(3)));
        dsu.union(SegId(2), SegId(3));
        assert!(dsu.same_set(SegId(1), SegId(4)));
    }

    #[test]
    fn untracked_ids_are_self_roots() {
        let mut dsu = DisjointSet::new();
        assert_eq!(dsu.find(SegId(42)), SegId(42));
        assert!(!dsu.contains(SegId(42)));
    }

    #[test]
    fn merge_map_picks_min_representative() {
        let map = merge_map_from_edges([
            (SegId(7), SegId(3)),
            (SegId(3), SegId(9)),
            (SegId(12), SegId(11)),
        ]);
        assert_eq!(map.get(SegId(7)), Some(SegId(3)));
        assert_eq!(map.get(SegId(9)), Some(SegId(3)));
        assert_eq!(map.get(SegId(3)), Some(SegId(3)));
        assert_eq!(map.get(SegId(12)), Some(SegId(11)));
    }

    #[test]
    fn merge_map_is_order_independent() {
        let forward = merge_map_from_edges([(SegId(1), SegId(5)), (SegId(5), SegId(3))]);
        let backward = merge_map_from_edges([(SegId(5), SegId(3)), (SegId(1), SegId(5))]);
        for id in [1u64, 3, 5] {
            assert_eq!(forward.get(SegId(id)), backward.get(SegId(id)));
            assert_eq!(forward.get(SegId(id)), Some(SegId(1)));
        }
    }

    #[test]
    fn components_are_sorted_and_deterministic() {
        let mut dsu = DisjointSet::new();
        dsu.union(SegId(9), SegId(2));
        dsu.union(SegId(4), SegId(6));
        dsu.insert(SegId(1));
        let components = dsu.components();
        assert_eq!(
            components,
            vec![
                vec![SegId(1)],
                vec![SegId(2), SegId(9)],
                vec![SegId(4), SegId(6)],
            ]
        );
    }
}

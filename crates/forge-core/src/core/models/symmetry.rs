use super::ids::VertexId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A group of vertices that are equivalent for enumeration purposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymmetricSet(BTreeSet<VertexId>);

impl SymmetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, vertex: VertexId) -> bool {
        self.0.insert(vertex)
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        self.0.contains(&vertex)
    }

    pub fn overlaps(&self, other: &SymmetricSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    pub fn merge(&mut self, other: SymmetricSet) {
        self.0.extend(other.0);
    }

    pub fn remove(&mut self, vertex: VertexId) -> bool {
        self.0.remove(&vertex)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<VertexId> for SymmetricSet {
    fn from_iter<T: IntoIterator<Item = VertexId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Adds `set` to `sets`, merging every existing set it overlaps so that the
/// collection stays pairwise disjoint.
pub fn register(sets: &mut Vec<SymmetricSet>, mut set: SymmetricSet) {
    let mut i = 0;
    while i < sets.len() {
        if sets[i].overlaps(&set) {
            set.merge(sets.swap_remove(i));
        } else {
            i += 1;
        }
    }
    sets.push(set);
}

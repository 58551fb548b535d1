use super::ids::VertexId;
use crate::core::chem::bond::BondType;
use serde::{Deserialize, Serialize};

/// An intended ring closure. The first and last vertices are ring-closing
/// attractors; the ones in between form the tree path joining them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ring {
    pub vertices: Vec<VertexId>,
    #[serde(default)]
    pub bond_type: BondType,
}

impl Ring {
    pub fn new(vertices: Vec<VertexId>, bond_type: BondType) -> Self {
        Self {
            vertices,
            bond_type,
        }
    }

    pub fn head(&self) -> Option<VertexId> {
        self.vertices.first().copied()
    }

    pub fn tail(&self) -> Option<VertexId> {
        self.vertices.last().copied()
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        self.vertices.contains(&vertex)
    }

    /// Unordered pair of closing vertices, used to compare ring sets.
    pub fn closing_pair(&self) -> Option<(VertexId, VertexId)> {
        let (h, t) = (self.head()?, self.tail()?);
        Some(if h <= t { (h, t) } else { (t, h) })
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

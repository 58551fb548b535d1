use super::attachment_point::ApRef;
use super::ids::VertexId;
use crate::core::chem::bond::BondType;
use serde::{Deserialize, Serialize};

/// A bond between two attachment points. `src` is on the parent side of the
/// spanning tree, `trg` on the child side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub src: ApRef,
    pub trg: ApRef,
    #[serde(default)]
    pub bond_type: BondType,
}

impl Edge {
    pub fn new(src: ApRef, trg: ApRef, bond_type: BondType) -> Self {
        Self {
            src,
            trg,
            bond_type,
        }
    }

    pub fn touches(&self, vertex: VertexId) -> bool {
        self.src.vertex == vertex || self.trg.vertex == vertex
    }

    pub fn uses(&self, ap: ApRef) -> bool {
        self.src == ap || self.trg == ap
    }

    pub fn other_end(&self, vertex: VertexId) -> Option<VertexId> {
        if self.src.vertex == vertex {
            Some(self.trg.vertex)
        } else if self.trg.vertex == vertex {
            Some(self.src.vertex)
        } else {
            None
        }
    }
}

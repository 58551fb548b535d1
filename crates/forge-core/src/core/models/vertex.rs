use super::attachment_point::AttachmentPoint;
use super::ids::VertexId;
use crate::core::chem::structure::ChemicalStructure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildingBlockType {
    Scaffold,
    #[default]
    Fragment,
    Cap,
    RingClosingAttractor,
    /// The slot is left as it is; nothing is attached.
    Undefined,
    /// The slot is explicitly left empty.
    None,
}

impl BuildingBlockType {
    /// Whether a combination entry of this type results in an attachment.
    pub fn attaches(&self) -> bool {
        !matches!(self, Self::Undefined | Self::None)
    }
}

impl fmt::Display for BuildingBlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scaffold => "scaffold",
            Self::Fragment => "fragment",
            Self::Cap => "cap",
            Self::RingClosingAttractor => "ring-closing-attractor",
            Self::Undefined => "undefined",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// A building block instance placed in a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub bb_type: BuildingBlockType,
    /// Index of the building block in its library, when it came from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_index: Option<usize>,
    pub aps: Vec<AttachmentPoint>,
    /// Groups of AP indices that are equivalent by symmetry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symmetric_aps: Vec<BTreeSet<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substructure: Option<ChemicalStructure>,
}

impl Vertex {
    pub fn new(id: VertexId, bb_type: BuildingBlockType) -> Self {
        Self {
            id,
            bb_type,
            library_index: None,
            aps: Vec::new(),
            symmetric_aps: Vec::new(),
            substructure: None,
        }
    }

    /// Renumbers the vertex and the owner of each of its APs.
    pub fn set_id(&mut self, id: VertexId) {
        self.id = id;
        for ap in &mut self.aps {
            ap.owner = id;
        }
    }

    pub fn ap(&self, index: usize) -> Option<&AttachmentPoint> {
        self.aps.get(index)
    }

    pub fn ap_mut(&mut self, index: usize) -> Option<&mut AttachmentPoint> {
        self.aps.get_mut(index)
    }

    pub fn free_aps(&self) -> impl Iterator<Item = &AttachmentPoint> {
        self.aps.iter().filter(|ap| ap.is_free())
    }

    /// Index of the symmetry group the AP belongs to, if any.
    pub fn symmetry_group_of(&self, ap: usize) -> Option<usize> {
        self.symmetric_aps.iter().position(|set| set.contains(&ap))
    }

    pub fn is_ring_closing(&self) -> bool {
        self.bb_type == BuildingBlockType::RingClosingAttractor
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.substructure
            .as_ref()
            .map_or(0, ChemicalStructure::heavy_atom_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::attachment_point::ApClass;

    #[test]
    fn set_id_updates_ap_owners() {
        let mut v = Vertex::new(VertexId(0), BuildingBlockType::Fragment);
        v.aps.push(AttachmentPoint::new(VertexId(0), 0, Some(ApClass::new("a", 0))));
        v.aps.push(AttachmentPoint::new(VertexId(0), 1, None));
        v.set_id(VertexId(7));
        assert!(v.aps.iter().all(|ap| ap.owner == VertexId(7)));
    }

    #[test]
    fn symmetry_group_lookup() {
        let mut v = Vertex::new(VertexId(1), BuildingBlockType::Scaffold);
        for i in 0..3 {
            v.aps.push(AttachmentPoint::new(VertexId(1), i, None));
        }
        v.symmetric_aps.push([0, 2].into_iter().collect());
        assert_eq!(v.symmetry_group_of(2), Some(0));
        assert_eq!(v.symmetry_group_of(1), None);
    }

    #[test]
    fn undefined_and_none_do_not_attach() {
        assert!(!BuildingBlockType::None.attaches());
        assert!(!BuildingBlockType::Undefined.attaches());
        assert!(BuildingBlockType::Cap.attaches());
    }
}

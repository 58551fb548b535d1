use crate::core::chem::bond::BondType;
use crate::core::models::attachment_point::ApClass;
use crate::core::models::vertex::{BuildingBlockType, Vertex};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Represents errors that can occur while loading or querying a fragment space.
#[derive(Debug, Error)]
pub enum FragSpaceError {
    /// The fragment-space file could not be read.
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    /// The fragment-space file is not valid TOML or has an unexpected shape.
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    /// A bond or attachment point references an atom that does not exist.
    #[error("Building block '{block}' references non-existent atom {index}")]
    InvalidAtomIndex { block: String, index: usize },
    /// A symmetric AP group references an attachment point that does not exist.
    #[error("Building block '{block}' references non-existent attachment point {index}")]
    InvalidApIndex { block: String, index: usize },
    /// Ring-closing attractors must carry exactly one AP and a pseudo-atom.
    #[error("Ring-closing attractor '{0}' must have one attachment point and an ATP/ATM atom")]
    InvalidRingClosingAttractor(String),
    /// The capping map names a class that no capping group offers.
    #[error("No capping group offers an attachment point of class '{0}'")]
    UnknownCapClass(ApClass),
    #[error("No {bb_type} with index {index} in the library")]
    UnknownBuildingBlock {
        bb_type: BuildingBlockType,
        index: usize,
    },
}

/// A named library entry. The template vertex carries id 0 and is renumbered
/// when it is placed in a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingBlock {
    pub name: String,
    pub vertex: Vertex,
}

/// One way of attaching a library building block through one of its APs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentChoice {
    pub bb_type: BuildingBlockType,
    pub library_index: usize,
    pub ap: usize,
}

/// Class-level rules of a fragment space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompatibilityRules {
    pub compatibility: HashMap<ApClass, Vec<ApClass>>,
    pub capping: HashMap<ApClass, ApClass>,
    pub bond_types: HashMap<String, BondType>,
    pub forbidden_ends: HashSet<ApClass>,
    pub ring_closures: HashMap<ApClass, Vec<ApClass>>,
}

/// The read-only space of building blocks and the rules for combining them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FragmentSpace {
    scaffolds: Vec<BuildingBlock>,
    fragments: Vec<BuildingBlock>,
    caps: Vec<BuildingBlock>,
    rules: CompatibilityRules,
}

impl FragmentSpace {
    pub fn from_parts(
        scaffolds: Vec<BuildingBlock>,
        fragments: Vec<BuildingBlock>,
        caps: Vec<BuildingBlock>,
        rules: CompatibilityRules,
    ) -> Result<Self, FragSpaceError> {
        let space = Self {
            scaffolds,
            fragments,
            caps,
            rules,
        };
        for cap_class in space.rules.capping.values() {
            if space.find_cap(cap_class).is_none() {
                return Err(FragSpaceError::UnknownCapClass(cap_class.clone()));
            }
        }
        Ok(space)
    }

    pub fn rules(&self) -> &CompatibilityRules {
        &self.rules
    }

    /// Library holding building blocks of the given type. Ring-closing
    /// attractors live in the fragment library.
    pub fn library(&self, bb_type: BuildingBlockType) -> &[BuildingBlock] {
        match bb_type {
            BuildingBlockType::Scaffold => &self.scaffolds,
            BuildingBlockType::Fragment | BuildingBlockType::RingClosingAttractor => &self.fragments,
            BuildingBlockType::Cap => &self.caps,
            BuildingBlockType::Undefined | BuildingBlockType::None => &[],
        }
    }

    /// Instantiates a fresh copy of a library building block.
    pub fn new_vertex(&self, bb_type: BuildingBlockType, index: usize) -> Result<Vertex, FragSpaceError> {
        let block = self
            .library(bb_type)
            .get(index)
            .ok_or(FragSpaceError::UnknownBuildingBlock { bb_type, index })?;
        let mut vertex = block.vertex.clone();
        vertex.library_index = Some(index);
        Ok(vertex)
    }

    pub fn compatible_classes(&self, class: &ApClass) -> &[ApClass] {
        self.rules
            .compatibility
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_compatible(&self, src: &ApClass, trg: &ApClass) -> bool {
        self.compatible_classes(src).contains(trg)
    }

    /// Every fragment AP that may bond to an AP of class `src`.
    pub fn compatible_fragments(&self, src: &ApClass) -> Vec<FragmentChoice> {
        let targets = self.compatible_classes(src);
        let mut choices = Vec::new();
        for (library_index, block) in self.fragments.iter().enumerate() {
            for ap in &block.vertex.aps {
                if ap.class.as_ref().is_some_and(|c| targets.contains(c)) {
                    choices.push(FragmentChoice {
                        bb_type: block.vertex.bb_type,
                        library_index,
                        ap: ap.index,
                    });
                }
            }
        }
        choices
    }

    pub fn bond_type_for(&self, class: &ApClass) -> BondType {
        self.rules
            .bond_types
            .get(&class.rule)
            .copied()
            .unwrap_or_default()
    }

    pub fn capping_class(&self, class: &ApClass) -> Option<&ApClass> {
        self.rules.capping.get(class)
    }

    pub fn requires_cap(&self, class: &ApClass) -> bool {
        self.rules.capping.contains_key(class)
    }

    fn find_cap(&self, cap_class: &ApClass) -> Option<FragmentChoice> {
        self.caps.iter().enumerate().find_map(|(library_index, block)| {
            block
                .vertex
                .aps
                .iter()
                .find(|ap| ap.class.as_ref() == Some(cap_class))
                .map(|ap| FragmentChoice {
                    bb_type: BuildingBlockType::Cap,
                    library_index,
                    ap: ap.index,
                })
        })
    }

    /// The capping group that saturates an AP of class `class`.
    pub fn cap_choice(&self, class: &ApClass) -> Option<FragmentChoice> {
        self.find_cap(self.capping_class(class)?)
    }

    /// A fresh capping vertex for an AP of class `class`, with the AP to
    /// attach through and the bond type to use.
    pub fn cap_for(&self, class: &ApClass) -> Option<(Vertex, usize, BondType)> {
        let choice = self.cap_choice(class)?;
        let vertex = self.new_vertex(BuildingBlockType::Cap, choice.library_index).ok()?;
        Some((vertex, choice.ap, self.bond_type_for(class)))
    }

    pub fn is_forbidden_end(&self, class: &ApClass) -> bool {
        self.rules.forbidden_ends.contains(class)
    }

    /// Whether a ring may be closed between attractors sitting on APs of
    /// classes `a` and `b`.
    pub fn ring_closure_compatible(&self, a: &ApClass, b: &ApClass) -> bool {
        let listed = |x: &ApClass, y: &ApClass| {
            self.rules
                .ring_closures
                .get(x)
                .is_some_and(|v| v.contains(y))
        };
        listed(a, b) || listed(b, a)
    }

    pub fn has_ring_closures(&self) -> bool {
        !self.rules.ring_closures.is_empty()
            && self
                .fragments
                .iter()
                .any(|b| b.vertex.bb_type == BuildingBlockType::RingClosingAttractor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::attachment_point::AttachmentPoint;
    use crate::core::models::ids::VertexId;

    fn block(name: &str, bb_type: BuildingBlockType, classes: &[&str]) -> BuildingBlock {
        let mut vertex = Vertex::new(VertexId(0), bb_type);
        for (i, c) in classes.iter().enumerate() {
            vertex
                .aps
                .push(AttachmentPoint::new(VertexId(0), i, Some(c.parse().unwrap())));
        }
        BuildingBlock {
            name: name.to_string(),
            vertex,
        }
    }

    fn class(s: &str) -> ApClass {
        s.parse().unwrap()
    }

    fn space() -> FragmentSpace {
        let mut rules = CompatibilityRules::default();
        rules
            .compatibility
            .insert(class("a:0"), vec![class("a:1"), class("b:1")]);
        rules.capping.insert(class("a:0"), class("h:0"));
        rules.bond_types.insert("b".into(), BondType::Double);
        rules
            .ring_closures
            .insert(class("b:0"), vec![class("a:0")]);
        FragmentSpace::from_parts(
            vec![block("s", BuildingBlockType::Scaffold, &["a:0", "a:0"])],
            vec![
                block("f0", BuildingBlockType::Fragment, &["a:1", "b:1", "x:0"]),
                block("f1", BuildingBlockType::Fragment, &["b:1"]),
            ],
            vec![block("h", BuildingBlockType::Cap, &["h:0"])],
            rules,
        )
        .unwrap()
    }

    #[test]
    fn compatible_fragments_list_every_matching_ap() {
        let choices = space().compatible_fragments(&class("a:0"));
        let pairs: Vec<(usize, usize)> = choices.iter().map(|c| (c.library_index, c.ap)).collect();
        assert_eq!(pairs, vec![(0, 0), (0, 1), (1, 0)]);
        assert!(space().compatible_fragments(&class("z:0")).is_empty());
    }

    #[test]
    fn capping_resolves_to_a_fresh_cap_vertex() {
        let s = space();
        assert!(s.requires_cap(&class("a:0")));
        let (cap, ap, bond) = s.cap_for(&class("a:0")).unwrap();
        assert_eq!(cap.bb_type, BuildingBlockType::Cap);
        assert_eq!(cap.library_index, Some(0));
        assert_eq!(ap, 0);
        assert_eq!(bond, BondType::Single);
        assert!(s.cap_for(&class("b:1")).is_none());
    }

    #[test]
    fn missing_cap_class_is_rejected() {
        let mut rules = CompatibilityRules::default();
        rules.capping.insert(class("a:0"), class("nothing:0"));
        let err = FragmentSpace::from_parts(vec![], vec![], vec![], rules).unwrap_err();
        assert!(matches!(err, FragSpaceError::UnknownCapClass(_)));
    }

    #[test]
    fn ring_closure_compatibility_is_symmetric() {
        let s = space();
        assert!(s.ring_closure_compatible(&class("a:0"), &class("b:0")));
        assert!(s.ring_closure_compatible(&class("b:0"), &class("a:0")));
        assert!(!s.ring_closure_compatible(&class("a:0"), &class("a:0")));
        assert_eq!(s.bond_type_for(&class("b:7")), BondType::Double);
    }

    #[test]
    fn unknown_library_index_is_an_error() {
        assert!(matches!(
            space().new_vertex(BuildingBlockType::Fragment, 5),
            Err(FragSpaceError::UnknownBuildingBlock { index: 5, .. })
        ));
    }
}

use super::space::{BuildingBlock, CompatibilityRules, FragSpaceError, FragmentSpace};
use crate::core::chem::bond::BondType;
use crate::core::chem::element;
use crate::core::chem::structure::{Atom, ChemicalStructure};
use crate::core::models::attachment_point::{ApClass, AttachmentPoint};
use crate::core::models::ids::VertexId;
use crate::core::models::vertex::{BuildingBlockType, Vertex};
use nalgebra::Point3;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Deserialized shape of a fragment-space TOML document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawFragmentSpace {
    #[serde(default)]
    scaffolds: Vec<RawBuildingBlock>,
    #[serde(default)]
    fragments: Vec<RawBuildingBlock>,
    #[serde(default)]
    capping_groups: Vec<RawBuildingBlock>,
    /// Source AP class to the classes it may bond to.
    #[serde(default)]
    compatibility: BTreeMap<ApClass, Vec<ApClass>>,
    /// AP class to the class of the capping group that saturates it.
    #[serde(default)]
    capping: BTreeMap<ApClass, ApClass>,
    /// Bond type formed through APs of a given rule.
    #[serde(default)]
    bond_types: BTreeMap<String, BondType>,
    #[serde(default)]
    forbidden_ends: Vec<ApClass>,
    /// Parent AP classes between which a ring may be closed.
    #[serde(default)]
    ring_closures: BTreeMap<ApClass, Vec<ApClass>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawBuildingBlock {
    #[serde(default)]
    name: Option<String>,
    atoms: Vec<RawAtom>,
    #[serde(default)]
    bonds: Vec<RawBond>,
    #[serde(default)]
    attachment_points: Vec<RawAttachmentPoint>,
    #[serde(default)]
    symmetric_aps: Vec<Vec<usize>>,
    #[serde(default)]
    ring_closing: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAtom {
    element: String,
    position: [f64; 3],
    #[serde(default)]
    charge: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBond {
    atoms: [usize; 2],
    #[serde(default)]
    order: BondType,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAttachmentPoint {
    atom: usize,
    #[serde(default)]
    class: Option<ApClass>,
    #[serde(default)]
    direction: Option<[f64; 3]>,
}

impl FragmentSpace {
    /// Loads a fragment space from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FragSpaceError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| FragSpaceError::Io {
            path: path_str.clone(),
            source: e,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            FragSpaceError::Toml { source, .. } => FragSpaceError::Toml {
                path: path_str,
                source,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, FragSpaceError> {
        let raw: RawFragmentSpace = toml::from_str(content).map_err(|e| FragSpaceError::Toml {
            path: "<string>".to_string(),
            source: e,
        })?;

        let scaffolds = convert_library(raw.scaffolds, BuildingBlockType::Scaffold, "scaffold")?;
        let fragments = convert_library(raw.fragments, BuildingBlockType::Fragment, "fragment")?;
        let caps = convert_library(raw.capping_groups, BuildingBlockType::Cap, "cap")?;

        let rules = CompatibilityRules {
            compatibility: raw.compatibility.into_iter().collect(),
            capping: raw.capping.into_iter().collect(),
            bond_types: raw.bond_types.into_iter().collect(),
            forbidden_ends: raw.forbidden_ends.into_iter().collect(),
            ring_closures: raw.ring_closures.into_iter().collect(),
        };
        FragmentSpace::from_parts(scaffolds, fragments, caps, rules)
    }
}

fn convert_library(
    raw: Vec<RawBuildingBlock>,
    bb_type: BuildingBlockType,
    prefix: &str,
) -> Result<Vec<BuildingBlock>, FragSpaceError> {
    raw.into_iter()
        .enumerate()
        .map(|(i, block)| {
            let name = block.name.clone().unwrap_or_else(|| format!("{prefix}-{i}"));
            convert_block(block, bb_type, name)
        })
        .collect()
}

fn convert_block(
    raw: RawBuildingBlock,
    default_type: BuildingBlockType,
    name: String,
) -> Result<BuildingBlock, FragSpaceError> {
    let bb_type = if raw.ring_closing {
        BuildingBlockType::RingClosingAttractor
    } else {
        default_type
    };

    let mut structure = ChemicalStructure::new(&name);
    for atom in &raw.atoms {
        let [x, y, z] = atom.position;
        let mut a = Atom::new(atom.element.trim(), Point3::new(x, y, z));
        a.partial_charge = atom.charge;
        structure.add_atom(a);
    }
    let n_atoms = structure.atom_count();
    let bad_index = |index: usize| FragSpaceError::InvalidAtomIndex {
        block: name.clone(),
        index,
    };

    for bond in &raw.bonds {
        let [a, b] = bond.atoms;
        structure
            .add_bond(a, b, bond.order)
            .ok_or_else(|| bad_index(if a >= n_atoms { a } else { b }))?;
    }

    let mut vertex = Vertex::new(VertexId(0), bb_type);
    for (index, ap) in raw.attachment_points.iter().enumerate() {
        if ap.atom >= n_atoms {
            return Err(bad_index(ap.atom));
        }
        let mut point = AttachmentPoint::new(VertexId(0), index, ap.class.clone());
        point.source_atom = Some(ap.atom);
        point.direction = ap.direction;
        vertex.aps.push(point);
    }
    for group in raw.symmetric_aps {
        let set: BTreeSet<usize> = group.into_iter().collect();
        if let Some(&bad) = set.iter().find(|&&i| i >= vertex.aps.len()) {
            return Err(FragSpaceError::InvalidApIndex { block: name, index: bad });
        }
        if set.len() > 1 {
            vertex.symmetric_aps.push(set);
        }
    }

    if bb_type == BuildingBlockType::RingClosingAttractor
        && (vertex.aps.len() != 1
            || !structure
                .atoms()
                .iter()
                .any(|a| element::is_ring_closure_pseudo_atom(&a.symbol)))
    {
        return Err(FragSpaceError::InvalidRingClosingAttractor(name));
    }

    vertex.substructure = Some(structure);
    Ok(BuildingBlock { name, vertex })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACE: &str = r#"
forbidden-ends = ["hyd:0"]

[[scaffolds]]
name = "ethane"
atoms = [
  { element = "C", position = [0.0, 0.0, 0.0] },
  { element = "C", position = [1.54, 0.0, 0.0] },
]
bonds = [{ atoms = [0, 1] }]
attachment-points = [
  { atom = 0, class = "c:0", direction = [-1.0, 0.0, 0.0] },
  { atom = 1, class = "c:0", direction = [2.54, 0.0, 0.0] },
]
symmetric-aps = [[0, 1]]

[[fragments]]
name = "rca"
ring-closing = true
atoms = [{ element = "ATP", position = [0.0, 0.0, 0.0] }]
attachment-points = [{ atom = 0, class = "rca:0" }]

[[capping-groups]]
atoms = [{ element = "H", position = [0.0, 0.0, 0.0] }]
attachment-points = [{ atom = 0, class = "hyd:1" }]

[compatibility]
"c:0" = ["rca:0"]

[capping]
"c:0" = "hyd:1"

[bond-types]
c = "single"
"#;

    #[test]
    fn parses_libraries_and_rules() {
        let space = FragmentSpace::from_toml_str(SPACE).unwrap();
        assert_eq!(space.library(BuildingBlockType::Scaffold).len(), 1);
        assert_eq!(space.library(BuildingBlockType::Cap)[0].name, "cap-0");
        let scaffold = &space.library(BuildingBlockType::Scaffold)[0].vertex;
        assert_eq!(scaffold.aps.len(), 2);
        assert_eq!(scaffold.symmetric_aps.len(), 1);
        let rca = &space.library(BuildingBlockType::Fragment)[0].vertex;
        assert_eq!(rca.bb_type, BuildingBlockType::RingClosingAttractor);
        assert!(space.is_forbidden_end(&"hyd:0".parse().unwrap()));
    }

    #[test]
    fn rejects_out_of_range_attachment_atoms() {
        let broken = SPACE.replace("{ atom = 1, class = \"c:0\"", "{ atom = 7, class = \"c:0\"");
        assert!(matches!(
            FragmentSpace::from_toml_str(&broken),
            Err(FragSpaceError::InvalidAtomIndex { index: 7, .. })
        ));
    }

    #[test]
    fn rejects_unknown_keys() {
        let broken = format!("{SPACE}\nunexpected = 1\n");
        assert!(matches!(
            FragmentSpace::from_toml_str(&broken),
            Err(FragSpaceError::Toml { .. })
        ));
    }

    #[test]
    fn load_reports_the_path() {
        let err = FragmentSpace::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}

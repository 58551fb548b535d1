use crate::core::chem::element::{self, element_data};
use crate::core::chem::structure::ChemicalStructure;
use phf::{Map, phf_map};
use std::fmt;

/// What a descriptor describes, which decides how its value is extracted
/// and whether a pattern is needed to select atoms or bonds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Molecular,
    Atomic,
    Bond,
    Pair,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Molecular => "molecular",
            Self::Atomic => "atomic",
            Self::Bond => "bond",
            Self::Pair => "atom-pair",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorResult {
    Double(f64),
    Integer(i64),
    DoubleArray(Vec<f64>),
    IntegerArray(Vec<i64>),
}

impl DescriptorResult {
    /// Scalar value of the result. Array results take the entry at `index`
    /// (the first one by default).
    pub fn as_scalar(&self, index: Option<usize>) -> Option<f64> {
        let i = index.unwrap_or(0);
        match self {
            Self::Double(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::DoubleArray(values) => values.get(i).copied(),
            Self::IntegerArray(values) => values.get(i).map(|&v| v as f64),
        }
    }
}

/// A computable chemical descriptor. Only the method matching the
/// descriptor's kind is expected to produce a value.
pub trait Descriptor: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> DescriptorKind;

    fn molecular(&self, _structure: &ChemicalStructure) -> Option<DescriptorResult> {
        None
    }

    fn atomic(&self, _structure: &ChemicalStructure, _atom: usize) -> Option<DescriptorResult> {
        None
    }

    fn bond(&self, _structure: &ChemicalStructure, _atom1: usize, _atom2: usize) -> Option<DescriptorResult> {
        None
    }
}

/// Element order of the `elementCounts` array.
pub const ELEMENT_COUNT_ORDER: [&str; 10] = ["C", "H", "N", "O", "S", "P", "F", "Cl", "Br", "I"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    AtomCount,
    HeavyAtomCount,
    BondCount,
    MolecularWeight,
    RingCount,
    ElementCounts,
    AtomicNumber,
    PartialCharge,
    AtomDegree,
    BondOrder,
    BondLength,
    AtomDistance,
}

static BUILTINS: Map<&'static str, Builtin> = phf_map! {
    "nAtoms" => Builtin::AtomCount,
    "nHeavyAtoms" => Builtin::HeavyAtomCount,
    "nBonds" => Builtin::BondCount,
    "MW" => Builtin::MolecularWeight,
    "nRings" => Builtin::RingCount,
    "elementCounts" => Builtin::ElementCounts,
    "atomicNumber" => Builtin::AtomicNumber,
    "partialCharge" => Builtin::PartialCharge,
    "atomDegree" => Builtin::AtomDegree,
    "bondOrder" => Builtin::BondOrder,
    "bondLength" => Builtin::BondLength,
    "atomDistance" => Builtin::AtomDistance,
};

/// One of the descriptors shipped with the library.
#[derive(Debug, Clone)]
pub struct BuiltinDescriptor {
    name: &'static str,
    which: Builtin,
}

/// Looks up a built-in descriptor by its short name.
pub fn builtin(name: &str) -> Option<BuiltinDescriptor> {
    BUILTINS.get_entry(name).map(|(k, v)| BuiltinDescriptor {
        name: *k,
        which: *v,
    })
}

pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.keys().copied()
}

impl Descriptor for BuiltinDescriptor {
    fn name(&self) -> &str {
        self.name
    }

    fn kind(&self) -> DescriptorKind {
        match self.which {
            Builtin::AtomCount
            | Builtin::HeavyAtomCount
            | Builtin::BondCount
            | Builtin::MolecularWeight
            | Builtin::RingCount
            | Builtin::ElementCounts => DescriptorKind::Molecular,
            Builtin::AtomicNumber | Builtin::PartialCharge | Builtin::AtomDegree => DescriptorKind::Atomic,
            Builtin::BondOrder | Builtin::BondLength => DescriptorKind::Bond,
            Builtin::AtomDistance => DescriptorKind::Pair,
        }
    }

    fn molecular(&self, s: &ChemicalStructure) -> Option<DescriptorResult> {
        let real = s.atoms().iter().filter(|a| element::is_real_atom(&a.symbol));
        Some(match self.which {
            Builtin::AtomCount => DescriptorResult::Integer(real.count() as i64),
            Builtin::HeavyAtomCount => DescriptorResult::Integer(s.heavy_atom_count() as i64),
            Builtin::BondCount => DescriptorResult::Integer(s.bond_count() as i64),
            Builtin::MolecularWeight => DescriptorResult::Double(s.molecular_weight()),
            Builtin::RingCount => DescriptorResult::Integer(s.cycle_count() as i64),
            Builtin::ElementCounts => {
                let mut counts = vec![0i64; ELEMENT_COUNT_ORDER.len()];
                for atom in real {
                    if let Some(i) = ELEMENT_COUNT_ORDER.iter().position(|e| *e == atom.symbol) {
                        counts[i] += 1;
                    }
                }
                DescriptorResult::IntegerArray(counts)
            }
            _ => return None,
        })
    }

    fn atomic(&self, s: &ChemicalStructure, atom: usize) -> Option<DescriptorResult> {
        let a = s.atom(atom)?;
        match self.which {
            Builtin::AtomicNumber => {
                element_data(&a.symbol).map(|d| DescriptorResult::Integer(d.atomic_number as i64))
            }
            Builtin::PartialCharge => Some(DescriptorResult::Double(a.partial_charge)),
            Builtin::AtomDegree => Some(DescriptorResult::Integer(s.neighbors(atom).len() as i64)),
            _ => None,
        }
    }

    fn bond(&self, s: &ChemicalStructure, atom1: usize, atom2: usize) -> Option<DescriptorResult> {
        let bond = s.bond_between(atom1, atom2)?;
        match self.which {
            Builtin::BondOrder => Some(DescriptorResult::Integer(bond.bond_type.valence() as i64)),
            Builtin::BondLength => s.distance(atom1, atom2).map(DescriptorResult::Double),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::bond::BondType;
    use crate::core::chem::structure::Atom;
    use nalgebra::Point3;

    fn methanol() -> ChemicalStructure {
        let mut s = ChemicalStructure::new("methanol");
        s.add_atom(Atom::new("C", Point3::origin()));
        s.add_atom(Atom::new("O", Point3::new(1.43, 0.0, 0.0)));
        s.add_atom(Atom::new("H", Point3::new(1.8, 0.9, 0.0)));
        s.add_bond(0, 1, BondType::Single);
        s.add_bond(1, 2, BondType::Single);
        s
    }

    #[test]
    fn builtin_lookup_and_kinds() {
        assert_eq!(builtin("MW").unwrap().kind(), DescriptorKind::Molecular);
        assert_eq!(builtin("bondLength").unwrap().kind(), DescriptorKind::Bond);
        assert_eq!(builtin("atomDistance").unwrap().kind(), DescriptorKind::Pair);
        assert!(builtin("logP").is_none());
        assert_eq!(builtin_names().count(), 12);
    }

    #[test]
    fn molecular_descriptors() {
        let s = methanol();
        let get = |n: &str| builtin(n).unwrap().molecular(&s).unwrap();
        assert_eq!(get("nAtoms"), DescriptorResult::Integer(3));
        assert_eq!(get("nHeavyAtoms"), DescriptorResult::Integer(2));
        assert_eq!(get("nRings"), DescriptorResult::Integer(0));
        assert_eq!(get("elementCounts").as_scalar(Some(3)), Some(1.0));
    }

    #[test]
    fn atomic_and_bond_descriptors() {
        let s = methanol();
        let z = builtin("atomicNumber").unwrap().atomic(&s, 1).unwrap();
        assert_eq!(z.as_scalar(None), Some(8.0));
        let degree = builtin("atomDegree").unwrap().atomic(&s, 1).unwrap();
        assert_eq!(degree, DescriptorResult::Integer(2));
        let length = builtin("bondLength").unwrap().bond(&s, 0, 1).unwrap();
        assert!((length.as_scalar(None).unwrap() - 1.43).abs() < 1e-9);
        assert!(builtin("bondOrder").unwrap().bond(&s, 0, 2).is_none());
    }
}

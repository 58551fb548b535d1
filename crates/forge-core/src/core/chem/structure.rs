use super::bond::BondType;
use super::element::{self, element_data};
use crate::core::models::ids::VertexId;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Element symbol, or a pseudo-atom symbol (`Du`, `ATP`, `ATM`).
    pub symbol: String,
    pub position: Point3<f64>,
    #[serde(default)]
    pub partial_charge: f64,
    /// Vertex of the graph this atom was contributed by, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertex_id: Option<VertexId>,
}

impl Atom {
    pub fn new(symbol: &str, position: Point3<f64>) -> Self {
        Self {
            symbol: symbol.to_string(),
            position,
            partial_charge: 0.0,
            vertex_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub atom1: usize,
    pub atom2: usize,
    pub bond_type: BondType,
}

impl Bond {
    pub fn new(atom1: usize, atom2: usize, bond_type: BondType) -> Self {
        Self {
            atom1,
            atom2,
            bond_type,
        }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atom1 == atom || self.atom2 == atom
    }

    pub fn partner(&self, atom: usize) -> Option<usize> {
        if self.atom1 == atom {
            Some(self.atom2)
        } else if self.atom2 == atom {
            Some(self.atom1)
        } else {
            None
        }
    }
}

/// A concrete chemical structure: atoms with coordinates, bonds, and a set of
/// free-text properties (the data items of an SD file).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChemicalStructure {
    pub title: String,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl ChemicalStructure {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    /// Adds a bond between two existing atoms. Adding an existing bond is a
    /// no-op that still succeeds; unknown atoms and self-bonds yield `None`.
    pub fn add_bond(&mut self, atom1: usize, atom2: usize, bond_type: BondType) -> Option<()> {
        if atom1 >= self.atoms.len() || atom2 >= self.atoms.len() || atom1 == atom2 {
            return None;
        }
        if self.bond_between(atom1, atom2).is_some() {
            return Some(());
        }
        self.bonds.push(Bond::new(atom1, atom2, bond_type));
        Some(())
    }

    pub fn bond_between(&self, atom1: usize, atom2: usize) -> Option<&Bond> {
        self.bonds
            .iter()
            .find(|b| b.contains(atom1) && b.partner(atom1) == Some(atom2))
    }

    pub fn neighbors(&self, atom: usize) -> Vec<usize> {
        self.bonds.iter().filter_map(|b| b.partner(atom)).collect()
    }

    /// Sum of the bond valences around an atom.
    pub fn bond_order_sum(&self, atom: usize) -> u32 {
        self.bonds
            .iter()
            .filter(|b| b.contains(atom))
            .map(|b| b.bond_type.valence() as u32)
            .sum()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: &str, value: impl ToString) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Copies all atoms and bonds of `other` into this structure and returns
    /// the index offset applied to the copied atoms.
    pub fn append(&mut self, other: &ChemicalStructure) -> usize {
        let offset = self.atoms.len();
        self.atoms.extend(other.atoms.iter().cloned());
        self.bonds.extend(
            other
                .bonds
                .iter()
                .map(|b| Bond::new(b.atom1 + offset, b.atom2 + offset, b.bond_type)),
        );
        offset
    }

    /// Returns a copy keeping only the atoms accepted by `keep`, together with
    /// the map from old to new atom indices. Properties are preserved.
    pub fn retain_atoms<F>(&self, keep: F) -> (ChemicalStructure, HashMap<usize, usize>)
    where
        F: Fn(&Atom) -> bool,
    {
        let mut copy = ChemicalStructure {
            title: self.title.clone(),
            atoms: Vec::new(),
            bonds: Vec::new(),
            properties: self.properties.clone(),
        };
        let mut index_map = HashMap::new();
        for (old, atom) in self.atoms.iter().enumerate() {
            if keep(atom) {
                index_map.insert(old, copy.add_atom(atom.clone()));
            }
        }
        for bond in &self.bonds {
            if let (Some(&a), Some(&b)) = (index_map.get(&bond.atom1), index_map.get(&bond.atom2)) {
                copy.bonds.push(Bond::new(a, b, bond.bond_type));
            }
        }
        (copy, index_map)
    }

    pub fn without_dummy_atoms(&self) -> ChemicalStructure {
        self.retain_atoms(|a| !element::is_dummy(&a.symbol)).0
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms
            .iter()
            .filter(|a| element::is_heavy_atom(&a.symbol))
            .count()
    }

    /// Molecular weight over real atoms; unknown elements contribute nothing.
    pub fn molecular_weight(&self) -> f64 {
        self.atoms
            .iter()
            .filter(|a| element::is_real_atom(&a.symbol))
            .filter_map(|a| element_data(&a.symbol))
            .map(|d| d.mass)
            .sum()
    }

    /// Molecular formula in Hill order (C, H, then alphabetical).
    pub fn formula(&self) -> String {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for atom in self.atoms.iter().filter(|a| element::is_real_atom(&a.symbol)) {
            *counts.entry(atom.symbol.as_str()).or_default() += 1;
        }
        let mut out = String::new();
        let mut push = |symbol: &str, n: usize| {
            out.push_str(symbol);
            if n > 1 {
                out.push_str(&n.to_string());
            }
        };
        let has_carbon = counts.contains_key("C");
        if has_carbon {
            for key in ["C", "H"] {
                if let Some(n) = counts.remove(key) {
                    push(key, n);
                }
            }
        }
        for (symbol, n) in counts {
            push(symbol, n);
        }
        out
    }

    /// Number of independent cycles (bonds - atoms + connected components).
    pub fn cycle_count(&self) -> usize {
        let components = self.connected_components();
        (self.bonds.len() + components).saturating_sub(self.atoms.len())
    }

    pub fn connected_components(&self) -> usize {
        let mut parent: Vec<usize> = (0..self.atoms.len()).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for bond in &self.bonds {
            let (ra, rb) = (find(&mut parent, bond.atom1), find(&mut parent, bond.atom2));
            if ra != rb {
                parent[ra] = rb;
            }
        }
        (0..self.atoms.len())
            .filter(|&i| find(&mut parent, i) == i)
            .count()
    }

    pub fn distance(&self, atom1: usize, atom2: usize) -> Option<f64> {
        let a = self.atoms.get(atom1)?;
        let b = self.atoms.get(atom2)?;
        Some((a.position - b.position).norm())
    }

    pub fn translate(&mut self, shift: &Vector3<f64>) {
        for atom in &mut self.atoms {
            atom.position += shift;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethanol() -> ChemicalStructure {
        let mut s = ChemicalStructure::new("ethanol");
        let c1 = s.add_atom(Atom::new("C", Point3::new(0.0, 0.0, 0.0)));
        let c2 = s.add_atom(Atom::new("C", Point3::new(1.5, 0.0, 0.0)));
        let o = s.add_atom(Atom::new("O", Point3::new(2.2, 1.2, 0.0)));
        let du = s.add_atom(Atom::new("Du", Point3::new(-1.0, 0.0, 0.0)));
        s.add_bond(c1, c2, BondType::Single).unwrap();
        s.add_bond(c2, o, BondType::Single).unwrap();
        s.add_bond(c1, du, BondType::None).unwrap();
        s
    }

    #[test]
    fn add_bond_is_idempotent_and_rejects_bad_indices() {
        let mut s = ethanol();
        assert!(s.add_bond(0, 1, BondType::Single).is_some());
        assert_eq!(s.bond_count(), 3);
        assert!(s.add_bond(0, 99, BondType::Single).is_none());
        assert!(s.add_bond(1, 1, BondType::Single).is_none());
    }

    #[test]
    fn formula_and_weight_ignore_dummy_atoms() {
        let s = ethanol();
        assert_eq!(s.formula(), "C2O");
        assert_eq!(s.heavy_atom_count(), 3);
        assert!((s.molecular_weight() - (2.0 * 12.011 + 15.999)).abs() < 1e-9);
    }

    #[test]
    fn without_dummy_atoms_remaps_bonds() {
        let s = ethanol().without_dummy_atoms();
        assert_eq!(s.atom_count(), 3);
        assert_eq!(s.bond_count(), 2);
        assert!(s.bond_between(1, 2).is_some());
    }

    #[test]
    fn cycle_count_detects_rings() {
        let mut s = ChemicalStructure::new("cyclopropane");
        for i in 0..3 {
            s.add_atom(Atom::new("C", Point3::new(i as f64, 0.0, 0.0)));
        }
        s.add_bond(0, 1, BondType::Single);
        s.add_bond(1, 2, BondType::Single);
        assert_eq!(s.cycle_count(), 0);
        s.add_bond(2, 0, BondType::Single);
        assert_eq!(s.cycle_count(), 1);
        assert_eq!(s.connected_components(), 1);
    }

    #[test]
    fn properties_can_be_set_and_removed() {
        let mut s = ethanol();
        s.set_property("FITNESS", 1.5);
        assert_eq!(s.property("FITNESS"), Some("1.5"));
        assert_eq!(s.remove_property("FITNESS").as_deref(), Some("1.5"));
        assert!(s.property("FITNESS").is_none());
    }
}

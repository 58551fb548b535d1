use super::{IdentifierError, MolecularIdentifier};
use crate::core::chem::bond::BondType;
use crate::core::chem::element::{self, element_data};
use crate::core::chem::structure::ChemicalStructure;
use std::hash::{Hash, Hasher};

struct Fnv1aHasher(u64);

impl Fnv1aHasher {
    fn new() -> Self {
        Self(0xcbf29ce484222325)
    }
}

impl Hasher for Fnv1aHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }
}

const ORGANIC_SUBSET: [&str; 10] = ["B", "C", "N", "O", "P", "S", "F", "Cl", "Br", "I"];

/// Heavy-atom view of a structure: hydrogens bonded to heavy atoms become
/// implicit, dummy and attractor atoms are dropped.
struct Skeleton {
    symbols: Vec<String>,
    hydrogens: Vec<u8>,
    neighbors: Vec<Vec<(usize, BondType)>>,
}

impl Skeleton {
    fn from_structure(s: &ChemicalStructure) -> Self {
        let heavy_neighbor = |i: usize| {
            s.neighbors(i)
                .into_iter()
                .any(|n| element::is_heavy_atom(&s.atoms()[n].symbol))
        };
        let keep: Vec<bool> = s
            .atoms()
            .iter()
            .enumerate()
            .map(|(i, a)| element::is_real_atom(&a.symbol) && !(a.symbol == "H" && heavy_neighbor(i)))
            .collect();
        let mut index = vec![usize::MAX; s.atom_count()];
        let mut symbols = Vec::new();
        for (i, atom) in s.atoms().iter().enumerate() {
            if keep[i] {
                index[i] = symbols.len();
                symbols.push(atom.symbol.clone());
            }
        }
        let mut hydrogens = vec![0u8; symbols.len()];
        let mut neighbors = vec![Vec::new(); symbols.len()];
        for bond in s.bonds() {
            let (a, b) = (bond.atom1, bond.atom2);
            match (keep[a], keep[b]) {
                (true, true) => {
                    neighbors[index[a]].push((index[b], bond.bond_type));
                    neighbors[index[b]].push((index[a], bond.bond_type));
                }
                (true, false) if s.atoms()[b].symbol == "H" => hydrogens[index[a]] += 1,
                (false, true) if s.atoms()[a].symbol == "H" => hydrogens[index[b]] += 1,
                _ => {}
            }
        }
        Self {
            symbols,
            hydrogens,
            neighbors,
        }
    }

    fn len(&self) -> usize {
        self.symbols.len()
    }
}

/// Ordered so that terminal, light atoms rank first and start the SMILES.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct AtomInvariant<'a> {
    degree: usize,
    atomic_number: u8,
    hydrogens: u8,
    bond_orders: Vec<u8>,
    symbol: &'a str,
}

fn ranks_from_values<T: Ord>(values: &[T]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&a, &b| values[a].cmp(&values[b]));
    let mut ranks = vec![0usize; values.len()];
    for w in 1..indices.len() {
        ranks[indices[w]] = if values[indices[w]] == values[indices[w - 1]] {
            ranks[indices[w - 1]]
        } else {
            w
        };
    }
    ranks
}

fn count_distinct(ranks: &[usize]) -> usize {
    let mut sorted = ranks.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

/// Canonical ranks from atom invariants refined over neighbourhoods until
/// the partition stops splitting.
fn canonical_ranks(sk: &Skeleton) -> Vec<usize> {
    let invariants: Vec<AtomInvariant> = (0..sk.len())
        .map(|i| {
            let mut bond_orders: Vec<u8> = sk.neighbors[i].iter().map(|(_, b)| b.mdl_code()).collect();
            bond_orders.sort_unstable();
            AtomInvariant {
                degree: sk.neighbors[i].len(),
                atomic_number: element_data(&sk.symbols[i]).map_or(0, |d| d.atomic_number),
                hydrogens: sk.hydrogens[i],
                bond_orders,
                symbol: &sk.symbols[i],
            }
        })
        .collect();
    let mut ranks = ranks_from_values(&invariants);
    let mut distinct = count_distinct(&ranks);
    loop {
        let refined: Vec<(usize, Vec<(usize, u8)>)> = (0..sk.len())
            .map(|i| {
                let mut around: Vec<(usize, u8)> = sk.neighbors[i]
                    .iter()
                    .map(|&(n, b)| (ranks[n], b.mdl_code()))
                    .collect();
                around.sort_unstable();
                (ranks[i], around)
            })
            .collect();
        let new_ranks = ranks_from_values(&refined);
        let new_distinct = count_distinct(&new_ranks);
        if new_distinct <= distinct {
            return ranks;
        }
        ranks = new_ranks;
        distinct = new_distinct;
    }
}

fn bond_symbol(bond: BondType) -> &'static str {
    match bond {
        BondType::Double => "=",
        BondType::Triple => "#",
        _ => "",
    }
}

fn atom_symbol(sk: &Skeleton, i: usize, out: &mut String) {
    let symbol = sk.symbols[i].as_str();
    if ORGANIC_SUBSET.contains(&symbol) {
        out.push_str(symbol);
    } else {
        out.push('[');
        out.push_str(symbol);
        match sk.hydrogens[i] {
            0 => {}
            1 => out.push('H'),
            n => out.push_str(&format!("H{n}")),
        }
        out.push(']');
    }
}

fn ring_label(digit: usize) -> String {
    if digit < 10 { digit.to_string() } else { format!("%{digit}") }
}

struct Writer<'a> {
    sk: &'a Skeleton,
    ranks: &'a [usize],
    visited: Vec<bool>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<(usize, BondType)>>,
    /// Ring bonds per atom: (partner, bond, opens here).
    closures: Vec<Vec<(usize, BondType, bool)>>,
    digits: Vec<Option<usize>>,
}

impl<'a> Writer<'a> {
    fn new(sk: &'a Skeleton, ranks: &'a [usize]) -> Self {
        let n = sk.len();
        Self {
            sk,
            ranks,
            visited: vec![false; n],
            parent: vec![None; n],
            children: vec![Vec::new(); n],
            closures: vec![Vec::new(); n],
            digits: Vec::new(),
        }
    }

    fn sorted_neighbors(&self, atom: usize) -> Vec<(usize, BondType)> {
        let mut ns = self.sk.neighbors[atom].clone();
        ns.sort_by_key(|&(n, _)| (self.ranks[n], n));
        ns
    }

    /// Builds the DFS tree and finds ring-closure bonds.
    fn explore(&mut self, start: usize) {
        self.visited[start] = true;
        let mut stack = vec![(start, 0usize)];
        while let Some(&(atom, next)) = stack.last() {
            let neighbors = self.sorted_neighbors(atom);
            let Some(&(n, bond)) = neighbors.get(next) else {
                stack.pop();
                continue;
            };
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if !self.visited[n] {
                self.visited[n] = true;
                self.parent[n] = Some(atom);
                self.children[atom].push((n, bond));
                stack.push((n, 0));
            } else if self.parent[atom] != Some(n)
                && !self.closures[atom].iter().any(|&(p, _, _)| p == n)
            {
                // `n` is an ancestor still on the stack; the ring opens there.
                self.closures[n].push((atom, bond, true));
                self.closures[atom].push((n, bond, false));
            }
        }
    }

    fn write(&mut self, atom: usize, out: &mut String) {
        atom_symbol(self.sk, atom, out);
        let closures = self.closures[atom].clone();
        for (partner, bond, opens) in closures {
            if opens {
                let digit = match self.digits.iter().position(Option::is_none) {
                    Some(free) => {
                        self.digits[free] = Some(partner);
                        free + 1
                    }
                    None => {
                        self.digits.push(Some(partner));
                        self.digits.len()
                    }
                };
                out.push_str(&ring_label(digit));
            } else {
                let slot = self.digits.iter().position(|d| *d == Some(atom));
                if let Some(slot) = slot {
                    self.digits[slot] = None;
                    out.push_str(bond_symbol(bond));
                    out.push_str(&ring_label(slot + 1));
                }
            }
        }
        let children = self.children[atom].clone();
        let last = children.len().saturating_sub(1);
        for (i, (child, bond)) in children.into_iter().enumerate() {
            let branch = i < last;
            if branch {
                out.push('(');
            }
            out.push_str(bond_symbol(bond));
            self.write(child, out);
            if branch {
                out.push(')');
            }
        }
    }
}

/// SMILES and canonical keys computed from the heavy-atom graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalIdentifier;

impl MolecularIdentifier for CanonicalIdentifier {
    fn smiles(&self, structure: &ChemicalStructure) -> Result<String, IdentifierError> {
        let sk = Skeleton::from_structure(structure);
        if sk.len() == 0 {
            return Err(IdentifierError("structure has no real atoms".into()));
        }
        let ranks = canonical_ranks(&sk);
        let mut writer = Writer::new(&sk, &ranks);
        let mut parts = Vec::new();
        loop {
            let start = (0..sk.len())
                .filter(|&i| !writer.visited[i])
                .min_by_key(|&i| (ranks[i], i));
            let Some(start) = start else { break };
            writer.explore(start);
            let mut out = String::new();
            writer.write(start, &mut out);
            parts.push(out);
        }
        parts.sort();
        Ok(parts.join("."))
    }

    fn unique_key(&self, structure: &ChemicalStructure) -> Result<String, IdentifierError> {
        let sk = Skeleton::from_structure(structure);
        if sk.len() == 0 {
            return Err(IdentifierError("structure has no real atoms".into()));
        }
        let ranks = canonical_ranks(&sk);
        let mut atoms: Vec<(usize, &str, u8)> = (0..sk.len())
            .map(|i| (ranks[i], sk.symbols[i].as_str(), sk.hydrogens[i]))
            .collect();
        atoms.sort_unstable();
        let mut bonds: Vec<(usize, usize, u8)> = Vec::new();
        for (a, ns) in sk.neighbors.iter().enumerate() {
            for &(b, bond) in ns {
                let (x, y) = (ranks[a].min(ranks[b]), ranks[a].max(ranks[b]));
                bonds.push((x, y, bond.mdl_code()));
            }
        }
        bonds.sort_unstable();
        let mut h = Fnv1aHasher::new();
        atoms.hash(&mut h);
        bonds.hash(&mut h);
        Ok(format!("{}-{:016X}", structure.formula(), h.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::structure::Atom;
    use nalgebra::Point3;

    fn build(symbols: &[&str], bonds: &[(usize, usize, BondType)]) -> ChemicalStructure {
        let mut s = ChemicalStructure::new("t");
        for symbol in symbols {
            s.add_atom(Atom::new(symbol, Point3::origin()));
        }
        for &(a, b, t) in bonds {
            s.add_bond(a, b, t);
        }
        s
    }

    #[test]
    fn writes_chains_branches_and_multiple_bonds() {
        let id = CanonicalIdentifier;
        let acetic = build(
            &["C", "C", "O", "O"],
            &[(0, 1, BondType::Single), (1, 2, BondType::Double), (1, 3, BondType::Single)],
        );
        let smiles = id.smiles(&acetic).unwrap();
        assert_eq!(smiles.matches('=').count(), 1);
        assert_eq!(smiles.matches('(').count(), 1);
        assert_eq!(smiles.chars().filter(|c| c.is_ascii_uppercase()).count(), 4);
    }

    #[test]
    fn rings_get_closure_digits() {
        let ring = build(
            &["C", "C", "C", "C", "C", "C"],
            &[
                (0, 1, BondType::Single),
                (1, 2, BondType::Single),
                (2, 3, BondType::Single),
                (3, 4, BondType::Single),
                (4, 5, BondType::Single),
                (5, 0, BondType::Single),
            ],
        );
        assert_eq!(CanonicalIdentifier.smiles(&ring).unwrap(), "C1CCCCC1");
    }

    #[test]
    fn implicit_hydrogens_and_components() {
        let s = build(
            &["O", "H", "H", "Na"],
            &[(0, 1, BondType::Single), (0, 2, BondType::Single)],
        );
        assert_eq!(CanonicalIdentifier.smiles(&s).unwrap(), "O.[Na]");
    }

    #[test]
    fn unique_key_ignores_atom_order() {
        let a = build(
            &["C", "C", "O"],
            &[(0, 1, BondType::Single), (1, 2, BondType::Single)],
        );
        let b = build(
            &["O", "C", "C"],
            &[(0, 1, BondType::Single), (1, 2, BondType::Single)],
        );
        let c = build(
            &["C", "O", "C"],
            &[(0, 1, BondType::Single), (1, 2, BondType::Single)],
        );
        let id = CanonicalIdentifier;
        assert_eq!(id.unique_key(&a).unwrap(), id.unique_key(&b).unwrap());
        assert_ne!(id.unique_key(&a).unwrap(), id.unique_key(&c).unwrap());
        assert!(id.unique_key(&a).unwrap().starts_with("C2O-"));
    }

    #[test]
    fn empty_structure_has_no_identifier() {
        let id = CanonicalIdentifier;
        assert!(id.smiles(&ChemicalStructure::new("empty")).is_err());
    }
}

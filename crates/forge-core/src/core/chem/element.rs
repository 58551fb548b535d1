use phf::{Map, phf_map};

/// Static properties of a chemical element (or pseudo-element) used when
/// validating and describing assembled structures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementData {
    pub atomic_number: u8,
    /// Average atomic mass in g/mol.
    pub mass: f64,
    /// Highest neutral valence accepted by the valence check.
    pub max_valence: u8,
}

const fn el(atomic_number: u8, mass: f64, max_valence: u8) -> ElementData {
    ElementData {
        atomic_number,
        mass,
        max_valence,
    }
}

static ELEMENTS: Map<&'static str, ElementData> = phf_map! {
    "H" => el(1, 1.008, 1),
    "Li" => el(3, 6.94, 1),
    "B" => el(5, 10.81, 3),
    "C" => el(6, 12.011, 4),
    "N" => el(7, 14.007, 4),
    "O" => el(8, 15.999, 2),
    "F" => el(9, 18.998, 1),
    "Na" => el(11, 22.990, 1),
    "Mg" => el(12, 24.305, 2),
    "Al" => el(13, 26.982, 3),
    "Si" => el(14, 28.085, 4),
    "P" => el(15, 30.974, 5),
    "S" => el(16, 32.06, 6),
    "Cl" => el(17, 35.45, 1),
    "K" => el(19, 39.098, 1),
    "Ca" => el(20, 40.078, 2),
    "Fe" => el(26, 55.845, 6),
    "Cu" => el(29, 63.546, 4),
    "Zn" => el(30, 65.38, 4),
    "Se" => el(34, 78.971, 6),
    "Br" => el(35, 79.904, 1),
    "Ru" => el(44, 101.07, 8),
    "Pd" => el(46, 106.42, 6),
    "I" => el(53, 126.904, 3),
    "Pt" => el(78, 195.084, 6),
};

/// Symbol of the dummy atom used to mark linear or multihapto attachment geometry.
pub const DUMMY_SYMBOL: &str = "Du";
/// Pseudo-atoms carried by ring-closing attractors.
pub const RING_CLOSURE_SYMBOLS: [&str; 2] = ["ATP", "ATM"];

pub fn element_data(symbol: &str) -> Option<&'static ElementData> {
    ELEMENTS.get(symbol.trim())
}

pub fn is_dummy(symbol: &str) -> bool {
    symbol == DUMMY_SYMBOL
}

pub fn is_ring_closure_pseudo_atom(symbol: &str) -> bool {
    RING_CLOSURE_SYMBOLS.contains(&symbol)
}

/// Real atoms are everything that is neither a dummy nor an attractor pseudo-atom.
pub fn is_real_atom(symbol: &str) -> bool {
    !is_dummy(symbol) && !is_ring_closure_pseudo_atom(symbol)
}

pub fn is_heavy_atom(symbol: &str) -> bool {
    is_real_atom(symbol) && symbol != "H"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_known_elements() {
        let carbon = element_data("C").unwrap();
        assert_eq!(carbon.atomic_number, 6);
        assert_eq!(carbon.max_valence, 4);
        assert!(element_data("Xx").is_none());
    }

    #[test]
    fn pseudo_atoms_are_not_heavy() {
        assert!(!is_heavy_atom("Du"));
        assert!(!is_heavy_atom("ATP"));
        assert!(!is_heavy_atom("H"));
        assert!(is_heavy_atom("Cl"));
    }
}

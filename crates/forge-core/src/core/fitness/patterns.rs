use crate::core::chem::bond::BondType;
use crate::core::chem::element::element_data;
use crate::core::chem::structure::ChemicalStructure;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Unsupported pattern '{0}'")]
    Unsupported(String),
}

/// Finds substructures matching a textual pattern. Each hit is the list of
/// matched atom indices, in pattern order.
pub trait PatternMatcher: Send + Sync {
    fn find_all(&self, structure: &ChemicalStructure, pattern: &str) -> Result<Vec<Vec<usize>>, PatternError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AtomQuery {
    Any,
    Symbol(String),
    AtomicNumber(u8),
}

impl AtomQuery {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "*" {
            return Some(Self::Any);
        }
        let inner = text
            .strip_prefix('[')
            .and_then(|t| t.strip_suffix(']'))
            .unwrap_or(text);
        if let Some(number) = inner.strip_prefix('#') {
            return number.parse().ok().map(Self::AtomicNumber);
        }
        let mut chars = inner.chars();
        let first = chars.next()?;
        if !first.is_ascii_uppercase() || !chars.all(|c| c.is_ascii_lowercase()) {
            return None;
        }
        Some(Self::Symbol(inner.to_string()))
    }

    fn matches(&self, symbol: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Symbol(s) => s == symbol,
            Self::AtomicNumber(z) => element_data(symbol).is_some_and(|d| d.atomic_number == *z),
        }
    }
}

fn bond_query(c: char) -> Option<Option<BondType>> {
    match c {
        '-' => Some(Some(BondType::Single)),
        '=' => Some(Some(BondType::Double)),
        '#' => Some(Some(BondType::Triple)),
        '~' => Some(None),
        _ => None,
    }
}

/// Matches single-atom patterns (`C`, `Cl`, `[#8]`, `*`) and two-atom bond
/// patterns (`C-O`, `C=O`, `C#N`, `C~N`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePatternMatcher;

impl SimplePatternMatcher {
    fn split_bond_pattern(pattern: &str) -> Option<(AtomQuery, Option<BondType>, AtomQuery)> {
        // Skip the first atom query so `[#8]` is not read as a triple bond.
        let start = if pattern.starts_with('[') {
            pattern.find(']')? + 1
        } else {
            1
        };
        let (offset, c) = pattern.get(start..)?.char_indices().find(|(_, c)| bond_query(*c).is_some())?;
        let split = start + offset;
        let left = AtomQuery::parse(&pattern[..split])?;
        let right = AtomQuery::parse(&pattern[split + c.len_utf8()..])?;
        Some((left, bond_query(c)?, right))
    }
}

impl PatternMatcher for SimplePatternMatcher {
    fn find_all(&self, structure: &ChemicalStructure, pattern: &str) -> Result<Vec<Vec<usize>>, PatternError> {
        let pattern = pattern.trim();
        if let Some(query) = AtomQuery::parse(pattern) {
            return Ok(structure
                .atoms()
                .iter()
                .enumerate()
                .filter(|(_, a)| query.matches(&a.symbol))
                .map(|(i, _)| vec![i])
                .collect());
        }
        let (left, order, right) = Self::split_bond_pattern(pattern)
            .ok_or_else(|| PatternError::Unsupported(pattern.to_string()))?;
        let symbol = |i: usize| structure.atoms()[i].symbol.as_str();
        let mut hits = Vec::new();
        for bond in structure.bonds() {
            if order.is_some_and(|o| o != bond.bond_type) {
                continue;
            }
            let (a, b) = (bond.atom1, bond.atom2);
            if left.matches(symbol(a)) && right.matches(symbol(b)) {
                hits.push(vec![a, b]);
            } else if left.matches(symbol(b)) && right.matches(symbol(a)) {
                hits.push(vec![b, a]);
            }
        }
        Ok(hits)
    }
}

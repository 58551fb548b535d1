use super::ids::VertexId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Class label of an attachment point, written `rule:subclass`.
///
/// The rule names the chemistry of the connection; the subclass
/// distinguishes the two sides of asymmetric rules (e.g. `amide:0` bonds to
/// `amide:1`). Compatibility between classes is defined by the fragment space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApClass {
    pub rule: String,
    pub subclass: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseApClassError {
    #[error("attachment point class '{0}' is not of the form 'rule:subclass'")]
    Malformed(String),
    #[error("attachment point class '{0}' has a non-numeric subclass")]
    BadSubclass(String),
}

impl ApClass {
    pub fn new(rule: &str, subclass: u32) -> Self {
        Self {
            rule: rule.to_string(),
            subclass,
        }
    }
}

impl FromStr for ApClass {
    type Err = ParseApClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (rule, sub) = s
            .split_once(':')
            .ok_or_else(|| ParseApClassError::Malformed(s.to_string()))?;
        if rule.is_empty() || rule.contains(char::is_whitespace) {
            return Err(ParseApClassError::Malformed(s.to_string()));
        }
        let subclass = sub
            .parse::<u32>()
            .map_err(|_| ParseApClassError::BadSubclass(s.to_string()))?;
        Ok(Self::new(rule, subclass))
    }
}

impl TryFrom<String> for ApClass {
    type Error = ParseApClassError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApClass> for String {
    fn from(value: ApClass) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ApClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.rule, self.subclass)
    }
}

/// A typed connection site on a vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPoint {
    pub owner: VertexId,
    /// Position of this AP in the owner's AP list.
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ApClass>,
    /// Atom of the owner's substructure that forms the bond.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_atom: Option<usize>,
    /// Point where the partner atom should sit, in the owner's frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<[f64; 3]>,
    #[serde(default)]
    pub in_use: bool,
}

impl AttachmentPoint {
    pub fn new(owner: VertexId, index: usize, class: Option<ApClass>) -> Self {
        Self {
            owner,
            index,
            class,
            source_atom: None,
            direction: None,
            in_use: false,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.in_use
    }
}

/// Reference to one AP of one vertex in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApRef {
    pub vertex: VertexId,
    pub ap: usize,
}

impl ApRef {
    pub fn new(vertex: VertexId, ap: usize) -> Self {
        Self { vertex, ap }
    }
}

impl fmt::Display for ApRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}:ap{}", self.vertex, self.ap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_and_subclass() {
        let class: ApClass = "amide:1".parse().unwrap();
        assert_eq!(class.rule, "amide");
        assert_eq!(class.subclass, 1);
        assert_eq!(class.to_string(), "amide:1");
    }

    #[test]
    fn rejects_malformed_classes() {
        assert!(matches!(
            "amide".parse::<ApClass>(),
            Err(ParseApClassError::Malformed(_))
        ));
        assert!(matches!(
            "amide:x".parse::<ApClass>(),
            Err(ParseApClassError::BadSubclass(_))
        ));
        assert!(":0".parse::<ApClass>().is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let class = ApClass::new("cyc", 0);
        let json = serde_json::to_string(&class).unwrap();
        assert_eq!(json, "\"cyc:0\"");
        let back: ApClass = serde_json::from_str(&json).unwrap();
        assert_eq!(back, class);
    }
}

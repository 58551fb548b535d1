use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Type of a bond formed between two attachment points, or between two atoms
/// of an assembled structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BondType {
    /// Connection that does not translate into a chemical bond.
    None,
    #[default]
    Single,
    Double,
    Triple,
    /// Bond whose order is not known or not representable.
    Undefined,
}

impl BondType {
    /// Valence consumed on each end of the bond.
    pub fn valence(&self) -> u8 {
        match self {
            Self::None | Self::Undefined => 0,
            Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
        }
    }

    /// Whether the bond exists as an actual bond in a chemical structure.
    pub fn is_chemical(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Bond order code used by MDL molfiles.
    pub fn mdl_code(&self) -> u8 {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Triple => 3,
            Self::None | Self::Undefined => 8,
        }
    }

    pub fn from_mdl_code(code: u8) -> Self {
        match code {
            1 => Self::Single,
            2 => Self::Double,
            3 => Self::Triple,
            _ => Self::Undefined,
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid bond type string")]
pub struct ParseBondTypeError;

impl FromStr for BondType {
    type Err = ParseBondTypeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "none" => Ok(Self::None),
            "1" | "s" | "single" => Ok(Self::Single),
            "2" | "d" | "double" => Ok(Self::Double),
            "3" | "t" | "triple" => Ok(Self::Triple),
            "8" | "undefined" | "any" => Ok(Self::Undefined),
            _ => Err(ParseBondTypeError),
        }
    }
}

impl fmt::Display for BondType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "None",
                Self::Single => "Single",
                Self::Double => "Double",
                Self::Triple => "Triple",
                Self::Undefined => "Undefined",
            }
        )
    }
}

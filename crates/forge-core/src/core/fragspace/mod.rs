//! The fragment space: libraries of scaffolds, fragments and capping groups,
//! and the class-level rules (compatibility, capping, bond types, forbidden
//! ends, ring closures) that decide how building blocks may be combined.

mod loader;
pub mod space;

pub use space::{BuildingBlock, CompatibilityRules, FragSpaceError, FragmentChoice, FragmentSpace};

//! Fitness primitives: the arithmetic expression language, chemical
//! descriptors, the pattern matcher used to select atoms and bonds, and the
//! provider that combines them into a fitness value.

pub mod descriptors;
pub mod expression;
pub mod patterns;
pub mod provider;

pub use provider::{DescriptorSpec, FitnessError, FitnessProvider};

//! Services that turn graphs into chemistry: the 3-D structure assembler,
//! molecular identifiers (SMILES and a canonical unique key), and 2-D
//! depiction. Each is a trait with a default implementation so heavier
//! cheminformatics back-ends can be plugged in.

pub mod depiction;
pub mod geometry;
pub mod identity;
pub mod tree_builder;

use crate::core::chem::structure::ChemicalStructure;
use crate::core::models::attachment_point::ApRef;
use crate::core::models::graph::Graph;
use crate::core::models::ids::VertexId;
use std::path::Path;
use thiserror::Error;

pub use depiction::SvgDepiction;
pub use identity::CanonicalIdentifier;
pub use tree_builder::TreeAssembler;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Graph has no vertices")]
    EmptyGraph,
    #[error("Vertex {0} carries no chemical substructure")]
    MissingSubstructure(VertexId),
    #[error("Attachment point {0} has no source atom")]
    MissingSourceAtom(ApRef),
    #[error("Vertex {0} is not reachable from the root")]
    Disconnected(VertexId),
    #[error("Ring closing vertex {0} is not bonded to a parent")]
    DetachedRingClosure(VertexId),
}

/// Converts a graph into a concrete chemical structure.
///
/// Implementations may keep internal state between calls and are not
/// required to be thread-safe; callers share one instance behind a lock.
pub trait StructureAssembler: Send {
    /// Builds the structure of `graph`. When `align` is set, building blocks
    /// are roto-translated to honour attachment-point directions; otherwise
    /// their coordinates are concatenated as they are.
    fn assemble(&mut self, graph: &Graph, align: bool) -> Result<ChemicalStructure, AssemblyError>;
}

#[derive(Debug, Error)]
#[error("Identifier generation failed: {0}")]
pub struct IdentifierError(pub String);

pub trait MolecularIdentifier: Send + Sync {
    fn smiles(&self, structure: &ChemicalStructure) -> Result<String, IdentifierError>;

    /// A key equal for identical molecules regardless of atom order.
    fn unique_key(&self, structure: &ChemicalStructure) -> Result<String, IdentifierError>;
}

#[derive(Debug, Error)]
pub enum DepictionError {
    #[error("Nothing to depict")]
    EmptyStructure,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait DepictionRenderer: Send + Sync {
    fn render(&self, structure: &ChemicalStructure, path: &Path) -> Result<(), DepictionError>;
}

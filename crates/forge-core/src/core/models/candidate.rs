use super::graph::Graph;
use super::ids::GraphId;
use crate::core::chem::structure::ChemicalStructure;
use std::path::PathBuf;

/// Fallback SMILES for candidates whose structure could not be written out.
pub const NO_SMILES: &str = "FAIL: NO SMILES GENERATED";
/// Fallback identifier for candidates without a canonical key.
pub const UNDEFINED_UID: &str = "UNDEFINED_INCHI";

/// A scored (or failed) design: the graph, its chemical representation and
/// the outcome of its fitness evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub graph: Graph,
    pub structure: Option<ChemicalStructure>,
    pub uid: String,
    pub smiles: String,
    fitness: Option<f64>,
    error: Option<String>,
    pub level: Option<usize>,
    pub parent_graph: Option<GraphId>,
    pub output_file: Option<PathBuf>,
    pub image_file: Option<PathBuf>,
}

impl Candidate {
    pub fn new(name: impl Into<String>, graph: Graph) -> Self {
        Self {
            name: name.into(),
            graph,
            structure: None,
            uid: UNDEFINED_UID.to_string(),
            smiles: NO_SMILES.to_string(),
            fitness: None,
            error: None,
            level: None,
            parent_graph: None,
            output_file: None,
            image_file: None,
        }
    }

    pub fn graph_id(&self) -> GraphId {
        self.graph.id()
    }

    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Records a fitness value and clears any previous error.
    pub fn set_fitness(&mut self, value: f64) {
        self.fitness = Some(value);
        self.error = None;
    }

    /// Records an evaluation error and clears any previous fitness.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.fitness = None;
    }

    pub fn has_fitness(&self) -> bool {
        self.fitness.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitness_and_error_are_mutually_exclusive() {
        let mut c = Candidate::new("M00000001", Graph::new(GraphId(3)));
        assert_eq!(c.uid, UNDEFINED_UID);
        c.set_fitness(1.25);
        assert_eq!(c.fitness(), Some(1.25));
        c.set_error("boom");
        assert!(c.fitness().is_none());
        assert_eq!(c.error(), Some("boom"));
        c.set_fitness(2.0);
        assert!(c.error().is_none());
        assert_eq!(c.graph_id(), GraphId(3));
    }
}

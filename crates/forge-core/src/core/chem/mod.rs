//! Concrete chemical structures produced from graphs and exchanged with
//! fitness providers: atoms, bonds, element data and free-text properties.

pub mod bond;
pub mod element;
pub mod structure;

/// Property tags understood in structure files exchanged with fitness providers.
pub mod tags {
    pub const FITNESS: &str = "FITNESS";
    pub const ERROR: &str = "MOL_ERROR";
    pub const UID: &str = "UID";
    pub const SMILES: &str = "SMILES";
    pub const PARENT_GRAPH: &str = "PARENT_GRAPH_ID";
    pub const GRAPH_LEVEL: &str = "GRAPH_LEVEL";
    pub const GRAPH: &str = "GRAPH_JSON";
    pub const GRAPH_MESSAGE: &str = "GRAPH_MSG";
    /// Whitespace-separated original vertex ids, one per atom.
    pub const VERTEX_IDS: &str = "ORIGINAL_VERTEX_IDS";
}

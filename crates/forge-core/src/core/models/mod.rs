//! The attachment-point graph model: building-block vertices, attachment
//! points, edges, ring closures, symmetric vertex sets, and the candidate
//! records produced by evaluating a graph.

pub mod attachment_point;
pub mod candidate;
pub mod edge;
pub mod graph;
pub mod ids;
pub mod ring;
pub mod symmetry;
pub mod vertex;

//! # Core Module
//!
//! Data models and stateless services shared by every part of the engine.
//!
//! - **Graph Model** ([`models`]) - vertices, attachment points, edges, rings,
//!   symmetric sets and the candidate record
//! - **Chemistry** ([`chem`]) - atoms, bonds, chemical structures and element data
//! - **File I/O** ([`io`]) - SD files and the JSON graph format
//! - **Building Blocks** ([`fragspace`]) - the fragment library and its compatibility rules
//! - **Fitness** ([`fitness`]) - descriptors, pattern matching and the fitness expression
//! - **Assembly** ([`assembly`]) - graph-to-structure conversion, identifiers and depictions

pub mod assembly;
pub mod chem;
pub mod fitness;
pub mod fragspace;
pub mod io;
pub mod models;

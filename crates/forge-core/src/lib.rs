//! # fragforge
//!
//! A combinatorial, fragment-based molecule-design engine. Candidate molecules
//! are graphs of building blocks joined through typed attachment points; the
//! engine grows those graphs level by level, expands ring-closure
//! alternatives, turns each finished graph into a chemical structure and
//! scores it with a configurable fitness function.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three-layer split throughout:
//!
//! - **[`core`]: The Foundation.** Stateless data models (the
//!   attachment-point [`Graph`](core::models::graph::Graph), chemical
//!   structures, the fragment space), file formats, fitness primitives and the
//!   service traits for structure assembly, identifiers and depiction.
//!
//! - **[`engine`]: The Logic Core.** The stateful machinery that drives a run:
//!   the combination enumerator, the graph builder with its cyclic
//!   alternatives, consistency validation, fitness tasks (in-process or
//!   through an external program), the batch scheduler, level storage and
//!   checkpoints.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the two
//!   layers below: resumable combinatorial exploration and stand-alone fitness
//!   evaluation.

pub mod core;
pub mod engine;
pub mod workflows;

//! # Workflows Module
//!
//! High-level entry points that drive complete procedures on top of the
//! [`engine`](crate::engine).
//!
//! - **Exploration** ([`explore`]) - Level-by-level combinatorial growth of
//!   root graphs, with checkpointing and resume
//! - **Evaluation** ([`evaluate`]) - Fitness of a single graph or structure
//!   outside of any exploration
//!
//! Both workflows load their resources, report progress through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter) and stop
//! cooperatively when their cancellation token is cancelled.

pub mod evaluate;
pub mod explore;

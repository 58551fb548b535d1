//! # Engine Module
//!
//! The stateful machinery behind a design run: turning root graphs into
//! combinations of building blocks, building and validating the resulting
//! graphs, expanding their ring-closure alternatives and scoring the
//! candidates they yield.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Build options, fitness settings and the run configurations
//! - **Run Context** ([`context`]) - Shared services, id counters and storage of a run
//! - **Enumeration** ([`enumerator`]) - Lazy, symmetry-aware walk over building-block combinations
//! - **Graph Building** ([`builder`], [`rings`], [`validation`]) - One combination applied to one root graph
//! - **Fitness** ([`tasks`]) - In-process and external fitness evaluation of candidates
//! - **Scheduling** ([`scheduler`], [`cancel`]) - Bounded worker pool with cooperative stop
//! - **Persistence** ([`storage`], [`checkpoint`]) - Per-level graph files, candidate summary and restart points
//! - **Progress Monitoring** ([`progress`]) - Events reported to the caller
//! - **Error Handling** ([`error`]) - Engine-specific error types
//!
//! ## Key Capabilities
//!
//! - **Symmetry pruning** so that symmetric attachment points receive identical building blocks
//! - **Cyclic alternatives** built from compatible pairs of ring-closing attractors
//! - **Parallel evaluation** on a bounded pool, stoppable between and within tasks
//! - **Resumable exploration** from the last saved combination pointer

pub mod builder;
pub mod cancel;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod enumerator;
pub mod error;
pub mod progress;
pub mod rings;
pub mod scheduler;
pub mod storage;
pub mod tasks;
pub mod validation;

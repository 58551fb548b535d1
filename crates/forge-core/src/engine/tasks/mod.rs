//! Fitness evaluation of candidates.
//!
//! A fitness task takes one candidate from a structure to a score (or an
//! error message), either in-process through descriptors and an expression
//! ([`fitness`]) or by handing SD files to an external program
//! ([`external`]).

pub mod external;
pub mod fitness;

//! Reading and writing the files exchanged by the engine: SD files for
//! chemical structures and JSON documents for attachment-point graphs.

pub mod graph_json;
pub mod sdf;
pub mod traits;

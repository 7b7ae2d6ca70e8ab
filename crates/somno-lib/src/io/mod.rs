//! Loading recordings and annotations from disk and persisting feature tables.

pub mod annotations;
pub mod edf;
pub mod peaks;
pub mod text;

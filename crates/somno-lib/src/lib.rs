//! Beat-aligned feature extraction from cardiac and pulse recordings with
//! sleep-stage and arousal scorings.

pub mod assembler;
pub mod detectors;
pub mod error;
pub mod features;
pub mod io;
pub mod locator;
pub mod mask;
pub mod projector;
pub mod signal;

pub use assembler::*;
pub use error::{PipelineError, PipelineResult};
pub use signal::*;

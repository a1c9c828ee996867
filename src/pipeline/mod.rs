pub mod extraction;
pub mod structuring;
pub mod processor;

pub use processor::{Pipeline, PipelineError, PipelineReport};

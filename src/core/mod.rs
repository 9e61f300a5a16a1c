pub mod pipeline;
pub mod config;
pub mod error;

pub use config::Configuration;
pub use error::{ErrorKind, ParseError, ParseResult};
pub use pipeline::{CapturePipeline, PipelineStats};

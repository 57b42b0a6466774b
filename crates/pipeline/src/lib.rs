//! The generation pipeline: schema analysis, description synthesis and
//! artifact assembly for a single job.
//!
//! The pipeline does not introspect warehouses or run language models
//! itself; it drives the [`collaborators`] that do, reports progress, honours
//! cancellation, and turns every failure into a terminal
//! [`executor::ExecutionOutcome`].

pub mod artifact;
pub mod collaborators;
pub mod executor;
pub mod http;
pub mod lookml;
pub mod metadata;

pub use executor::{ExecutionOutcome, GenerationExecutor, JobExecutor, ProgressSink};

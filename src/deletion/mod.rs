//! Asynchronous batched soft deletion
//!
//! Callers enqueue without waiting; a single background consumer applies the
//! accumulated requests to a [`DeletionSink`] by size, by timer and on shutdown.

pub mod pipeline;
pub mod sink;

pub use pipeline::{DeletionPipeline, PipelineOptions};
pub use sink::{DeletionSink, StorageDeletionSink};

//! The strata caching processing pipeline.
//!
//! A pipeline is either a chain of one [`Producer`], zero or more
//! [`Transform`]s and one [`Serializer`], or a single [`Reader`]. On every
//! request [`CachingPipeline::process`] builds a composite cache key from the
//! cacheable prefix of the chain, looks for a valid stored entry (shortening
//! the key when the full one is missing or stale), then either serves the
//! stored response, resumes the chain after the cached prefix, or runs it
//! from the start, and finally commits the newly cacheable output.

#![warn(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod outcome;
mod reader;
pub mod sink;
pub mod stage;
mod validation;

pub use config::PipelineConfig;
pub use controller::CachingPipeline;
pub use error::{PipelineError, StageError};
pub use outcome::{CacheUse, ProcessOutcome, ResponseStatus};
pub use sink::CaptureSink;
pub use stage::{Cacheable, Producer, Reader, Request, Serializer, Stage, Transform};

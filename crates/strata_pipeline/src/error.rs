//! Error types for stage execution and pipeline processing.

use std::io;

/// An error raised by a stage during setup or generation.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage could not produce its output.
    #[error("{0}")]
    Failed(String),

    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Cached bytes fed to the stage could not be turned back into input.
    #[error("malformed cached input: {0}")]
    Deserialize(String),
}

/// Errors returned from [`CachingPipeline::process`](crate::CachingPipeline::process).
///
/// None of these leave a cache entry behind: the commit only happens after
/// the whole chain has run successfully.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage failed during setup or generation.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        /// Role of the failing stage.
        stage: String,
        /// The stage's error.
        source: StageError,
    },

    /// The client went away while the response was being written.
    #[error("connection reset while writing output: {0}")]
    ConnectionReset(#[source] io::Error),

    /// Writing to the output sink failed for another reason.
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),

    /// Neither the pipeline nor its terminal stage names a content type.
    #[error("no content type resolvable for this pipeline")]
    NoMimeType,

    /// The pipeline is missing a required stage or mixes incompatible ones.
    #[error("incomplete pipeline: {0}")]
    Incomplete(String),
}

impl PipelineError {
    /// Returns `true` for client disconnects, which callers usually do not
    /// report as failures.
    pub fn is_connection_reset(&self) -> bool {
        matches!(self, PipelineError::ConnectionReset(_))
    }

    pub(crate) fn stage(role: &str, err: StageError) -> Self {
        match err {
            StageError::Io(io_err) if is_reset(&io_err) => PipelineError::ConnectionReset(io_err),
            source => PipelineError::Stage {
                stage: role.to_string(),
                source,
            },
        }
    }

    pub(crate) fn output(err: io::Error) -> Self {
        if is_reset(&err) {
            PipelineError::ConnectionReset(err)
        } else {
            PipelineError::Output(err)
        }
    }
}

fn is_reset(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

//! What a processed request did.

use time::OffsetDateTime;

/// How the cache was used for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUse {
    /// The complete response came from the store; no stage ran.
    FullHit,
    /// The first `cached_stages` stages were served from the store and the
    /// rest of the chain ran on their cached output.
    PartialHit {
        /// Number of chain positions covered by the cached entry.
        cached_stages: usize,
    },
    /// A cache key existed but no usable entry did; the whole chain ran.
    Miss,
    /// Nothing about the request was cacheable, or caching is disabled.
    Uncached,
}

/// Response status decided by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// A body was written.
    Ok,
    /// The client's copy is current; no body was written.
    NotModified,
}

/// Summary of one [`CachingPipeline::process`](crate::CachingPipeline::process) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Cache path taken.
    pub cache: CacheUse,
    /// Response status.
    pub status: ResponseStatus,
    /// Content type of the response.
    pub content_type: Option<String>,
    /// Last-modified time of a response served from or committed to the cache.
    pub last_modified: Option<OffsetDateTime>,
    /// Bytes written to the output sink.
    pub bytes_written: u64,
    /// Whether a new entry was stored.
    pub committed: bool,
}

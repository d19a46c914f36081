//! Pipeline resolution: merging global caching settings with per-pipeline overrides.

use crate::error::ConfigError;
use crate::types::{CachingConfig, PipelineOverride, StrataConfig};
use strata_common::ExpiryDuration;

/// Caching settings for one pipeline with the global section and the
/// pipeline's override merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCaching {
    /// The pipeline name, or `None` for the global defaults.
    pub name: Option<String>,
    /// Whether the pipeline consults the cache.
    pub enabled: bool,
    /// Smart caching: no shortening retries on a store miss.
    pub smart_caching: bool,
    /// Expiry window for committed entries.
    pub expires: ExpiryDuration,
    /// Output sink buffer capacity.
    pub output_buffer_size: usize,
}

/// Resolves a named pipeline by overlaying its `[pipelines.<name>]` section
/// on the global `[caching]` section.
pub fn resolve_pipeline(
    config: &StrataConfig,
    pipeline_name: &str,
) -> Result<ResolvedCaching, ConfigError> {
    let section = config
        .pipelines
        .get(pipeline_name)
        .ok_or_else(|| ConfigError::UnknownPipeline(pipeline_name.to_string()))?;

    Ok(merge(
        Some(pipeline_name.to_string()),
        &config.caching,
        section,
    ))
}

/// Resolves the global `[caching]` section alone.
pub fn resolve_default(config: &StrataConfig) -> ResolvedCaching {
    merge(None, &config.caching, &PipelineOverride::default())
}

fn merge(name: Option<String>, base: &CachingConfig, over: &PipelineOverride) -> ResolvedCaching {
    ResolvedCaching {
        name,
        enabled: over.enabled.unwrap_or(base.enabled),
        smart_caching: over.smart_caching.unwrap_or(base.smart_caching),
        expires: over.expires.unwrap_or(base.expires),
        output_buffer_size: over.output_buffer_size.unwrap_or(base.output_buffer_size),
    }
}

//! Caching settings consumed by the controller.

use strata_common::ExpiryDuration;
use strata_config::{CachingConfig, ResolvedCaching};

/// The configuration values a pipeline reads; it owns none of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Whether the cache is consulted at all.
    pub enabled: bool,
    /// A store miss ends the search instead of probing shorter keys.
    pub smart_caching: bool,
    /// Expiry window for committed entries.
    pub expires: ExpiryDuration,
    /// Capacity of the buffered writer around the output sink.
    pub output_buffer_size: usize,
}

impl PipelineConfig {
    /// The expiry window as a signed duration, `None` when unset.
    pub fn expiry_window(&self) -> Option<time::Duration> {
        self.expires
            .as_duration()
            .map(|d| time::Duration::try_from(d).unwrap_or(time::Duration::MAX))
    }

    /// Returns a copy with smart caching switched on or off.
    pub fn with_smart_caching(mut self, smart_caching: bool) -> Self {
        self.smart_caching = smart_caching;
        self
    }

    /// Returns a copy with the given expiry window.
    pub fn with_expires(mut self, expires: ExpiryDuration) -> Self {
        self.expires = expires;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&CachingConfig::default())
    }
}

impl From<&CachingConfig> for PipelineConfig {
    fn from(config: &CachingConfig) -> Self {
        Self {
            enabled: config.enabled,
            smart_caching: config.smart_caching,
            expires: config.expires,
            output_buffer_size: config.output_buffer_size,
        }
    }
}

impl From<&ResolvedCaching> for PipelineConfig {
    fn from(resolved: &ResolvedCaching) -> Self {
        Self {
            enabled: resolved.enabled,
            smart_caching: resolved.smart_caching,
            expires: resolved.expires,
            output_buffer_size: resolved.output_buffer_size,
        }
    }
}

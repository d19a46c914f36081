//! Configuration types deserialized from `strata.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use strata_common::ExpiryDuration;

/// Default capacity of the output sink buffer, in bytes.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 8192;

/// Default number of entries held by the memory store.
pub const DEFAULT_STORE_CAPACITY: usize = 1024;

/// Default directory for the disk store, relative to the working directory.
pub const DEFAULT_STORE_DIRECTORY: &str = ".strata-cache";

/// The top-level configuration parsed from `strata.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct StrataConfig {
    /// Global caching behavior shared by all pipelines.
    #[serde(default)]
    pub caching: CachingConfig,
    /// Backing store selection and sizing.
    #[serde(default)]
    pub store: StoreConfig,
    /// Named per-pipeline overrides of the global caching behavior.
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineOverride>,
}

/// Caching behavior consumed by the pipeline controller.
#[derive(Debug, Clone, Deserialize)]
pub struct CachingConfig {
    /// Whether pipelines consult the cache at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// When set, a store miss is a full miss: shorter keys are not probed.
    #[serde(default = "default_true")]
    pub smart_caching: bool,
    /// Explicit expiry window applied to committed entries (0 = none).
    #[serde(default, deserialize_with = "expiry_from_str_or_int")]
    pub expires: ExpiryDuration,
    /// Capacity of the buffered writer wrapped around the output sink.
    #[serde(default = "default_output_buffer_size")]
    pub output_buffer_size: usize,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smart_caching: true,
            expires: ExpiryDuration::NONE,
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
        }
    }
}

/// Which store implementation backs the cache.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process LRU map (default).
    #[default]
    Memory,
    /// One checksummed file per entry under `store.directory`.
    Disk,
}

/// Store selection and sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store implementation.
    #[serde(default)]
    pub kind: StoreKind,
    /// Maximum number of entries kept by the memory store.
    #[serde(default = "default_store_capacity")]
    pub capacity: usize,
    /// Root directory of the disk store.
    #[serde(default = "default_store_directory")]
    pub directory: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            capacity: DEFAULT_STORE_CAPACITY,
            directory: PathBuf::from(DEFAULT_STORE_DIRECTORY),
        }
    }
}

/// Per-pipeline override section (`[pipelines.<name>]`).
///
/// Unset fields fall back to the global `[caching]` values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineOverride {
    /// Overrides `caching.enabled`.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Overrides `caching.smart_caching`.
    #[serde(default)]
    pub smart_caching: Option<bool>,
    /// Overrides `caching.expires`.
    #[serde(default, deserialize_with = "optional_expiry")]
    pub expires: Option<ExpiryDuration>,
    /// Overrides `caching.output_buffer_size`.
    #[serde(default)]
    pub output_buffer_size: Option<usize>,
}

fn default_true() -> bool {
    true
}

fn default_output_buffer_size() -> usize {
    DEFAULT_OUTPUT_BUFFER_SIZE
}

fn default_store_capacity() -> usize {
    DEFAULT_STORE_CAPACITY
}

fn default_store_directory() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_DIRECTORY)
}

/// Deserializes an expiry given either as a unit string ("60s", "1h") or as
/// a bare integer number of seconds.
fn expiry_from_str_or_int<'de, D>(deserializer: D) -> Result<ExpiryDuration, D::Error>
where
    D: Deserializer<'de>,
{
    struct StrOrInt;

    impl<'de> Visitor<'de> for StrOrInt {
        type Value = ExpiryDuration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a duration string like \"60s\" or a number of seconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse().map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(ExpiryDuration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(ExpiryDuration::from_secs)
                .map_err(|_| E::custom(format!("expiry must not be negative, got {v}")))
        }
    }

    deserializer.deserialize_any(StrOrInt)
}

fn optional_expiry<'de, D>(deserializer: D) -> Result<Option<ExpiryDuration>, D::Error>
where
    D: Deserializer<'de>,
{
    expiry_from_str_or_int(deserializer).map(Some)
}

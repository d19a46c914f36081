//! Parsing and validation of `strata.toml` caching configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`StrataConfig`] with per-pipeline override resolution.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_default, resolve_pipeline, ResolvedCaching};
pub use types::*;

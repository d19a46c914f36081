//! Shared foundational types used across the strata caching pipeline.
//!
//! This crate provides content hashing for store identifiers, expiry duration
//! parsing for configuration values, and the common internal result type.

#![warn(missing_docs)]

pub mod expiry;
pub mod hash;
pub mod result;

pub use expiry::{ExpiryDuration, ParseExpiryError};
pub use hash::ContentHash;
pub use result::{InternalError, StrataResult};

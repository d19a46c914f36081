//! Composite cache keys, validity tokens, cached entries, and stores for the
//! strata caching pipeline.
//!
//! A [`PipelineCacheKey`] is the ordered list of [`KeyFragment`]s contributed
//! by the cacheable prefix of a stage chain. A [`CachedResponse`] stores the
//! bytes that prefix produced together with one [`Validity`] token per
//! fragment. Any [`CacheStore`] holds entries keyed by the composite key's
//! string form; [`MemoryStore`] and [`FileStore`] are the provided
//! implementations.

#![warn(missing_docs)]

pub mod error;
pub mod file;
pub mod key;
mod lock;
pub mod memory;
pub mod response;
pub mod store;
pub mod validity;

pub use error::CacheError;
pub use file::FileStore;
pub use key::{KeyFragment, PipelineCacheKey, StageKind};
pub use memory::MemoryStore;
pub use response::CachedResponse;
pub use store::{open_store, CacheStore};
pub use validity::{Validity, ValidityState};

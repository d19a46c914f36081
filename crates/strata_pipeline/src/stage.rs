//! Stage roles and the cacheable capability.
//!
//! Every stage implements [`Stage`] plus exactly one role trait. Caching is
//! an optional capability: a stage opts in by returning itself from
//! [`Stage::cacheable`], so any role can be cacheable without a separate
//! type hierarchy.

use std::collections::BTreeMap;
use std::io::Write;

use strata_cache::Validity;
use time::OffsetDateTime;

use crate::error::StageError;

/// Per-request input handed to every stage's setup.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Named parameters for the stages.
    pub params: BTreeMap<String, String>,
    /// Set for nested invocations (e.g. an included sub-pipeline). An
    /// internal request never caches the terminal stage's output.
    pub internal: bool,
    /// Conditional-request timestamp from the client.
    pub if_modified_since: Option<OffsetDateTime>,
}

impl Request {
    /// Creates an external request with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the request as internal.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Adds a stage parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets the conditional-request timestamp.
    pub fn if_modified_since(mut self, since: OffsetDateTime) -> Self {
        self.if_modified_since = Some(since);
        self
    }

    /// Looks up a stage parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// The caching capability of a stage.
pub trait Cacheable {
    /// Opaque key identifying the stage's current configuration and input,
    /// or `None` when the stage cannot be cached for this invocation.
    fn cache_key(&self) -> Option<String>;

    /// A fresh validity token for the stage's current output, or `None` if
    /// none can be produced.
    fn validity(&self) -> Option<Validity>;
}

/// Behavior shared by every stage role.
pub trait Stage {
    /// Component type identifier, e.g. `"file"` or `"xslt"`.
    fn role(&self) -> &str;

    /// Source locator the stage reads from, if any.
    fn source(&self) -> &str {
        ""
    }

    /// Prepares the stage for a request. Called before any key is built.
    fn setup(&mut self, _request: &Request) -> Result<(), StageError> {
        Ok(())
    }

    /// Returns the caching capability, if this stage has one.
    fn cacheable(&self) -> Option<&dyn Cacheable> {
        None
    }
}

/// The head of a chain.
pub trait Producer: Stage {
    /// Produces the chain's initial document.
    fn generate(&mut self) -> Result<Vec<u8>, StageError>;
}

/// An intermediate stage.
pub trait Transform: Stage {
    /// Turns the upstream document into this stage's output.
    fn transform(&mut self, input: Vec<u8>) -> Result<Vec<u8>, StageError>;

    /// Turns the cached output of the upstream prefix back into input for
    /// this stage when the pipeline resumes here.
    fn deserialize(&self, cached: Vec<u8>) -> Result<Vec<u8>, StageError> {
        Ok(cached)
    }
}

/// The terminal stage of a chain.
pub trait Serializer: Stage {
    /// Content type of the serialized output.
    fn mime_type(&self) -> Option<&str> {
        None
    }

    /// Writes the final response for `input` into `out`.
    fn serialize(&mut self, input: Vec<u8>, out: &mut dyn Write) -> Result<(), StageError>;

    /// Turns the cached output of the upstream prefix back into input.
    fn deserialize(&self, cached: Vec<u8>) -> Result<Vec<u8>, StageError> {
        Ok(cached)
    }
}

/// A single stage serving bytes directly.
pub trait Reader: Stage {
    /// Content type of the served bytes.
    fn mime_type(&self) -> Option<&str> {
        None
    }

    /// Writes the complete response into `out`.
    fn generate(&mut self, out: &mut dyn Write) -> Result<(), StageError>;
}

//! Key fragments and the composite pipeline cache key.
//!
//! A [`PipelineCacheKey`] is value-semantic: cloning it yields an independent
//! sequence that can be shortened without affecting the original, so the
//! key to store under and the key to load from can diverge during validation.
//! Fragments themselves are immutable and shared between copies.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_common::ContentHash;

/// The role a stage plays in the chain.
///
/// Part of every [`KeyFragment`] so that fragments from different roles
/// never collide even when their opaque keys are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// The single content producer at the head of the chain.
    Producer,
    /// An intermediate transform.
    Transform,
    /// The terminal stage writing the final response.
    Serializer,
    /// A terminal stage serving bytes directly, with no transforms.
    Reader,
}

impl StageKind {
    /// Single-letter tag used in the key's string form.
    pub fn tag(self) -> char {
        match self {
            StageKind::Producer => 'G',
            StageKind::Transform => 'T',
            StageKind::Serializer => 'S',
            StageKind::Reader => 'R',
        }
    }

    /// Returns `true` for roles that write the final response.
    pub fn is_terminal(self) -> bool {
        matches!(self, StageKind::Serializer | StageKind::Reader)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Producer => "producer",
            StageKind::Transform => "transform",
            StageKind::Serializer => "serializer",
            StageKind::Reader => "reader",
        };
        f.write_str(name)
    }
}

/// One stage's contribution to a composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyFragment {
    /// Role of the contributing stage.
    pub kind: StageKind,
    /// Component type identifier, e.g. `"file"` or `"xslt"`.
    pub role: String,
    /// Source locator the stage was set up with.
    pub source: String,
    /// Opaque key describing the stage's configuration and input.
    pub key: String,
}

impl KeyFragment {
    /// Creates a fragment.
    pub fn new(
        kind: StageKind,
        role: impl Into<String>,
        source: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            role: role.into(),
            source: source.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for KeyFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.kind.tag())?;
        write_escaped(f, &self.role)?;
        f.write_char('-')?;
        write_escaped(f, &self.source)?;
        f.write_char('?')?;
        write_escaped(f, &self.key)
    }
}

/// Writes `field` with every separator of the string form backslash-escaped,
/// so distinct fragment sequences never print the same.
fn write_escaped(f: &mut fmt::Formatter<'_>, field: &str) -> fmt::Result {
    for ch in field.chars() {
        if matches!(ch, '\\' | '-' | '?' | '_') {
            f.write_char('\\')?;
        }
        f.write_char(ch)?;
    }
    Ok(())
}

/// Ordered sequence of fragments identifying a cacheable prefix of a chain.
///
/// Fragment `i` always belongs to chain position `i`; shortening only ever
/// drops fragments from the end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PipelineCacheKey {
    fragments: Vec<Arc<KeyFragment>>,
}

impl PipelineCacheKey {
    /// Creates an empty key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the next stage's fragment.
    pub fn push(&mut self, fragment: KeyFragment) {
        self.fragments.push(Arc::new(fragment));
    }

    /// Removes and returns the last fragment.
    pub fn pop(&mut self) -> Option<Arc<KeyFragment>> {
        self.fragments.pop()
    }

    /// Drops every fragment at position `len` and beyond.
    pub fn truncate(&mut self, len: usize) {
        self.fragments.truncate(len);
    }

    /// Returns an independent copy holding the first `len` fragments.
    pub fn prefix(&self, len: usize) -> PipelineCacheKey {
        let len = len.min(self.fragments.len());
        Self {
            fragments: self.fragments[..len].to_vec(),
        }
    }

    /// Number of fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Returns `true` if the key holds no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Returns the fragment at chain position `index`.
    pub fn get(&self, index: usize) -> Option<&KeyFragment> {
        self.fragments.get(index).map(Arc::as_ref)
    }

    /// Returns the last fragment.
    pub fn last(&self) -> Option<&KeyFragment> {
        self.fragments.last().map(Arc::as_ref)
    }

    /// Iterates the fragments in chain order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyFragment> {
        self.fragments.iter().map(Arc::as_ref)
    }

    /// Returns `true` if `self` is a (non-strict) prefix of `other`.
    pub fn is_prefix_of(&self, other: &PipelineCacheKey) -> bool {
        self.len() <= other.len() && self.fragments[..] == other.fragments[..self.len()]
    }

    /// Fixed-width identifier derived from the string form, for stores that
    /// need bounded file or slot names. The string form is injective, so
    /// distinct keys only share an id on a hash collision.
    pub fn store_id(&self) -> ContentHash {
        ContentHash::from_str_bytes(&self.to_string())
    }
}

impl fmt::Display for PipelineCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PK")?;
        for fragment in &self.fragments {
            write!(f, "_{fragment}")?;
        }
        Ok(())
    }
}

impl FromIterator<KeyFragment> for PipelineCacheKey {
    fn from_iter<I: IntoIterator<Item = KeyFragment>>(iter: I) -> Self {
        Self {
            fragments: iter.into_iter().map(Arc::new).collect(),
        }
    }
}

//! The value stored for a composite key.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::validity::Validity;

/// Output bytes of a cached chain prefix and the tokens that vouch for them.
///
/// `validities` is aligned 1:1 with the fragments of the key the entry was
/// stored under. Only `expires` is ever updated after the entry is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Bytes produced by the cached prefix.
    pub response: Vec<u8>,
    /// One token per key fragment, in chain order.
    pub validities: Vec<Validity>,
    /// Explicit expiry; while in the future the entry is served as-is.
    #[serde(with = "time::serde::timestamp::option")]
    pub expires: Option<OffsetDateTime>,
    /// When the bytes were generated.
    #[serde(with = "time::serde::timestamp")]
    pub last_modified: OffsetDateTime,
    /// Content type of a complete response, if known.
    pub content_type: Option<String>,
}

impl CachedResponse {
    /// Creates an entry generated now, with no expiry.
    pub fn new(validities: Vec<Validity>, response: Vec<u8>) -> Self {
        Self {
            response,
            validities,
            expires: None,
            last_modified: now_whole_seconds(),
            content_type: None,
        }
    }

    /// Sets the explicit expiry to `window` from now, or clears it.
    pub fn with_expires_in(mut self, window: Option<Duration>) -> Self {
        self.refresh_expires(window);
        self
    }

    /// Sets the content type of a complete response.
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Returns `true` if an explicit expiry is set and still in the future.
    pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
        self.expires.is_some_and(|expires| expires > now)
    }

    /// Recomputes the explicit expiry from the live configuration.
    ///
    /// A window reaching past the last representable instant saturates
    /// there.
    pub fn refresh_expires(&mut self, window: Option<Duration>) {
        self.expires = window.map(|w| now_whole_seconds().saturating_add(w));
    }

    /// Returns `true` if the token count matches a key of length `key_len`.
    pub fn matches_key_len(&self, key_len: usize) -> bool {
        self.validities.len() == key_len
    }
}

/// Current time truncated to whole seconds, the precision entries persist at.
pub(crate) fn now_whole_seconds() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond()))
}

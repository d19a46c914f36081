//! Validity judgement, expiry refresh, and commit steps shared by the chain
//! controller and the reader path.

use strata_cache::{CacheStore, CachedResponse, PipelineCacheKey, Validity, ValidityState};
use strata_common::{InternalError, StrataResult};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

/// Result of walking a stored entry's validity tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Every token is valid.
    Valid,
    /// Token `valid_prefix` is definitively stale; the entry stays stored.
    Stale { valid_prefix: usize },
    /// Token `valid_prefix` could not be judged for lack of a fresh token;
    /// the entry is of no further use.
    Unusable { valid_prefix: usize },
}

/// Walks `tokens` in order, asking `fresh_at` for a live token whenever a
/// self-check is undecided.
pub(crate) fn judge(
    tokens: &[Validity],
    mut fresh_at: impl FnMut(usize) -> Option<Validity>,
) -> Verdict {
    for (position, token) in tokens.iter().enumerate() {
        let mut state = token.self_check();
        let mut judged = true;
        if state == ValidityState::Unknown {
            match fresh_at(position) {
                Some(fresh) => {
                    state = token.compare(&fresh);
                    judged = state != ValidityState::Unknown;
                }
                None => judged = false,
            }
        }
        if state != ValidityState::Valid {
            return if judged {
                Verdict::Stale {
                    valid_prefix: position,
                }
            } else {
                Verdict::Unusable {
                    valid_prefix: position,
                }
            };
        }
    }
    Verdict::Valid
}

/// Applies the explicit-expiry rule to an entry read from `key`.
///
/// Returns `true` when the entry is within its expiry and must be served
/// without content validation. Otherwise the expiry is recomputed from
/// `window` (or cleared) and written back when it changed.
pub(crate) fn apply_expiry(
    store: &dyn CacheStore,
    key: &PipelineCacheKey,
    response: &mut CachedResponse,
    window: Option<Duration>,
) -> bool {
    if response.is_fresh_at(OffsetDateTime::now_utc()) {
        return true;
    }
    if response.expires.is_none() && window.is_none() {
        return false;
    }
    response.refresh_expires(window);
    debug!(key = %key, expires = ?response.expires, "refreshed entry expiry");
    if let Err(e) = store.store(key, response.clone()) {
        warn!(key = %key, error = %e, "failed to write back refreshed expiry");
    }
    false
}

/// Stores a freshly generated entry under `key`.
///
/// Returns the entry's last-modified time when it was stored. Store
/// failures are logged; they never fail the request.
pub(crate) fn commit(
    store: &dyn CacheStore,
    key: &PipelineCacheKey,
    validities: Vec<Validity>,
    bytes: Vec<u8>,
    content_type: Option<String>,
    window: Option<Duration>,
) -> Option<OffsetDateTime> {
    let entry = match build_entry(key, validities, bytes) {
        Ok(entry) => entry.with_expires_in(window).with_content_type(content_type),
        Err(e) => {
            warn!(key = %key, error = %e, "skipping cache commit");
            return None;
        }
    };
    let last_modified = entry.last_modified;
    let size = entry.response.len();
    match store.store(key, entry) {
        Ok(()) => {
            debug!(key = %key, bytes = size, "committed cache entry");
            Some(last_modified)
        }
        Err(e) => {
            warn!(key = %key, error = %e, "failed to store cache entry");
            None
        }
    }
}

fn build_entry(
    key: &PipelineCacheKey,
    validities: Vec<Validity>,
    bytes: Vec<u8>,
) -> StrataResult<CachedResponse> {
    if validities.len() != key.len() {
        return Err(InternalError::new(format!(
            "{} validity tokens for a key of length {}",
            validities.len(),
            key.len()
        )));
    }
    Ok(CachedResponse::new(validities, bytes))
}

//! Freshness tokens attached to each fragment of a cached entry.
//!
//! Validation is two-phase. [`Validity::self_check`] answers from the token
//! alone; when it returns [`ValidityState::Unknown`] the caller asks the
//! live stage for a fresh token and calls [`Validity::compare`]. An
//! `Unknown` left after comparison means the entry cannot be judged and
//! must not be served. Comparing tokens of different kinds is such a case:
//! a stage that switched from timestamps to content hashes cannot vouch for
//! what it stored before.

use serde::{Deserialize, Serialize};
use strata_common::ContentHash;
use time::OffsetDateTime;

/// Outcome of a validity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityState {
    /// The cached output is still current.
    Valid,
    /// The cached output is definitively stale.
    Invalid,
    /// The token cannot decide on its own.
    Unknown,
}

impl ValidityState {
    /// Combines member states: any `Invalid` wins, then any `Unknown`.
    fn combine(states: impl IntoIterator<Item = ValidityState>) -> ValidityState {
        let mut result = ValidityState::Valid;
        for state in states {
            match state {
                ValidityState::Invalid => return ValidityState::Invalid,
                ValidityState::Unknown => result = ValidityState::Unknown,
                ValidityState::Valid => {}
            }
        }
        result
    }
}

/// A serializable freshness witness produced by a cacheable stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    /// Always valid. For stages whose output never changes for a given key.
    Nop,
    /// A modification timestamp; valid while the fresh timestamp is equal.
    TimeStamp(i64),
    /// A content hash of the stage's input; valid while the fresh hash is equal.
    Content(ContentHash),
    /// Valid until the deadline passes, regardless of any fresh token.
    Expires {
        /// Instant after which the output is stale.
        #[serde(with = "time::serde::timestamp")]
        deadline: OffsetDateTime,
    },
    /// Several tokens judged together, e.g. for a stage with multiple inputs.
    Aggregated(Vec<Validity>),
}

impl Validity {
    /// A token that stays valid for `window` from now.
    pub fn expires_in(window: time::Duration) -> Self {
        Validity::Expires {
            deadline: OffsetDateTime::now_utc().saturating_add(window),
        }
    }

    /// Judges the token without a fresh counterpart.
    pub fn self_check(&self) -> ValidityState {
        match self {
            Validity::Nop => ValidityState::Valid,
            Validity::TimeStamp(_) | Validity::Content(_) => ValidityState::Unknown,
            Validity::Expires { deadline } => {
                if OffsetDateTime::now_utc() < *deadline {
                    ValidityState::Valid
                } else {
                    ValidityState::Invalid
                }
            }
            Validity::Aggregated(members) => {
                ValidityState::combine(members.iter().map(Validity::self_check))
            }
        }
    }

    /// Judges the stored token against a freshly obtained one.
    ///
    /// Tokens of different kinds cannot be judged against each other.
    pub fn compare(&self, fresh: &Validity) -> ValidityState {
        match (self, fresh) {
            (Validity::Nop, _) | (Validity::Expires { .. }, _) => self.self_check(),
            (Validity::TimeStamp(stored), Validity::TimeStamp(current)) => {
                equal_state(stored == current)
            }
            (Validity::Content(stored), Validity::Content(current)) => {
                equal_state(stored == current)
            }
            (Validity::Aggregated(stored), Validity::Aggregated(current)) => {
                if stored.len() != current.len() {
                    return ValidityState::Invalid;
                }
                ValidityState::combine(stored.iter().zip(current).map(|(old, new)| {
                    match old.self_check() {
                        ValidityState::Unknown => old.compare(new),
                        decided => decided,
                    }
                }))
            }
            _ => ValidityState::Unknown,
        }
    }
}

fn equal_state(equal: bool) -> ValidityState {
    if equal {
        ValidityState::Valid
    } else {
        ValidityState::Invalid
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The repository-change event kinds carried on the firehose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Commit,
    Identity,
    Account,
    Sync,
}

/// A single repository-change event as rebroadcast to feed subscribers.
///
/// Immutable once constructed. `seq` is monotonic per source; `country` and
/// `verified` are populated only when an upstream supplied a detected
/// location, which the classifier does not currently consume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamEvent {
    pub repo: String,
    pub kind: EventKind,
    pub seq: i64,
    pub time: DateTime<Utc>,
    pub source: Option<String>,
    pub country: Option<String>,
    pub verified: bool,
}

impl StreamEvent {
    pub fn new(repo: impl Into<String>, kind: EventKind, seq: i64) -> Self {
        Self {
            repo: repo.into(),
            kind,
            seq,
            time: Utc::now(),
            source: None,
            country: None,
            verified: false,
        }
    }

    /// The stable subject identifier this event concerns, when one exists.
    ///
    /// All four kinds name their repository, but upstreams occasionally emit
    /// frames with an empty repo field; those carry no classifiable subject.
    pub fn subject(&self) -> Option<&str> {
        if self.repo.is_empty() {
            None
        } else {
            Some(&self.repo)
        }
    }
}

/// Outcome of a single filtering decision.
///
/// `hash_only` marks a partial-disclosure outcome where only a content hash
/// may be forwarded. The classifier never produces it today, but the filter
/// boundary preserves the field for resolvers that will.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterResult {
    pub pass: bool,
    pub reason: String,
    pub hash_only: bool,
}

impl FilterResult {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            pass: true,
            reason: reason.into(),
            hash_only: false,
        }
    }

    pub fn filtered(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: reason.into(),
            hash_only: false,
        }
    }

    pub fn hash_only(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: reason.into(),
            hash_only: true,
        }
    }
}

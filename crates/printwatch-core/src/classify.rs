//! Decides whether a failed cycle means "the device is unreachable" (eligible
//! for cache fallback) or something that must be surfaced.
//!
//! The message matching is a heuristic. A false negative surfaces a
//! recoverable outage as a hard failure; a false positive masks a genuine
//! configuration or protocol error as "offline". Typed client errors are
//! trusted first and the text is only consulted for untyped failures.

use serde::Serialize;

use crate::error::CollectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Unreachable,
    OtherFailure,
}

const UNREACHABLE_MARKERS: [&str; 9] = [
    "timeout",
    "unreachable",
    "no route",
    "connection",
    "network",
    "host",
    "refused",
    "failed",
    "no response",
];

// Checked before the connectivity markers: "authentication failed" would
// otherwise match "failed".
const PROTOCOL_MARKERS: [&str; 6] = [
    "auth",
    "credential",
    "unknown user",
    "decrypt",
    "wrong digest",
    "malformed",
];

pub fn classify(err: &CollectionError) -> Classification {
    err.source
        .hint()
        .unwrap_or_else(|| classify_message(&err.source.to_string()))
}

pub fn classify_message(message: &str) -> Classification {
    let message = message.to_lowercase();

    if PROTOCOL_MARKERS.iter().any(|marker| message.contains(marker)) {
        return Classification::OtherFailure;
    }

    if UNREACHABLE_MARKERS.iter().any(|marker| message.contains(marker)) {
        Classification::Unreachable
    } else {
        Classification::OtherFailure
    }
}

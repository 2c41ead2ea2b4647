use thiserror::Error;

use crate::classify::Classification;
use crate::client::{ClientError, Query};

/// A sub-query failed, so the whole cycle produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not collect {query}: {source}")]
pub struct CollectionError {
    pub query: Query,
    #[source]
    pub source: ClientError,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache schema version {found} is not supported (expected {expected})")]
    SchemaVersion { found: u64, expected: u32 },
    #[error("cache record belongs to {found}, not {expected}")]
    IdentityMismatch { found: String, expected: String },
    #[error("cache operation timed out")]
    Timeout,
}

/// A cycle whose failure was not absorbed by cache fallback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("error fetching printer data: {source}")]
pub struct RefreshError {
    pub classification: Classification,
    #[source]
    pub source: CollectionError,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("device {0} is already registered")]
    Duplicate(String),
    #[error("device {0} is not registered")]
    Unknown(String),
}

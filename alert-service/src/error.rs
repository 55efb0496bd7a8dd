//! Error taxonomy for alert evaluation and dispatch.
//!
//! Expected outcomes (unmatched items, lost latch races, malformed payloads)
//! are not errors here; they surface as [`crate::handlers::IngestOutcome`]
//! variants. Everything in [`IngestError`] asks the caller to redeliver.

use std::collections::BTreeMap;
use std::time::Duration;

use diesel::result::DatabaseErrorKind;
use diesel_async::pooled_connection::PoolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, pool or query failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete within its bound
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// A record already exists for the same shop and inventory item
    #[error("alert record conflict: {0}")]
    Conflict(String),

    /// A persisted row could not be mapped onto the typed record
    #[error("alert record {id} is corrupt: {reason}")]
    Corrupt { id: i32, reason: String },
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

impl From<bb8::RunError<PoolError>> for StoreError {
    fn from(err: bb8::RunError<PoolError>) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The broker rejected or never acknowledged the publish
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode job: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum GuardError {
    /// Another event latched the record first, or it was deleted.
    #[error("alert record {0} was latched or removed concurrently")]
    StaleRecord(i32),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Failures that must not be acknowledged upstream.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("dispatch unavailable: {0}")]
    DispatchUnavailable(#[source] DispatchError),
}

#[derive(Debug, Error)]
#[error("malformed inventory event: {0}")]
pub struct MalformedEvent(pub String);

#[derive(Debug, Error)]
#[error("invalid alert record: {fields:?}")]
pub struct ValidationError {
    pub fields: BTreeMap<&'static str, &'static str>,
}

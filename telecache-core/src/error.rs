//! Error types for Telecache operations

use std::time::Duration;
use thiserror::Error;

/// Inbound record rejected before it reaches either store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Malformed telemetry body: {reason}")]
    MalformedBody { reason: String },
}

/// Durable store failures. Always surfaced to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Durable store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Durable store {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Durable store query failed: {reason}")]
    Query { reason: String },
}

/// Fast cache failures. Recovered locally on ingest and retrieval.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache {operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

/// Serialized bytes that do not match the expected structure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Failed to encode telemetry: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode telemetry: {reason}")]
    Decode { reason: String },

    #[error("Failed to decode telemetry payload: expected a JSON object, found {found}")]
    NotAnObject { found: String },
}

/// Outcome of a failed ingestion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Invalid telemetry record: {0}")]
    Validation(#[from] ValidationError),

    /// The durable insert did not complete. No cache mutation happened.
    #[error("{0}")]
    PersistenceFailed(#[from] StoreError),
}

/// Outcome of a failed per-device read.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("No telemetry found for device {device_id}")]
    NotFound { device_id: String },

    #[error("{0}")]
    StorageUnavailable(#[from] StoreError),

    /// The durable row exists but its payload cannot be decoded.
    #[error("Stored telemetry for device {device_id} is undecodable: {source}")]
    Decode {
        device_id: String,
        source: CodecError,
    },
}

/// Outcome of a failed bulk listing of cached devices.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("{0}")]
    CacheUnavailable(#[from] CacheError),
}

// =============================================================================
// TESTS
// =============================================================================

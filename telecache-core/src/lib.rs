//! Telecache Core - Telemetry Types
//!
//! Data structures shared by every other crate in the workspace: the
//! telemetry envelope, its durable row form, the canonical codec that moves
//! between them, and the error taxonomy.
//!
//! This crate holds no I/O. Storage and coordination live in
//! `telecache-storage`; HTTP lives in `telecache-api`.

pub mod codec;
pub mod error;
pub mod record;

pub use codec::{decode_payload, decode_record, encode_payload, encode_record};
pub use error::{
    CacheError, CodecError, IngestError, ListingError, RetrievalError, StoreError,
    ValidationError,
};
pub use record::{Payload, TelemetryRecord, TelemetryRow};

/// Default lifetime of a cache entry (1 hour).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

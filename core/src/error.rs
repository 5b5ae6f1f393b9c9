//! Error types shared across the OT engine
//!
//! A single crate-wide error enum keeps the failure surface narrow: the
//! algebra, the client state machine, the server, and the adapter/transport
//! contracts all report through [`OtError`].
//!
//! # Error Categories
//!
//! - *Input validation* — `OpMalformed`, `OpOutOfBounds`, `OpInvalid`,
//!   `TypeUnknown`. Reported synchronously; no state change.
//! - *Concurrency* — `RevisionFromFuture` (hard error to the client),
//!   `ConcurrencyConflict` (retryable, surfaced by the adapter CAS).
//! - *Infrastructure* — `StorageUnavailable`, `TransportFailure`.
//! - *Protocol* — `UnexpectedAck`, `TypeConflict`. These indicate programmer
//!   or infrastructure bugs and are logged loudly where they are detected.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, OtError>;

/// All failure modes of the OT engine
#[derive(Debug, Error)]
pub enum OtError {
    /// Operation is not normalized or contains an unknown component
    #[error("malformed operation: {0}")]
    OpMalformed(String),

    /// Applying the operation would overrun (or, in strict mode, underrun)
    /// the snapshot
    #[error("operation spans {index} of {length} units")]
    OpOutOfBounds {
        /// Units the operation consumed (or attempted to consume)
        index: usize,
        /// Length of the snapshot in the same units
        length: usize,
    },

    /// A local edit was rejected by the type's `apply`
    #[error("invalid operation: {0}")]
    OpInvalid(String),

    /// An acknowledgment arrived while no operation was outstanding
    #[error("unexpected ack in synchronized state")]
    UnexpectedAck,

    /// No document with this id exists in the backend
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// No OT type registered under this name
    #[error("unknown OT type: {0}")]
    TypeUnknown(String),

    /// A different type is already registered under this name
    #[error("conflicting registration for OT type: {0}")]
    TypeConflict(String),

    /// The client claims a revision the server has not reached yet
    #[error("client revision {client} is ahead of server revision {server}")]
    RevisionFromFuture {
        /// Revision submitted by the client
        client: u64,
        /// Current revision of the document
        server: u64,
    },

    /// The adapter rejected a commit because the expected prior revision
    /// was stale
    #[error("concurrent commit: document already at revision {0}")]
    ConcurrencyConflict(u64),

    /// The backend failed in a way that is not retryable
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The transport failed to deliver a frame
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A wire frame could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl OtError {
    /// The stable error code surfaced over the wire for this error.
    ///
    /// Codes follow the conventional HTTP-class grouping: `REVISION_MISMATCH`
    /// and `CONCURRENCY_CONFLICT` are 409-class (the latter retryable),
    /// `DOCUMENT_NOT_FOUND` is 404, `TYPE_UNKNOWN` and `OP_MALFORMED` are
    /// 400, everything else is `INTERNAL`.
    pub fn code(&self) -> &'static str {
        match self {
            OtError::RevisionFromFuture { .. } => "REVISION_MISMATCH",
            OtError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            OtError::TypeUnknown(_) => "TYPE_UNKNOWN",
            OtError::OpMalformed(_) | OtError::OpOutOfBounds { .. } | OtError::OpInvalid(_) => {
                "OP_MALFORMED"
            }
            OtError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            _ => "INTERNAL",
        }
    }

    /// Whether a caller may retry the failed call unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, OtError::ConcurrencyConflict(_))
    }
}

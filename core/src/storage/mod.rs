//! Backend adapter contract
//!
//! The server persists documents through this narrow interface; production
//! implementations (Redis, SQL, object stores) live outside the core. The
//! one hard requirement is the optimistic-locking contract of
//! [`BackendAdapter::save_operation`]: the commit must be atomic and must
//! fail when the expected prior revision is stale.
//!
//! Snapshots and operations cross this boundary as opaque
//! [`serde_json::Value`] carriers; only the registered OT type knows their
//! shape.

mod memory;

pub use memory::MemoryAdapter;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{OtError, Result};

/// Stored metadata and state for one document
///
/// `snapshot` is the document state at `snapshot_revision`, which may lag
/// `revision`: adapters are free to materialize snapshots lazily or never,
/// as long as the pair is read atomically. The authoritative state is
/// always `snapshot` plus the log tail `[snapshot_revision..revision)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Registry name of the document's OT type
    pub type_name: String,
    /// Count of committed operations
    pub revision: u64,
    /// Materialized snapshot at `snapshot_revision`
    pub snapshot: Value,
    /// Revision `snapshot` corresponds to
    pub snapshot_revision: u64,
}

/// Durable storage behind the server
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Load a document's record
    async fn get_record(&self, doc_id: &str) -> Result<DocumentRecord>;

    /// Operations at log indices `[start, end)`, oldest first; `end` of
    /// `None` means "to the tail"
    async fn get_history(&self, doc_id: &str, start: u64, end: Option<u64>) -> Result<Vec<Value>>;

    /// Atomically append `op` as the operation taking the document to
    /// `new_revision`.
    ///
    /// Must fail with [`OtError::ConcurrencyConflict`] unless the current
    /// revision is exactly `new_revision - 1`; on success the revision
    /// becomes `new_revision` and the op is appended, together or not at
    /// all.
    async fn save_operation(&self, doc_id: &str, op: &Value, new_revision: u64) -> Result<()>;

    /// Initialize a document with an empty log.
    ///
    /// Fails with [`OtError::ConcurrencyConflict`] if the document already
    /// exists (a concurrent writer initialized it first).
    async fn create_document(
        &self,
        doc_id: &str,
        type_name: &str,
        initial_snapshot: Value,
    ) -> Result<()>;

    /// Publish a payload to a fan-out channel. Optional; adapters without a
    /// broker report [`OtError::StorageUnavailable`].
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        let _ = (channel, payload);
        Err(OtError::StorageUnavailable(
            "fan-out is not supported by this adapter".to_string(),
        ))
    }

    /// Subscribe to a fan-out channel. Dropping the receiver unsubscribes.
    /// Optional, like [`BackendAdapter::publish`].
    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<Bytes>> {
        let _ = channel;
        Err(OtError::StorageUnavailable(
            "fan-out is not supported by this adapter".to_string(),
        ))
    }
}

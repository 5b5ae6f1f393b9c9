//! Reference in-memory adapter
//!
//! Stores the initial snapshot plus the append-only log and never
//! materializes snapshots on commit: every record it returns carries
//! `snapshot_revision = 0`, and readers reconstruct newer state by folding
//! the log. Optimistic locking is a compare-and-append under one mutex.
//!
//! Fan-out channels are `tokio::sync::broadcast`, one sender per channel
//! name, created on first use by either side.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{BackendAdapter, DocumentRecord};
use crate::error::{OtError, Result};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
struct StoredDocument {
    type_name: String,
    initial_snapshot: Value,
    log: Vec<Value>,
}

/// In-memory [`BackendAdapter`] for tests, examples, and single-process
/// deployments
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    docs: Mutex<HashMap<String, StoredDocument>>,
    channels: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
}

impl MemoryAdapter {
    /// Create an empty adapter
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Bytes> {
        let mut channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl BackendAdapter for MemoryAdapter {
    async fn get_record(&self, doc_id: &str) -> Result<DocumentRecord> {
        let docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        let doc = docs
            .get(doc_id)
            .ok_or_else(|| OtError::DocumentNotFound(doc_id.to_string()))?;
        Ok(DocumentRecord {
            type_name: doc.type_name.clone(),
            revision: doc.log.len() as u64,
            snapshot: doc.initial_snapshot.clone(),
            snapshot_revision: 0,
        })
    }

    async fn get_history(&self, doc_id: &str, start: u64, end: Option<u64>) -> Result<Vec<Value>> {
        let docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        let doc = docs
            .get(doc_id)
            .ok_or_else(|| OtError::DocumentNotFound(doc_id.to_string()))?;
        let len = doc.log.len();
        let start = (start as usize).min(len);
        let end = end.map_or(len, |e| (e as usize).min(len));
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(doc.log[start..end].to_vec())
    }

    async fn save_operation(&self, doc_id: &str, op: &Value, new_revision: u64) -> Result<()> {
        let mut docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        let doc = docs
            .get_mut(doc_id)
            .ok_or_else(|| OtError::DocumentNotFound(doc_id.to_string()))?;
        let current = doc.log.len() as u64;
        if new_revision != current + 1 {
            return Err(OtError::ConcurrencyConflict(current));
        }
        doc.log.push(op.clone());
        Ok(())
    }

    async fn create_document(
        &self,
        doc_id: &str,
        type_name: &str,
        initial_snapshot: Value,
    ) -> Result<()> {
        let mut docs = self.docs.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = docs.get(doc_id) {
            return Err(OtError::ConcurrencyConflict(existing.log.len() as u64));
        }
        docs.insert(
            doc_id.to_string(),
            StoredDocument {
                type_name: type_name.to_string(),
                initial_snapshot,
                log: Vec::new(),
            },
        );
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Bytes) -> Result<()> {
        // A send error only means nobody is subscribed right now
        let _ = self.sender_for(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<Bytes>> {
        Ok(self.sender_for(channel).subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_read_record() {
        let adapter = MemoryAdapter::new();
        adapter
            .create_document("doc", "text", json!(""))
            .await
            .unwrap();

        let record = adapter.get_record("doc").await.unwrap();
        assert_eq!(record.type_name, "text");
        assert_eq!(record.revision, 0);
        assert_eq!(record.snapshot, json!(""));
        assert_eq!(record.snapshot_revision, 0);
    }

    #[tokio::test]
    async fn test_create_existing_document_fails() {
        let adapter = MemoryAdapter::new();
        adapter
            .create_document("doc", "text", json!(""))
            .await
            .unwrap();

        assert!(matches!(
            adapter.create_document("doc", "text", json!("")).await,
            Err(OtError::ConcurrencyConflict(0))
        ));
    }

    #[tokio::test]
    async fn test_missing_document() {
        let adapter = MemoryAdapter::new();
        assert!(matches!(
            adapter.get_record("nope").await,
            Err(OtError::DocumentNotFound(_))
        ));
        assert!(matches!(
            adapter.get_history("nope", 0, None).await,
            Err(OtError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_optimistic_locking() {
        // S7: with one op committed, new_revision 3 is stale, 2 commits
        let adapter = MemoryAdapter::new();
        adapter
            .create_document("doc", "text", json!(""))
            .await
            .unwrap();
        adapter
            .save_operation("doc", &json!([{"i": "a"}]), 1)
            .await
            .unwrap();

        assert!(matches!(
            adapter.save_operation("doc", &json!([{"i": "b"}]), 3).await,
            Err(OtError::ConcurrencyConflict(1))
        ));
        adapter
            .save_operation("doc", &json!([{"i": "b"}]), 2)
            .await
            .unwrap();

        assert_eq!(adapter.get_record("doc").await.unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_history_slicing() {
        let adapter = MemoryAdapter::new();
        adapter
            .create_document("doc", "text", json!(""))
            .await
            .unwrap();
        for rev in 1..=4u64 {
            adapter
                .save_operation("doc", &json!([{ "i": format!("{rev}") }]), rev)
                .await
                .unwrap();
        }

        let tail = adapter.get_history("doc", 2, None).await.unwrap();
        assert_eq!(tail, vec![json!([{"i": "3"}]), json!([{"i": "4"}])]);

        let middle = adapter.get_history("doc", 1, Some(3)).await.unwrap();
        assert_eq!(middle, vec![json!([{"i": "2"}]), json!([{"i": "3"}])]);

        let beyond = adapter.get_history("doc", 9, None).await.unwrap();
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn test_fanout_roundtrip() {
        let adapter = MemoryAdapter::new();
        let mut rx = adapter.subscribe("doc").await.unwrap();

        adapter
            .publish("doc", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let adapter = MemoryAdapter::new();
        adapter
            .publish("doc", Bytes::from_static(b"hello"))
            .await
            .unwrap();
    }
}

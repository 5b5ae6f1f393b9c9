//! Authoritative server
//!
//! The server linearizes concurrent submissions against each document's
//! committed history. [`Server::submit`] is the whole write path:
//!
//! 1. load the record, look up the document's type,
//! 2. reject submissions from the future,
//! 3. catch the operation up against history since the client's revision
//!    (the client is the non-priority side: committed history wins ties),
//! 4. commit through the adapter's optimistic lock, retrying the whole
//!    catch-up a bounded number of times if another writer got there first.
//!
//! Catch-up is a pure function of `(op, client_revision, history)`, so a
//! retry after a lost commit race is always safe.
//!
//! The caller is responsible for broadcasting the committed operation to
//! the document's other subscribers, conventionally through the adapter's
//! fan-out channel.

pub mod registry;

use serde_json::Value;

use crate::error::{OtError, Result};
use crate::storage::BackendAdapter;
use crate::types::{OtType, Side};
use registry::TypeRegistry;

/// Tunables for the server write path
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// How many times a submission is re-caught-up after losing a commit
    /// race before the conflict is returned to the caller
    pub commit_retry_limit: u32,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            commit_retry_limit: 3,
        }
    }
}

/// A committed operation, as linearized by the server
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// The operation as committed (transformed against any concurrent
    /// history)
    pub op: Value,
    /// The revision the commit produced
    pub revision: u64,
}

/// The authoritative endpoint for a set of documents
pub struct Server<A: BackendAdapter> {
    adapter: A,
    registry: TypeRegistry,
    options: ServerOptions,
}

impl<A: BackendAdapter> Server<A> {
    /// Server with default options
    pub fn new(adapter: A) -> Self {
        Self::with_options(adapter, ServerOptions::default())
    }

    /// Server with explicit options
    pub fn with_options(adapter: A, options: ServerOptions) -> Self {
        Self {
            adapter,
            registry: TypeRegistry::new(),
            options,
        }
    }

    /// The backing adapter, e.g. for fan-out subscriptions
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Register an OT type. Re-registering the same type is idempotent;
    /// a different type under a taken name fails with
    /// [`OtError::TypeConflict`].
    pub fn register_type<T: OtType>(&self, ty: T) -> Result<()> {
        self.registry.register(ty)
    }

    /// Initialize a document of a registered type with an empty log
    pub async fn create_document(
        &self,
        doc_id: &str,
        type_name: &str,
        initial_snapshot: Value,
    ) -> Result<()> {
        let _ = self.registry.get(type_name)?;
        self.adapter
            .create_document(doc_id, type_name, initial_snapshot)
            .await
    }

    /// Linearize and commit a client submission authored at
    /// `client_revision`.
    ///
    /// Returns the operation as committed and the revision it produced;
    /// broadcasting it is the caller's job. Exact resubmission of an
    /// already-committed operation returns the original commit without
    /// committing twice.
    pub async fn submit(&self, doc_id: &str, op: Value, client_revision: u64) -> Result<Commit> {
        let mut attempt = 0u32;
        loop {
            match self.try_submit(doc_id, &op, client_revision).await {
                Err(OtError::ConcurrencyConflict(revision))
                    if attempt < self.options.commit_retry_limit =>
                {
                    attempt += 1;
                    tracing::debug!(doc_id, attempt, revision, "lost commit race; catching up again");
                }
                Err(e @ OtError::ConcurrencyConflict(_)) => {
                    tracing::warn!(doc_id, attempt, "commit retries exhausted");
                    return Err(e);
                }
                other => return other,
            }
        }
    }

    async fn try_submit(&self, doc_id: &str, op: &Value, client_revision: u64) -> Result<Commit> {
        let record = self.adapter.get_record(doc_id).await?;
        let ty = self.registry.get(&record.type_name)?;
        let server_revision = record.revision;

        if client_revision > server_revision {
            return Err(OtError::RevisionFromFuture {
                client: client_revision,
                server: server_revision,
            });
        }

        ty.validate(op)?;

        let mut transformed = op.clone();
        if client_revision < server_revision {
            let history = self
                .adapter
                .get_history(doc_id, client_revision, Some(server_revision))
                .await?;

            for (offset, past) in history.iter().enumerate() {
                // A reconnecting client repeats its in-flight submission.
                // Once the partially caught-up op equals a committed one,
                // that commit *was* this submission: hand it back instead
                // of committing twice.
                if *past == transformed {
                    return Ok(Commit {
                        op: transformed,
                        revision: client_revision + offset as u64 + 1,
                    });
                }
                transformed = ty.transform(&transformed, past, Side::Right)?;
            }
        }

        self.adapter
            .save_operation(doc_id, &transformed, server_revision + 1)
            .await?;

        Ok(Commit {
            op: transformed,
            revision: server_revision + 1,
        })
    }

    /// Materialize the document's current snapshot by folding the log tail
    /// over the stored snapshot. This feeds `init` messages for newly
    /// joining clients.
    pub async fn current_snapshot(&self, doc_id: &str) -> Result<(Value, u64)> {
        let record = self.adapter.get_record(doc_id).await?;
        let ty = self.registry.get(&record.type_name)?;
        let history = self
            .adapter
            .get_history(doc_id, record.snapshot_revision, Some(record.revision))
            .await?;

        let mut snapshot = record.snapshot;
        for op in &history {
            snapshot = ty.apply(&snapshot, op)?;
        }
        Ok((snapshot, record.revision))
    }
}

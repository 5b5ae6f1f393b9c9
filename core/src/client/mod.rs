//! Client synchronization state machine
//!
//! A [`Client`] tracks the local snapshot and revision of one document and
//! reconciles three event streams: local edits, server acknowledgments, and
//! remote operations the server committed for other clients. At most one
//! local operation is in flight at a time; further edits coalesce into a
//! buffer via `compose`.
//!
//! The machine never suspends. Outbound messages go through a non-blocking
//! channel; the [`Connection`](connection::Connection) driver pumps them
//! into the transport and feeds inbound frames back in.
//!
//! # States
//!
//! - `Synchronized` — no unacknowledged operation outstanding
//! - `AwaitingConfirm { pending }` — one operation sent, not yet acked
//! - `AwaitingWithBuffer { pending, buffer }` — one operation in flight,
//!   later edits composed into `buffer`
//!
//! # Invariant
//!
//! The local snapshot always equals the server's snapshot at the client's
//! revision with `pending` and then `buffer` applied on top.

pub mod connection;

use tokio::sync::mpsc;

use crate::error::{OtError, Result};
use crate::protocol::ClientMessage;
use crate::types::{OtType, Side};

/// Where the client is in the acknowledgment cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState<Op> {
    /// No unacknowledged operations outstanding
    Synchronized,
    /// One operation sent and awaiting acknowledgment
    AwaitingConfirm {
        /// The in-flight operation
        pending: Op,
    },
    /// One operation in flight, additional local edits coalesced
    AwaitingWithBuffer {
        /// The in-flight operation
        pending: Op,
        /// Local edits composed since `pending` was sent
        buffer: Op,
    },
}

impl<Op> SyncState<Op> {
    /// Whether no operation is outstanding
    pub fn is_synchronized(&self) -> bool {
        matches!(self, SyncState::Synchronized)
    }
}

/// Handle returned by [`Client::subscribe`]; pass it to
/// [`Client::unsubscribe`] to deregister the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener<T> = Box<dyn FnMut(&<T as OtType>::Snapshot) + Send>;

/// Client-side document replica
pub struct Client<T: OtType> {
    ot: T,
    snapshot: T::Snapshot,
    revision: u64,
    state: SyncState<T::Op>,
    outgoing: Option<mpsc::UnboundedSender<ClientMessage<T::Op>>>,
    listeners: Vec<(u64, Listener<T>)>,
    next_listener_id: u64,
}

impl<T: OtType> Client<T> {
    /// Construct a client in `Synchronized` at the given snapshot and
    /// revision, with no transport attached. Local edits made before a
    /// sender is attached stay pending and go out on the first
    /// [`Client::resend_pending`].
    pub fn new(ot: T, snapshot: T::Snapshot, revision: u64) -> Self {
        Self {
            ot,
            snapshot,
            revision,
            state: SyncState::Synchronized,
            outgoing: None,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    /// Current local snapshot
    pub fn snapshot(&self) -> &T::Snapshot {
        &self.snapshot
    }

    /// Revision of the last server operation this client has seen
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Current machine state
    pub fn state(&self) -> &SyncState<T::Op> {
        &self.state
    }

    /// Attach the outbound message channel the connection driver pumps
    /// into the transport
    pub fn attach_sender(&mut self, sender: mpsc::UnboundedSender<ClientMessage<T::Op>>) {
        self.outgoing = Some(sender);
    }

    /// Register a listener invoked synchronously after every snapshot
    /// mutation
    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&T::Snapshot) + Send + 'static,
    ) -> ListenerId {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        ListenerId(id)
    }

    /// Remove a listener; returns whether it was registered
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id.0);
        self.listeners.len() != before
    }

    /// Apply a local user edit.
    ///
    /// The edit is validated against the current snapshot, applied, and
    /// either sent (from `Synchronized`), held back as the buffer (from
    /// `AwaitingConfirm`), or composed into the existing buffer.
    pub fn apply_local(&mut self, op: T::Op) -> Result<()> {
        let next = self
            .ot
            .apply(&self.snapshot, &op)
            .map_err(|e| OtError::OpInvalid(e.to_string()))?;

        // Work the transition out before mutating anything: a failing
        // compose must leave snapshot and state exactly as they were.
        let (next_state, send) = match &self.state {
            SyncState::Synchronized => (
                SyncState::AwaitingConfirm {
                    pending: op.clone(),
                },
                true,
            ),
            SyncState::AwaitingConfirm { pending } => (
                SyncState::AwaitingWithBuffer {
                    pending: pending.clone(),
                    buffer: op.clone(),
                },
                false,
            ),
            SyncState::AwaitingWithBuffer { pending, buffer } => (
                SyncState::AwaitingWithBuffer {
                    pending: pending.clone(),
                    buffer: self.ot.compose(buffer, &op)?,
                },
                false,
            ),
        };

        self.snapshot = next;
        self.state = next_state;
        if send {
            self.send(ClientMessage::Op {
                op,
                revision: self.revision,
            });
        }
        self.notify();
        Ok(())
    }

    /// Handle the server's acknowledgment of the in-flight operation.
    ///
    /// Fails with [`OtError::UnexpectedAck`] in `Synchronized`; that means
    /// the server and client disagree about what is outstanding.
    pub fn on_server_ack(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SyncState::Synchronized) {
            SyncState::Synchronized => {
                tracing::error!("received ack with no operation outstanding");
                Err(OtError::UnexpectedAck)
            }
            SyncState::AwaitingConfirm { .. } => {
                self.revision += 1;
                Ok(())
            }
            SyncState::AwaitingWithBuffer { buffer, .. } => {
                self.revision += 1;
                self.send(ClientMessage::Op {
                    op: buffer.clone(),
                    revision: self.revision,
                });
                self.state = SyncState::AwaitingConfirm { pending: buffer };
                Ok(())
            }
        }
    }

    /// Handle a committed operation from another client.
    ///
    /// The server has already linearized `op`, so it keeps positional
    /// precedence: the incoming operation is transformed with [`Side::Left`]
    /// and the local `pending`/`buffer` yield with [`Side::Right`]. This
    /// mirrors the server's catch-up, so the rewritten `pending` is exactly
    /// the operation the server will commit for it.
    pub fn on_remote(&mut self, op: T::Op) -> Result<()> {
        // Every transform and apply runs before any mutation: an error on
        // this path leaves the machine untouched.
        let (snapshot, next_state) = match &self.state {
            SyncState::Synchronized => (
                self.ot.apply(&self.snapshot, &op)?,
                SyncState::Synchronized,
            ),
            SyncState::AwaitingConfirm { pending } => {
                let transformed = self.ot.transform(&op, pending, Side::Left)?;
                let pending = self.ot.transform(pending, &op, Side::Right)?;
                (
                    self.ot.apply(&self.snapshot, &transformed)?,
                    SyncState::AwaitingConfirm { pending },
                )
            }
            SyncState::AwaitingWithBuffer { pending, buffer } => {
                let past_pending = self.ot.transform(&op, pending, Side::Left)?;
                let pending = self.ot.transform(pending, &op, Side::Right)?;
                let past_buffer = self.ot.transform(&past_pending, buffer, Side::Left)?;
                let buffer = self.ot.transform(buffer, &past_pending, Side::Right)?;
                (
                    self.ot.apply(&self.snapshot, &past_buffer)?,
                    SyncState::AwaitingWithBuffer { pending, buffer },
                )
            }
        };

        self.snapshot = snapshot;
        self.state = next_state;
        self.revision += 1;
        self.notify();
        Ok(())
    }

    /// Reset to a fresh server snapshot; the recovery path after the client
    /// state is known to be unusable
    pub fn on_init(&mut self, snapshot: T::Snapshot, revision: u64) {
        self.snapshot = snapshot;
        self.revision = revision;
        self.state = SyncState::Synchronized;
        self.notify();
    }

    /// Re-send the in-flight operation, e.g. after a reconnect. The server
    /// recognizes an exact resubmission of an already-committed operation
    /// and does not commit it twice.
    pub fn resend_pending(&mut self) {
        let pending = match &self.state {
            SyncState::Synchronized => return,
            SyncState::AwaitingConfirm { pending } => pending.clone(),
            SyncState::AwaitingWithBuffer { pending, .. } => pending.clone(),
        };
        self.send(ClientMessage::Op {
            op: pending,
            revision: self.revision,
        });
    }

    fn send(&self, msg: ClientMessage<T::Op>) {
        if let Some(tx) = &self.outgoing {
            if tx.send(msg).is_err() {
                tracing::warn!("outbound channel closed; operation stays pending until reconnect");
            }
        }
    }

    fn notify(&mut self) {
        let Self {
            snapshot, listeners, ..
        } = self;
        for (_, listener) in listeners.iter_mut() {
            listener(snapshot);
        }
    }
}

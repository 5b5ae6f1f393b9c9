//! Transport-driving connection
//!
//! [`Connection`] wires a [`Client`] to a [`Transport`]: it registers the
//! receive callback, spawns the outbound pump, and translates between wire
//! frames and state machine calls. The state machine itself never
//! suspends; all awaiting happens here, at the transport boundary.
//!
//! Protocol checks live at this seam too: an undecodable frame, an ack
//! with nothing outstanding, or a remote operation whose revision is not
//! exactly `client.revision() + 1` indicates a server or transport bug.
//! Those are logged at error level and dropped rather than being allowed
//! to corrupt the replica.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Client;
use crate::error::Result;
use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::transport::{ReceiveHandler, Transport};
use crate::types::OtType;

/// A client attached to a live transport
pub struct Connection<T: OtType> {
    client: Arc<Mutex<Client<T>>>,
    transport: Arc<dyn Transport>,
    pump: JoinHandle<()>,
}

impl<T: OtType> Connection<T> {
    /// Attach `client` to `transport` and connect.
    ///
    /// If the client already has an operation in flight (e.g. edits were
    /// made before the transport came up, or this is a reconnect), it is
    /// resent as soon as the transport reports connected. The server
    /// recognizes exact resubmissions, so this is safe.
    pub async fn connect(mut client: Client<T>, transport: Arc<dyn Transport>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<ClientMessage<T::Op>>();
        client.attach_sender(tx);
        let client = Arc::new(Mutex::new(client));

        let inbound = Arc::clone(&client);
        let handler: ReceiveHandler = Box::new(move |frame: Bytes| {
            match protocol::decode::<ServerMessage<T::Op, T::Snapshot>>(&frame) {
                Ok(msg) => dispatch(&inbound, msg),
                Err(e) => tracing::error!(error = %e, "dropping undecodable frame"),
            }
        });
        transport.connect(handler).await?;

        let pump = spawn_pump(rx, Arc::clone(&transport));

        let connection = Self {
            client,
            transport,
            pump,
        };
        connection.resend_pending();
        Ok(connection)
    }

    /// Apply a local edit through the attached client
    pub fn apply_local(&self, op: T::Op) -> Result<()> {
        self.lock().apply_local(op)
    }

    /// Current local snapshot
    pub fn snapshot(&self) -> T::Snapshot {
        self.lock().snapshot().clone()
    }

    /// Revision of the last server operation the client has seen
    pub fn revision(&self) -> u64 {
        self.lock().revision()
    }

    /// Whether no local operation is outstanding
    pub fn is_synchronized(&self) -> bool {
        self.lock().state().is_synchronized()
    }

    /// The shared client, for listener registration and direct inspection
    pub fn client(&self) -> Arc<Mutex<Client<T>>> {
        Arc::clone(&self.client)
    }

    /// Repeat the in-flight operation; call after the transport reports a
    /// reconnect
    pub fn resend_pending(&self) {
        self.lock().resend_pending();
    }

    /// Stop the outbound pump and tear the transport down
    pub async fn disconnect(self) -> Result<()> {
        self.pump.abort();
        self.transport.disconnect().await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Client<T>> {
        self.client.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn spawn_pump<Op>(
    mut rx: mpsc::UnboundedReceiver<ClientMessage<Op>>,
    transport: Arc<dyn Transport>,
) -> JoinHandle<()>
where
    Op: serde::Serialize + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match protocol::encode(&msg) {
                Ok(frame) => {
                    if let Err(e) = transport.send(frame).await {
                        // The state machine keeps the op pending; it goes
                        // out again via resend_pending after reconnect.
                        tracing::warn!(error = %e, "send failed");
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to encode outbound message"),
            }
        }
    })
}

fn dispatch<T: OtType>(client: &Arc<Mutex<Client<T>>>, msg: ServerMessage<T::Op, T::Snapshot>) {
    let mut client = client.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    match msg {
        ServerMessage::Ack => {
            if let Err(e) = client.on_server_ack() {
                tracing::error!(error = %e, "protocol violation");
            }
        }
        ServerMessage::Op { op, revision } => {
            let expected = client.revision() + 1;
            if revision != expected {
                tracing::error!(revision, expected, "out-of-order remote operation dropped");
                return;
            }
            if let Err(e) = client.on_remote(op) {
                tracing::error!(error = %e, "failed to apply remote operation");
            }
        }
        ServerMessage::Init { snapshot, revision } => client.on_init(snapshot, revision),
        ServerMessage::Timeout { suggest_polling } => {
            tracing::debug!(suggest_polling, "transport timeout hint");
        }
    }
}

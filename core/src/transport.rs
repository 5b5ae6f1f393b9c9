//! Transport contract
//!
//! Concrete transports (WebSocket, SSE, long-polling, …) live outside the
//! core; the engine only requires this narrow interface plus one delivery
//! guarantee: **frames for a given document arrive in FIFO order**.
//! Out-of-order delivery breaks convergence and is the transport's
//! responsibility to prevent.
//!
//! Frames are opaque [`Bytes`]; the connection driver encodes and decodes
//! wire messages at this seam (JSON by convention, see
//! [`crate::protocol`]).

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Callback invoked for every inbound frame
pub type ReceiveHandler = Box<dyn Fn(Bytes) + Send + Sync>;

/// A bidirectional, in-order frame pipe to the server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection and register the inbound frame handler.
    ///
    /// Implementations that reconnect internally must keep delivering
    /// through the same handler.
    async fn connect(&self, on_receive: ReceiveHandler) -> Result<()>;

    /// Send one frame
    async fn send(&self, frame: Bytes) -> Result<()>;

    /// Tear the connection down
    async fn disconnect(&self) -> Result<()>;
}

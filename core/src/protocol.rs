//! Wire message schema
//!
//! Messages are internally tagged variants; JSON is the conventional
//! encoding and the one the frame helpers here produce. The transport is
//! free to choose another encoding as long as both ends agree and
//! per-document FIFO order is preserved.
//!
//! ```text
//! client -> server   { "type": "op", "op": [...], "revision": 3 }
//! server -> client   { "type": "ack" }
//!                    { "type": "op", "op": [...], "revision": 4 }
//!                    { "type": "init", "snapshot": ..., "revision": 4 }
//!                    { "type": "timeout", "suggestPolling": true }
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Messages a client sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage<Op> {
    /// Submit an operation authored against `revision`
    Op { op: Op, revision: u64 },
}

/// Messages the server sends to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage<Op, S> {
    /// The client's in-flight operation was committed
    Ack,
    /// Another client's operation was committed at `revision`
    Op { op: Op, revision: u64 },
    /// Full document state; resets the client
    Init { snapshot: S, revision: u64 },
    /// Transport-specific hint that the connection went quiet
    Timeout {
        #[serde(rename = "suggestPolling")]
        suggest_polling: bool,
    },
}

/// Encode a message as a JSON frame
pub fn encode<M: Serialize>(msg: &M) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(msg)?))
}

/// Decode a JSON frame
pub fn decode<M: DeserializeOwned>(frame: &[u8]) -> Result<M> {
    Ok(serde_json::from_slice(frame)?)
}

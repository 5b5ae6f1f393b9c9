//! OpenOT Core - Operational Transformation engine
//!
//! This is the Rust core of OpenOT, a framework for real-time
//! collaborative editing. It implements:
//! - The text OT algebra (Retain/Insert/Delete operations with apply,
//!   transform, and compose satisfying the TP1 convergence property)
//! - The client synchronization state machine (pending/buffer coalescing)
//! - The authoritative server (catch-up against committed history, commits
//!   under optimistic locking)
//! - The adapter and transport contracts the above are generic over
//!
//! # Examples
//!
//! ```rust
//! use openot_core::{Client, Operation, TextType};
//!
//! let mut client = Client::new(TextType::new(), "Hello".to_string(), 0);
//! let mut edit = Operation::new();
//! edit.retain(5);
//! edit.insert(" World");
//! client.apply_local(edit).unwrap();
//!
//! assert_eq!(client.snapshot(), "Hello World");
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod text;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::connection::Connection;
pub use client::{Client, ListenerId, SyncState};
pub use error::{OtError, Result};
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{Commit, Server, ServerOptions};
pub use storage::{BackendAdapter, DocumentRecord, MemoryAdapter};
pub use text::{Component, Operation, TextType};
pub use transport::{ReceiveHandler, Transport};
pub use types::{OtType, Side};

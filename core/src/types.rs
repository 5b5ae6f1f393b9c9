//! The OT type contract
//!
//! An OT type supplies the three operators the engine is parameterized over:
//! `apply`, `transform`, and `compose`. Everything else — client-side
//! buffering, server-side linearization, persistence — is generic over this
//! trait. The built-in [`TextType`](crate::text::TextType) is the reference
//! implementation; the server additionally works with types through an
//! erased vtable (see [`crate::server::registry`]).

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Which operand wins positional ties during `transform`.
///
/// The caller designates one operand as the priority ("left") side. When two
/// concurrent operations insert at the same position, the left side's insert
/// lands first. The engine's overall discipline is server-wins-on-ties: the
/// server transforms incoming submissions with committed history as the
/// priority side, and the client mirrors that when reconciling remote
/// operations against its own pending edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// This operand keeps positional precedence on ties
    Left,
    /// This operand yields positional precedence on ties
    Right,
}

/// A user-defined data model with OT operators.
///
/// Implementations must be pure: `apply`, `transform`, and `compose` are
/// deterministic functions of their arguments, and `transform` must satisfy
/// the TP1 convergence property
///
/// ```text
/// apply(apply(s, a), transform(b, a, Right)) ==
/// apply(apply(s, b), transform(a, b, Left))
/// ```
///
/// for any two operations `a`, `b` authored against the same snapshot `s`.
///
/// The serde bounds exist because operations and snapshots cross the wire
/// and the server's storage boundary as JSON; `Op: PartialEq` lets the
/// server recognize an exact resubmission of an already-committed operation.
pub trait OtType: Send + Sync + 'static {
    /// Document state at a revision
    type Snapshot: Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// An edit of a snapshot
    type Op: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Registry key for this type
    fn name(&self) -> &'static str;

    /// Apply `op` to `snapshot`, producing the next snapshot.
    ///
    /// This is also the validation path: a malformed or out-of-bounds
    /// operation is rejected here and nowhere else.
    fn apply(&self, snapshot: &Self::Snapshot, op: &Self::Op) -> Result<Self::Snapshot>;

    /// Combine `a` followed by `b` into a single equivalent operation
    fn compose(&self, a: &Self::Op, b: &Self::Op) -> Result<Self::Op>;

    /// Rewrite `a` to apply after concurrent `b`.
    ///
    /// `side` says whether `a` keeps positional precedence on ties.
    fn transform(&self, a: &Self::Op, b: &Self::Op, side: Side) -> Result<Self::Op>;

    /// Check an operation's well-formedness without a snapshot.
    ///
    /// The server calls this on every submission before committing; the
    /// default accepts everything that decoded.
    fn validate(&self, op: &Self::Op) -> Result<()> {
        let _ = op;
        Ok(())
    }

    /// Inverse of `op` relative to the snapshot it was applied to.
    ///
    /// Optional; types without an inverter return `None` and the engine
    /// offers no undo support for them.
    fn invert(&self, snapshot: &Self::Snapshot, op: &Self::Op) -> Option<Self::Op> {
        let _ = (snapshot, op);
        None
    }
}

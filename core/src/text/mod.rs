//! The built-in plain-text OT type
//!
//! Snapshots are immutable `String`s; operations are Retain/Insert/Delete
//! component sequences. The algebra lives on [`Operation`]; [`TextType`]
//! wraps it behind the [`OtType`] contract and owns the validation policy.
//!
//! # Unit of length
//!
//! All sizes — component sizes, snapshot lengths, bounds checks — are
//! measured in **Unicode scalar values** (Rust `char`s), not bytes, UTF-16
//! code units, or grapheme clusters. Every peer of a document must count in
//! the same unit, otherwise concurrent edits stop converging.

mod component;
mod operation;

pub use component::Component;
pub use operation::Operation;

use crate::error::{OtError, Result};
use crate::types::{OtType, Side};

/// Plain-text OT type.
///
/// `TextType::new()` applies operations leniently: input left over after the
/// last component is copied through unchanged, as if the operation ended
/// with a retain. `TextType::strict()` instead requires every operation to
/// span its snapshot exactly, which catches length-accounting bugs in
/// clients early. Both reject non-normalized operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextType {
    strict: bool,
}

impl TextType {
    /// Lenient text type (implicit final retain)
    pub fn new() -> Self {
        Self { strict: false }
    }

    /// Strict text type: operations must consume their snapshot exactly
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

impl OtType for TextType {
    type Snapshot = String;
    type Op = Operation;

    fn name(&self) -> &'static str {
        "text"
    }

    fn apply(&self, snapshot: &String, op: &Operation) -> Result<String> {
        self.validate(op)?;
        if self.strict {
            let length = snapshot.chars().count();
            if op.base_len() != length {
                return Err(OtError::OpOutOfBounds {
                    index: op.base_len(),
                    length,
                });
            }
        }
        op.apply(snapshot)
    }

    fn validate(&self, op: &Operation) -> Result<()> {
        if !op.is_normalized() {
            return Err(OtError::OpMalformed(
                "operation is not normalized".to_string(),
            ));
        }
        Ok(())
    }

    fn compose(&self, a: &Operation, b: &Operation) -> Result<Operation> {
        Ok(a.compose(b))
    }

    fn transform(&self, a: &Operation, b: &Operation, side: Side) -> Result<Operation> {
        Ok(a.transform(b, side))
    }

    fn invert(&self, snapshot: &String, op: &Operation) -> Option<Operation> {
        op.invert(snapshot).ok()
    }
}

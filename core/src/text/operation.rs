//! Text operations and the three OT operators
//!
//! An [`Operation`] is an ordered sequence of [`Component`]s describing an
//! edit of a snapshot. All construction goes through normalizing appends,
//! so operations built with [`Operation::retain`], [`Operation::insert`],
//! and [`Operation::delete`] are canonical by construction: no zero-sized
//! components, no two consecutive components of the same variant.
//!
//! The operators implemented here carry the engine:
//!
//! - [`Operation::apply`] replays the edit against a snapshot,
//! - [`Operation::compose`] merges two sequential edits into one,
//! - [`Operation::transform`] rewrites an edit to apply after a concurrent
//!   one, preserving the TP1 convergence property,
//! - [`Operation::invert`] derives the undo edit relative to a snapshot.
//!
//! `apply` is lenient: input remaining after the last component is copied
//! through unchanged, as if the operation ended with an implicit retain.
//! Strict span checking is a policy of [`TextType`](super::TextType).

use serde::{Deserialize, Serialize};

use super::component::Component;
use crate::error::{OtError, Result};
use crate::types::Side;

/// An edit of a text snapshot
///
/// Serializes as a bare array of components (`[{"r":5},{"i":" World"}]`),
/// matching the wire schema.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation {
    components: Vec<Component>,
}

impl Operation {
    /// The empty operation (identity under `apply` and `compose`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an operation from raw components, e.g. as decoded from the
    /// wire. The result may be non-normalized; [`Operation::apply`] via the
    /// type seam rejects such operations, [`Operation::normalize`] repairs
    /// them.
    pub fn from_components(components: Vec<Component>) -> Self {
        Self { components }
    }

    /// The components of this operation
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Whether this operation has no components
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Append a retain, merging with a trailing retain
    pub fn retain(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(Component::Retain(last)) = self.components.last_mut() {
            *last += n;
            return;
        }
        self.components.push(Component::Retain(n));
    }

    /// Append an insert, merging with a trailing insert
    pub fn insert(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Component::Insert(last)) = self.components.last_mut() {
            last.push_str(text);
            return;
        }
        self.components.push(Component::Insert(text.to_string()));
    }

    /// Append a delete, merging with a trailing delete
    pub fn delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(Component::Delete(last)) = self.components.last_mut() {
            *last += n;
            return;
        }
        self.components.push(Component::Delete(n));
    }

    /// Units of the base snapshot this operation consumes (retains plus
    /// deletes)
    pub fn base_len(&self) -> usize {
        self.components
            .iter()
            .map(|c| match c {
                Component::Retain(n) | Component::Delete(n) => *n,
                Component::Insert(_) => 0,
            })
            .sum()
    }

    /// Units of the result snapshot this operation produces (retains plus
    /// inserts)
    pub fn target_len(&self) -> usize {
        self.components
            .iter()
            .map(|c| match c {
                Component::Retain(n) => *n,
                Component::Insert(s) => s.chars().count(),
                Component::Delete(_) => 0,
            })
            .sum()
    }

    /// Whether this operation is canonical: no zero-sized or empty
    /// components, no two consecutive components of the same variant
    pub fn is_normalized(&self) -> bool {
        let mut prev: Option<&Component> = None;
        for component in &self.components {
            if component.is_empty() {
                return false;
            }
            if let Some(p) = prev {
                if p.same_kind(component) {
                    return false;
                }
            }
            prev = Some(component);
        }
        true
    }

    /// Canonical form of this operation
    pub fn normalize(&self) -> Operation {
        let mut out = Operation::new();
        for component in &self.components {
            match component {
                Component::Retain(n) => out.retain(*n),
                Component::Insert(s) => out.insert(s),
                Component::Delete(n) => out.delete(*n),
            }
        }
        out
    }

    /// Apply this operation to a snapshot.
    ///
    /// Scans the components left to right over the snapshot's scalar
    /// values. Input remaining after the last component is copied through
    /// unchanged. Fails with [`OtError::OpOutOfBounds`] if a retain or
    /// delete would run past the end of the snapshot.
    pub fn apply(&self, snapshot: &str) -> Result<String> {
        let length = snapshot.chars().count();
        let mut input = snapshot.chars();
        let mut out = String::with_capacity(snapshot.len());
        let mut consumed = 0usize;

        for component in &self.components {
            match component {
                Component::Retain(n) => {
                    if consumed + n > length {
                        return Err(OtError::OpOutOfBounds {
                            index: consumed + n,
                            length,
                        });
                    }
                    out.extend(input.by_ref().take(*n));
                    consumed += n;
                }
                Component::Insert(s) => out.push_str(s),
                Component::Delete(n) => {
                    if consumed + n > length {
                        return Err(OtError::OpOutOfBounds {
                            index: consumed + n,
                            length,
                        });
                    }
                    for _ in input.by_ref().take(*n) {}
                    consumed += n;
                }
            }
        }

        // Implicit final retain
        out.extend(input);
        Ok(out)
    }

    /// Produce an operation equivalent to applying `self` then `other`.
    ///
    /// Never fails on well-formed inputs: when either side runs out of
    /// components, an implicit infinite retain substitutes for it.
    pub fn compose(&self, other: &Operation) -> Operation {
        let mut out = Operation::new();
        let mut a = Cursor::new(self);
        let mut b = Cursor::new(other);

        loop {
            let pa = a.peek();
            let pb = b.peek();
            match (pa, pb) {
                // Deletes by `self` act on text `other` never sees
                (Some(Piece::Delete(n)), _) => {
                    out.delete(n);
                    a.consume(n);
                }
                // Inserts by `other` are new text `self` never saw
                (_, Some(Piece::Insert(s, m))) => {
                    out.insert(s);
                    b.consume(m);
                }
                (None, None) => break,
                (Some(Piece::Retain(n)), None) => {
                    out.retain(n);
                    a.consume(n);
                }
                (Some(Piece::Insert(s, n)), None) => {
                    out.insert(s);
                    a.consume(n);
                }
                (None, Some(Piece::Retain(m))) => {
                    out.retain(m);
                    b.consume(m);
                }
                (None, Some(Piece::Delete(m))) => {
                    out.delete(m);
                    b.consume(m);
                }
                (Some(Piece::Retain(n)), Some(Piece::Retain(m))) => {
                    let k = n.min(m);
                    out.retain(k);
                    a.consume(k);
                    b.consume(k);
                }
                (Some(Piece::Retain(n)), Some(Piece::Delete(m))) => {
                    let k = n.min(m);
                    out.delete(k);
                    a.consume(k);
                    b.consume(k);
                }
                (Some(Piece::Insert(s, n)), Some(Piece::Retain(m))) => {
                    let k = n.min(m);
                    out.insert(take_chars(s, k));
                    a.consume(k);
                    b.consume(k);
                }
                // Insert then delete of the same text cancels out
                (Some(Piece::Insert(_, n)), Some(Piece::Delete(m))) => {
                    let k = n.min(m);
                    a.consume(k);
                    b.consume(k);
                }
            }
        }

        out
    }

    /// Rewrite this operation to apply after concurrent `other`.
    ///
    /// `side` breaks insert-vs-insert ties: with [`Side::Left`] this
    /// operation's insert lands first, with [`Side::Right`] it yields to
    /// `other`'s. An insert positioned inside a range `other` deletes
    /// survives bare: the retains around it collapse against the deletion.
    pub fn transform(&self, other: &Operation, side: Side) -> Operation {
        let mut out = Operation::new();
        let mut a = Cursor::new(self);
        let mut b = Cursor::new(other);

        loop {
            let pa = a.peek();
            let pb = b.peek();
            match (pa, pb) {
                (Some(Piece::Insert(s, n)), Some(Piece::Insert(_, m))) => match side {
                    Side::Left => {
                        out.insert(s);
                        a.consume(n);
                    }
                    Side::Right => {
                        out.retain(m);
                        b.consume(m);
                    }
                },
                (Some(Piece::Insert(s, n)), _) => {
                    out.insert(s);
                    a.consume(n);
                }
                (_, Some(Piece::Insert(_, m))) => {
                    out.retain(m);
                    b.consume(m);
                }
                (None, None) => break,
                (Some(Piece::Retain(n)), None) => {
                    out.retain(n);
                    a.consume(n);
                }
                (Some(Piece::Delete(n)), None) => {
                    out.delete(n);
                    a.consume(n);
                }
                (None, Some(Piece::Retain(m))) => {
                    out.retain(m);
                    b.consume(m);
                }
                (None, Some(Piece::Delete(m))) => {
                    b.consume(m);
                }
                (Some(Piece::Retain(n)), Some(Piece::Retain(m))) => {
                    let k = n.min(m);
                    out.retain(k);
                    a.consume(k);
                    b.consume(k);
                }
                (Some(Piece::Delete(n)), Some(Piece::Retain(m))) => {
                    let k = n.min(m);
                    out.delete(k);
                    a.consume(k);
                    b.consume(k);
                }
                // `other` already removed this text
                (Some(Piece::Retain(n)), Some(Piece::Delete(m))) => {
                    let k = n.min(m);
                    a.consume(k);
                    b.consume(k);
                }
                // Both deleted it; once is enough
                (Some(Piece::Delete(n)), Some(Piece::Delete(m))) => {
                    let k = n.min(m);
                    a.consume(k);
                    b.consume(k);
                }
            }
        }

        out
    }

    /// The inverse of this operation relative to the snapshot it was
    /// applied to: retains stay, inserts become deletes, deletes become
    /// inserts of the removed text.
    pub fn invert(&self, snapshot: &str) -> Result<Operation> {
        let length = snapshot.chars().count();
        let mut input = snapshot.chars();
        let mut inverse = Operation::new();
        let mut consumed = 0usize;

        for component in &self.components {
            match component {
                Component::Retain(n) => {
                    if consumed + n > length {
                        return Err(OtError::OpOutOfBounds {
                            index: consumed + n,
                            length,
                        });
                    }
                    for _ in input.by_ref().take(*n) {}
                    consumed += n;
                    inverse.retain(*n);
                }
                Component::Insert(s) => inverse.delete(s.chars().count()),
                Component::Delete(n) => {
                    if consumed + n > length {
                        return Err(OtError::OpOutOfBounds {
                            index: consumed + n,
                            length,
                        });
                    }
                    let removed: String = input.by_ref().take(*n).collect();
                    consumed += n;
                    inverse.insert(&removed);
                }
            }
        }

        Ok(inverse)
    }
}

/// The unconsumed remainder of a component, viewed by a [`Cursor`]
#[derive(Debug, Clone, Copy)]
enum Piece<'a> {
    Retain(usize),
    /// Remaining text and its length in scalar values
    Insert(&'a str, usize),
    Delete(usize),
}

/// Walks an operation's components with intra-component offsets, so the
/// operator loops can consume matching spans from two operations at once.
struct Cursor<'a> {
    components: std::slice::Iter<'a, Component>,
    current: Option<Piece<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(op: &'a Operation) -> Self {
        let mut cursor = Cursor {
            components: op.components.iter(),
            current: None,
        };
        cursor.next_component();
        cursor
    }

    fn next_component(&mut self) {
        self.current = self.components.next().map(|c| match c {
            Component::Retain(n) => Piece::Retain(*n),
            Component::Insert(s) => Piece::Insert(s.as_str(), s.chars().count()),
            Component::Delete(n) => Piece::Delete(*n),
        });
    }

    fn peek(&self) -> Option<Piece<'a>> {
        self.current
    }

    /// Consume `units` from the current piece, pulling the next component
    /// once the piece is exhausted. Consuming from an exhausted cursor is a
    /// no-op (the implicit infinite retain).
    fn consume(&mut self, units: usize) {
        match self.current.take() {
            Some(Piece::Retain(n)) if n > units => {
                self.current = Some(Piece::Retain(n - units));
            }
            Some(Piece::Delete(n)) if n > units => {
                self.current = Some(Piece::Delete(n - units));
            }
            Some(Piece::Insert(s, n)) if n > units => {
                self.current = Some(Piece::Insert(skip_chars(s, units), n - units));
            }
            Some(_) => self.next_component(),
            None => {}
        }
    }
}

/// The prefix of `s` holding its first `n` scalar values
fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// `s` without its first `n` scalar values
fn skip_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[i..],
        None => "",
    }
}

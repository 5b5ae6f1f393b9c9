//! Operation components
//!
//! A component is one step of an edit: pass units through unchanged, insert
//! new text, or remove units. Sizes are measured in Unicode scalar values
//! (see [`TextType`](super::TextType) for the unit contract).
//!
//! The wire form is a single-key object: `{"r": n}`, `{"i": "s"}`, or
//! `{"d": n}`. Decoding rejects objects that carry more than one of the
//! three keys, none of them, a non-positive size, or an empty insert.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One step of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// Pass `n` units of the snapshot through unchanged
    Retain(usize),
    /// Insert the given text
    Insert(String),
    /// Remove `n` units of the snapshot
    Delete(usize),
}

impl Component {
    /// Size of this component in scalar values
    pub fn len(&self) -> usize {
        match self {
            Component::Retain(n) | Component::Delete(n) => *n,
            Component::Insert(s) => s.chars().count(),
        }
    }

    /// Whether this component has no effect and no extent
    pub fn is_empty(&self) -> bool {
        match self {
            Component::Retain(n) | Component::Delete(n) => *n == 0,
            Component::Insert(s) => s.is_empty(),
        }
    }

    /// Whether `other` is the same variant (used when merging adjacent
    /// components during normalization)
    pub fn same_kind(&self, other: &Component) -> bool {
        matches!(
            (self, other),
            (Component::Retain(_), Component::Retain(_))
                | (Component::Insert(_), Component::Insert(_))
                | (Component::Delete(_), Component::Delete(_))
        )
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Retain(n) => write!(f, "retain {}", n),
            Component::Insert(s) => write!(f, "insert {:?}", s),
            Component::Delete(n) => write!(f, "delete {}", n),
        }
    }
}

impl Serialize for Component {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Component::Retain(n) => map.serialize_entry("r", n)?,
            Component::Insert(s) => map.serialize_entry("i", s)?,
            Component::Delete(n) => map.serialize_entry("d", n)?,
        }
        map.end()
    }
}

const COMPONENT_KEYS: &[&str] = &["r", "i", "d"];

struct ComponentVisitor;

impl<'de> Visitor<'de> for ComponentVisitor {
    type Value = Component;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "an object with exactly one of the keys \"r\", \"i\", \"d\"")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Component, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut component: Option<Component> = None;

        while let Some(key) = map.next_key::<String>()? {
            let parsed = match key.as_str() {
                "r" => {
                    let n: u64 = map.next_value()?;
                    if n == 0 {
                        return Err(de::Error::custom("retain size must be positive"));
                    }
                    Component::Retain(n as usize)
                }
                "i" => {
                    let s: String = map.next_value()?;
                    if s.is_empty() {
                        return Err(de::Error::custom("insert text must be nonempty"));
                    }
                    Component::Insert(s)
                }
                "d" => {
                    let n: u64 = map.next_value()?;
                    if n == 0 {
                        return Err(de::Error::custom("delete size must be positive"));
                    }
                    Component::Delete(n as usize)
                }
                other => return Err(de::Error::unknown_field(other, COMPONENT_KEYS)),
            };

            if component.replace(parsed).is_some() {
                return Err(de::Error::custom(
                    "component carries more than one of \"r\", \"i\", \"d\"",
                ));
            }
        }

        component.ok_or_else(|| de::Error::custom("component carries none of \"r\", \"i\", \"d\""))
    }
}

impl<'de> Deserialize<'de> for Component {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ComponentVisitor)
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Largest integer a JSON number can carry without losing precision.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Scalar value carried in component ids, endpoints, and properties.
///
/// Serializes untagged so the wire sees plain JSON scalars (and their
/// `MsgPack` equivalents), matching what the remote store indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
}

impl Value {
    /// Returns the value as a wire id if it is a non-negative integer.
    ///
    /// Floats are accepted when they hold an exact integer within the safe
    /// JSON range, since a JSON number `5.0` names the same id as `5`.
    /// Strings are never ids, even when they contain digits.
    ///
    /// # Examples
    ///
    /// ```
    /// use graphbulk_core::Value;
    ///
    /// assert_eq!(Value::Int(7).as_wire_id(), Some(7));
    /// assert_eq!(Value::Float(7.0).as_wire_id(), Some(7));
    /// assert_eq!(Value::Int(-1).as_wire_id(), None);
    /// assert_eq!(Value::String("7".into()).as_wire_id(), None);
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn as_wire_id(&self) -> Option<u64> {
        match self {
            Self::Int(n) => u64::try_from(*n).ok(),
            Self::Float(f)
                if f.is_finite()
                    && *f >= 0.0
                    && f.fract() == 0.0
                    && *f <= MAX_SAFE_INTEGER as f64 =>
            {
                Some(*f as u64)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Graph component kind. The wire names are the single-letter type names
/// the remote store uses for its document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    #[serde(rename = "g")]
    Graph,
    #[serde(rename = "v")]
    Vertex,
    #[serde(rename = "e")]
    Edge,
}

impl ComponentKind {
    /// Wire type name for this kind.
    #[must_use]
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Graph => "g",
            Self::Vertex => "v",
            Self::Edge => "e",
        }
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "g" | "graph" => Ok(Self::Graph),
            "v" | "vertex" => Ok(Self::Vertex),
            "e" | "edge" => Ok(Self::Edge),
            other => Err(format!("unknown component kind: {other}")),
        }
    }
}

/// Whether an operation writes or removes a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    #[default]
    Persist,
    Destroy,
}

impl OpKind {
    /// RPC action name used when the operation is sent on its own rather
    /// than inside a bulk envelope.
    #[must_use]
    pub fn action(self) -> &'static str {
        match self {
            Self::Persist => crate::messages::actions::PERSIST,
            Self::Destroy => crate::messages::actions::DESTROY,
        }
    }
}

impl FromStr for OpKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "persist" => Ok(Self::Persist),
            "destroy" => Ok(Self::Destroy),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}

/// Identifier of one record inside a source collection.
///
/// Keys arrive as JSON object keys, so they are always strings on disk;
/// keys that parse as integers become [`EntityKey::Int`] and take part in
/// offset arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Int(i64),
    Str(String),
}

impl EntityKey {
    /// Classifies a raw key.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(n) => Self::Int(n),
            Err(_) => Self::Str(raw.to_string()),
        }
    }

    /// Maps the key into the source's id-space by adding `offset`.
    ///
    /// Non-numeric keys and sums that overflow are carried through as
    /// strings, which the bulk envelope later rejects as non-integer ids.
    ///
    /// # Examples
    ///
    /// ```
    /// use graphbulk_core::{EntityKey, Value};
    ///
    /// assert_eq!(EntityKey::parse("4").to_wire_id(100), Value::Int(104));
    /// assert_eq!(
    ///     EntityKey::parse("abc").to_wire_id(100),
    ///     Value::String("abc".into())
    /// );
    /// ```
    #[must_use]
    pub fn to_wire_id(&self, offset: i64) -> Value {
        match self {
            Self::Int(n) => match n.checked_add(offset) {
                Some(id) => Value::Int(id),
                None => Value::String(format!("{n}+{offset}")),
            },
            Self::Str(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for EntityKey {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for EntityKey {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

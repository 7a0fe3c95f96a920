//! Wire-compatible request and settlement schemas.
//!
//! Every request travels as a [`RequestFrame`] carrying a correlation token,
//! an action name, and an action-specific object. The remote endpoint answers
//! each request with one [`SettlementFrame`] echoing the token.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::ComponentKind;

/// Action names understood by the remote endpoint.
pub mod actions {
    /// Bulk request carrying many index/delete operations.
    pub const BULK: &str = "bulk";
    /// Single-component persist.
    pub const PERSIST: &str = "ex_persist";
    /// Single-component destroy.
    pub const DESTROY: &str = "ex_destroy";
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Outbound request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame<T> {
    pub callback_token: String,
    pub action: String,
    pub object: T,
}

/// Object of a `bulk` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkPayload {
    /// Name of the graph (the remote index) every operation targets.
    pub index: String,
    pub operations: Vec<BulkLine>,
}

/// One operation inside a bulk payload.
///
/// Serialized as a positional array: `["index", type, id, body]` or
/// `["delete", type, id]`. Ids travel as strings; `body` is the component
/// already serialized to JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkLine {
    Index {
        type_name: String,
        id: String,
        body: String,
    },
    Delete {
        type_name: String,
        id: String,
    },
}

impl BulkLine {
    /// The wire id of the operation.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Index { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

impl Serialize for BulkLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Index {
                type_name,
                id,
                body,
            } => {
                let mut seq = serializer.serialize_seq(Some(4))?;
                seq.serialize_element("index")?;
                seq.serialize_element(type_name)?;
                seq.serialize_element(id)?;
                seq.serialize_element(body)?;
                seq.end()
            }
            Self::Delete { type_name, id } => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("delete")?;
                seq.serialize_element(type_name)?;
                seq.serialize_element(id)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for BulkLine {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LineVisitor;

        impl<'de> Visitor<'de> for LineVisitor {
            type Value = BulkLine;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a bulk operation array [opcode, type, id, body?]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<BulkLine, A::Error> {
                let opcode: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let type_name: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let id: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                match opcode.as_str() {
                    "index" => {
                        let body: String = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(3, &self))?;
                        Ok(BulkLine::Index {
                            type_name,
                            id,
                            body,
                        })
                    }
                    "delete" => Ok(BulkLine::Delete { type_name, id }),
                    other => Err(de::Error::unknown_variant(other, &["index", "delete"])),
                }
            }
        }

        deserializer.deserialize_seq(LineVisitor)
    }
}

/// Object of an `ex_persist` / `ex_destroy` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPayload {
    pub graph: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub obj: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Inbound frame settling one pending request.
///
/// Older endpoints echo the token under `callbackIndex`; both spellings are
/// accepted, `callbackToken` wins when a frame carries both, and numeric
/// tokens are read as their decimal string. A frame without a usable token
/// cannot be matched and is dropped by the router.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Map<String, serde_json::Value>")]
pub struct SettlementFrame {
    pub callback_token: Option<String>,
    /// Present when the endpoint rejected the request.
    pub error: Option<serde_json::Value>,
    /// Every other field: the result body handed back to the caller.
    pub body: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<serde_json::Map<String, serde_json::Value>> for SettlementFrame {
    type Error = String;

    fn try_from(mut body: serde_json::Map<String, serde_json::Value>) -> Result<Self, String> {
        let current = body.remove("callbackToken");
        let legacy = body.remove("callbackIndex");
        let callback_token = match (token_text(current)?, token_text(legacy)?) {
            (Some(token), _) | (None, Some(token)) => Some(token),
            (None, None) => None,
        };
        let error = body.remove("error");
        Ok(Self {
            callback_token,
            error,
            body,
        })
    }
}

fn token_text(raw: Option<serde_json::Value>) -> Result<Option<String>, String> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(token)) => Ok(Some(token)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!("invalid callback token: {other}")),
    }
}

impl SettlementFrame {
    /// Parses a settlement from an already-decoded frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Human-readable error message, if the frame reports a failure.
    ///
    /// A falsy `error` field (`null`, `false`, `""`) counts as success.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(serde_json::Value::Null | serde_json::Value::Bool(false)) => None,
            Some(serde_json::Value::String(msg)) if msg.is_empty() => None,
            Some(serde_json::Value::String(msg)) => Some(msg.clone()),
            Some(serde_json::Value::Object(map)) => Some(
                map.get("message")
                    .and_then(serde_json::Value::as_str)
                    .map_or_else(|| serde_json::Value::Object(map.clone()).to_string(), str::to_string),
            ),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// Result of one bulk request.
///
/// `errors` is the remote store's flag for "at least one item failed".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkResult {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

impl BulkResult {
    /// Result of a flush that had nothing to send.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

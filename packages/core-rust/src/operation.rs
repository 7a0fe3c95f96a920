//! Persist/destroy operations and the bulk envelope built from them.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::messages::{BulkLine, BulkPayload};
use crate::types::{ComponentKind, OpKind, Value};

/// Errors raised while turning operations into a wire payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("operation {position} has id {id}; all vertices and edges must have a non-negative integer id")]
    NonIntegerId { position: usize, id: String },
    #[error("failed to serialize body of operation {position}: {reason}")]
    Body { position: usize, reason: String },
    #[error("graph label is required to persist")]
    MissingGraphLabel,
    #[error("component id is required to destroy")]
    MissingId,
}

/// Source and target of an edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Endpoints {
    pub source: Value,
    pub target: Value,
}

/// A single persist or destroy of one graph component.
#[derive(Debug, Clone, PartialEq)]
pub struct WireOperation {
    pub op: OpKind,
    pub target: ComponentKind,
    pub id: Value,
    pub label: Option<String>,
    pub properties: BTreeMap<String, Value>,
    pub endpoints: Option<Endpoints>,
    /// Graph the operation belongs to.
    pub graph: String,
}

/// JSON body stored by the remote index for a persisted component.
#[derive(Serialize)]
struct ComponentBody<'a> {
    id: u64,
    label: Option<&'a str>,
    prop: &'a BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<&'a Value>,
}

impl WireOperation {
    /// Edge persist with the given endpoints.
    #[must_use]
    pub fn edge(
        op: OpKind,
        graph: impl Into<String>,
        id: Value,
        label: impl Into<String>,
        source: Value,
        target: Value,
    ) -> Self {
        Self {
            op,
            target: ComponentKind::Edge,
            id,
            label: Some(label.into()),
            properties: BTreeMap::new(),
            endpoints: Some(Endpoints { source, target }),
            graph: graph.into(),
        }
    }

    /// Returns the wire id, or `None` if the id breaks the integer-id contract.
    #[must_use]
    pub fn wire_id(&self) -> Option<u64> {
        self.id.as_wire_id()
    }

    /// Builds the bulk line for this operation. `position` is only used to
    /// locate the operation in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NonIntegerId`] if the id is not a
    /// non-negative integer.
    pub fn to_bulk_line(&self, position: usize) -> Result<BulkLine, ValidationError> {
        let id = self.wire_id().ok_or_else(|| ValidationError::NonIntegerId {
            position,
            id: self.id.to_string(),
        })?;
        let type_name = self.target.type_name().to_string();

        match self.op {
            OpKind::Persist => {
                let body = ComponentBody {
                    id,
                    label: self.label.as_deref(),
                    prop: &self.properties,
                    source: self.endpoints.as_ref().map(|e| &e.source),
                    target: self.endpoints.as_ref().map(|e| &e.target),
                };
                let body = serde_json::to_string(&body).map_err(|e| ValidationError::Body {
                    position,
                    reason: e.to_string(),
                })?;
                Ok(BulkLine::Index {
                    type_name,
                    id: id.to_string(),
                    body,
                })
            }
            OpKind::Destroy => Ok(BulkLine::Delete {
                type_name,
                id: id.to_string(),
            }),
        }
    }
}

/// One flush worth of operations for a single graph.
///
/// Built from the accumulator's buffer by move and consumed by
/// [`BulkEnvelope::into_payload`]; never reused across flushes.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkEnvelope {
    pub graph_name: String,
    pub operations: Vec<WireOperation>,
}

impl BulkEnvelope {
    #[must_use]
    pub fn new(graph_name: impl Into<String>, operations: Vec<WireOperation>) -> Self {
        Self {
            graph_name: graph_name.into(),
            operations,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Validates every operation and converts the envelope into its wire
    /// payload. Either every operation converts or none does: a single bad
    /// id fails the whole envelope.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] encountered.
    pub fn into_payload(self) -> Result<BulkPayload, ValidationError> {
        let operations = self
            .operations
            .iter()
            .enumerate()
            .map(|(position, op)| op.to_bulk_line(position))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BulkPayload {
            index: self.graph_name,
            operations,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn edge(id: Value) -> WireOperation {
        WireOperation::edge(
            OpKind::Persist,
            "pokec",
            id,
            "KNOWS",
            Value::Int(1),
            Value::Int(2),
        )
    }

    #[test]
    fn persist_builds_index_line_with_json_body() {
        let line = edge(Value::Int(100)).to_bulk_line(0).unwrap();
        let BulkLine::Index {
            type_name,
            id,
            body,
        } = line
        else {
            panic!("expected index line");
        };
        assert_eq!(type_name, "e");
        assert_eq!(id, "100");
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            body,
            json!({"id": 100, "label": "KNOWS", "prop": {}, "source": 1, "target": 2})
        );
    }

    #[test]
    fn destroy_builds_delete_line() {
        let mut op = edge(Value::Int(5));
        op.op = OpKind::Destroy;
        assert_eq!(
            op.to_bulk_line(0).unwrap(),
            BulkLine::Delete {
                type_name: "e".to_string(),
                id: "5".to_string()
            }
        );
    }

    #[test]
    fn destroy_also_requires_integer_id() {
        let mut op = edge(Value::String("x".into()));
        op.op = OpKind::Destroy;
        assert!(matches!(
            op.to_bulk_line(3),
            Err(ValidationError::NonIntegerId { position: 3, .. })
        ));
    }

    #[test]
    fn envelope_fails_whole_on_single_bad_id() {
        let envelope = BulkEnvelope::new(
            "pokec",
            vec![
                edge(Value::Int(1)),
                edge(Value::Float(2.5)),
                edge(Value::Int(3)),
            ],
        );
        let err = envelope.into_payload().unwrap_err();
        assert_eq!(
            err,
            ValidationError::NonIntegerId {
                position: 1,
                id: "2.5".to_string()
            }
        );
    }

    #[test]
    fn envelope_preserves_operation_order() {
        let envelope = BulkEnvelope::new(
            "pokec",
            vec![edge(Value::Int(9)), edge(Value::Int(3)), edge(Value::Int(7))],
        );
        assert_eq!(envelope.len(), 3);
        let payload = envelope.into_payload().unwrap();
        let ids: Vec<&str> = payload.operations.iter().map(BulkLine::id).collect();
        assert_eq!(ids, vec!["9", "3", "7"]);
        assert_eq!(payload.index, "pokec");
    }

    proptest! {
        #[test]
        fn negative_ids_always_rejected(id in i64::MIN..0) {
            prop_assert!(edge(Value::Int(id)).to_bulk_line(0).is_err());
        }
    }
}

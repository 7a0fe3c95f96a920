//! Entity client: persists or destroys single graph components.
//!
//! While the bulk area is open, operations are pushed into the
//! [`BulkAccumulator`] and sent with the next flush. Otherwise each one is a
//! separate `ex_persist` / `ex_destroy` call through the router.

use std::collections::BTreeMap;
use std::sync::Arc;

use graphbulk_core::{
    actions, ComponentKind, EntityPayload, Endpoints, OpKind, ValidationError, Value,
    WireOperation,
};
use serde_json::json;
use tracing::debug;

use crate::bulk::BulkAccumulator;
use crate::error::IngestError;
use crate::rpc::CorrelationRouter;

/// A vertex, edge, or graph as seen by the entity client.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub kind: ComponentKind,
    /// Assigned by the store on first persist unless set up front.
    pub id: Option<Value>,
    pub label: Option<String>,
    pub properties: BTreeMap<String, Value>,
    pub endpoints: Option<Endpoints>,
}

impl Component {
    #[must_use]
    pub fn vertex(label: impl Into<String>) -> Self {
        Self {
            kind: ComponentKind::Vertex,
            id: None,
            label: Some(label.into()),
            properties: BTreeMap::new(),
            endpoints: None,
        }
    }

    #[must_use]
    pub fn edge(label: impl Into<String>, source: Value, target: Value) -> Self {
        Self {
            kind: ComponentKind::Edge,
            endpoints: Some(Endpoints { source, target }),
            ..Self::vertex(label)
        }
    }

    /// A graph component. Its label doubles as its id.
    #[must_use]
    pub fn graph(label: impl Into<String>) -> Self {
        Self {
            kind: ComponentKind::Graph,
            ..Self::vertex(label)
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Stored body: `{id, label, prop, source?, target?}`.
    fn body(&self) -> serde_json::Value {
        let mut body = json!({
            "id": self.id,
            "label": self.label,
            "prop": self.properties,
        });
        if let Some(endpoints) = &self.endpoints {
            body["source"] = json!(endpoints.source);
            body["target"] = json!(endpoints.target);
        }
        body
    }

    fn to_operation(&self, op: OpKind, graph: &str) -> WireOperation {
        WireOperation {
            op,
            target: self.kind,
            id: self.id.clone().unwrap_or(Value::Null),
            label: self.label.clone(),
            properties: self.properties.clone(),
            endpoints: self.endpoints.clone(),
            graph: graph.to_string(),
        }
    }
}

/// Sends single-component operations for one graph.
///
/// The graph is the accumulator's, so direct calls and bulk-area pushes
/// always address the same one.
pub struct GraphClient {
    router: Arc<CorrelationRouter>,
    bulk: Arc<BulkAccumulator>,
}

impl GraphClient {
    #[must_use]
    pub fn new(router: Arc<CorrelationRouter>, bulk: Arc<BulkAccumulator>) -> Self {
        Self { router, bulk }
    }

    /// The graph every operation targets.
    #[must_use]
    pub fn graph(&self) -> &str {
        self.bulk.graph()
    }

    /// The accumulator backing the bulk area.
    #[must_use]
    pub fn bulk(&self) -> &Arc<BulkAccumulator> {
        &self.bulk
    }

    /// Persists `component`, storing the id the store assigned.
    ///
    /// Returns `None` when the operation was pushed into the open bulk area,
    /// and otherwise the store's `_id` for the component, if it sent one.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` without a graph label, or any router error.
    pub async fn persist(&self, component: &mut Component) -> Result<Option<Value>, IngestError> {
        if self.graph().is_empty() {
            return Err(ValidationError::MissingGraphLabel.into());
        }
        if component.kind == ComponentKind::Graph {
            component.id = component.label.clone().map(Value::String);
        }

        if self.bulk.is_open() {
            debug!(graph = %self.graph(), kind = ?component.kind, "pushing persist into bulk area");
            self.bulk
                .push(component.to_operation(OpKind::Persist, self.graph()));
            return Ok(None);
        }

        let body = self
            .router
            .call(actions::PERSIST, self.payload(component.kind, component.body())?)
            .await?;
        let assigned = match body.get("_id") {
            Some(id) => Some(
                serde_json::from_value::<Value>(id.clone())
                    .map_err(|e| IngestError::Codec(format!("invalid _id in persist response: {e}")))?,
            ),
            None => None,
        };
        if let Some(id) = &assigned {
            component.id = Some(id.clone());
        }
        Ok(assigned)
    }

    /// Destroys `component` at the store.
    ///
    /// Returns `None` when pushed into the open bulk area, and otherwise the
    /// `payload` the store echoed back.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if the component has no id, or any router error.
    pub async fn destroy(
        &self,
        component: &Component,
    ) -> Result<Option<serde_json::Value>, IngestError> {
        let Some(id) = &component.id else {
            return Err(ValidationError::MissingId.into());
        };

        if self.bulk.is_open() {
            debug!(graph = %self.graph(), kind = ?component.kind, "pushing destroy into bulk area");
            self.bulk
                .push(component.to_operation(OpKind::Destroy, self.graph()));
            return Ok(None);
        }

        let body = self
            .router
            .call(actions::DESTROY, self.payload(component.kind, json!({ "id": id }))?)
            .await?;
        Ok(body.get("payload").cloned())
    }

    fn payload(
        &self,
        kind: ComponentKind,
        obj: serde_json::Value,
    ) -> Result<serde_json::Value, IngestError> {
        serde_json::to_value(EntityPayload {
            graph: self.graph().to_string(),
            kind,
            obj,
        })
        .map_err(|e| IngestError::Codec(e.to_string()))
    }
}

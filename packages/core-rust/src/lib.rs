//! graphbulk Core: graph entity model, bulk wire schemas, and frame codec.

pub mod codec;
pub mod messages;
pub mod operation;
pub mod types;

pub use codec::{CodecError, Frame, WireFormat};
pub use messages::{
    actions, BulkLine, BulkPayload, BulkResult, EntityPayload, RequestFrame, SettlementFrame,
};
pub use operation::{BulkEnvelope, Endpoints, ValidationError, WireOperation};
pub use types::{ComponentKind, EntityKey, OpKind, Value};

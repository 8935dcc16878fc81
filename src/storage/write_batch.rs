//! Batched write requests.
//!
//! A [`WriteBatch`] is an ordered list of insert, update and delete
//! operations for one index, plus a flag asking for a commit once every
//! operation has been applied. Batches are values: built once, then handed
//! to an index.
//!
//! The JSON form follows the command layer's request shape:
//!
//! ```json
//! {
//!   "indexName": "products",
//!   "autoCommit": true,
//!   "ops": [
//!     {"op": "i", "id": "a", "vector": [0.0, 1.0]},
//!     {"op": "u", "id": "b", "fields": [{"fieldName": "title", "text": "red shoes"}]},
//!     {"op": "d", "id": "c"}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::document::TextField;
use crate::error::LucernaError;

/// Kind of a write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    #[serde(rename = "i")]
    Insert,
    #[serde(rename = "u")]
    Update,
    #[serde(rename = "d")]
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Insert => "i",
            OpKind::Update => "u",
            OpKind::Delete => "d",
        }
    }
}

/// Document content carried by an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Vector(Vec<f32>),
    Text(Vec<TextField>),
    None,
}

/// One operation of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWriteOp", into = "RawWriteOp")]
pub struct WriteOp {
    kind: OpKind,
    id: String,
    payload: Payload,
}

impl WriteOp {
    pub fn insert_vector<S: Into<String>>(id: S, vector: Vec<f32>) -> Self {
        Self::with_payload(OpKind::Insert, id, Payload::Vector(vector))
    }

    pub fn update_vector<S: Into<String>>(id: S, vector: Vec<f32>) -> Self {
        Self::with_payload(OpKind::Update, id, Payload::Vector(vector))
    }

    pub fn insert_text<S: Into<String>>(id: S, fields: Vec<TextField>) -> Self {
        Self::with_payload(OpKind::Insert, id, Payload::Text(fields))
    }

    pub fn update_text<S: Into<String>>(id: S, fields: Vec<TextField>) -> Self {
        Self::with_payload(OpKind::Update, id, Payload::Text(fields))
    }

    pub fn delete<S: Into<String>>(id: S) -> Self {
        Self::with_payload(OpKind::Delete, id, Payload::None)
    }

    /// An operation with an arbitrary payload; deletes ignore it.
    pub fn with_payload<S: Into<String>>(kind: OpKind, id: S, payload: Payload) -> Self {
        let payload = match kind {
            OpKind::Delete => Payload::None,
            _ => payload,
        };
        WriteOp {
            kind,
            id: id.into(),
            payload,
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn is_insert(&self) -> bool {
        self.kind == OpKind::Insert
    }

    pub fn is_update(&self) -> bool {
        self.kind == OpKind::Update
    }

    pub fn is_delete(&self) -> bool {
        self.kind == OpKind::Delete
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWriteOp {
    op: OpKind,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<TextField>>,
}

impl TryFrom<RawWriteOp> for WriteOp {
    type Error = LucernaError;

    fn try_from(raw: RawWriteOp) -> Result<Self, Self::Error> {
        let payload = match (raw.vector, raw.fields) {
            (Some(_), Some(_)) => {
                return Err(LucernaError::invalid_operation(format!(
                    "op for id {} has both a vector and text fields",
                    raw.id
                )));
            }
            (Some(vector), None) => Payload::Vector(vector),
            (None, Some(fields)) => Payload::Text(fields),
            (None, None) => Payload::None,
        };
        Ok(WriteOp::with_payload(raw.op, raw.id, payload))
    }
}

impl From<WriteOp> for RawWriteOp {
    fn from(op: WriteOp) -> Self {
        let (vector, fields) = match op.payload {
            Payload::Vector(vector) => (Some(vector), None),
            Payload::Text(fields) => (None, Some(fields)),
            Payload::None => (None, None),
        };
        RawWriteOp {
            op: op.kind,
            id: op.id,
            vector,
            fields,
        }
    }
}

/// An ordered list of operations destined for one index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteBatch {
    index_name: String,
    #[serde(default)]
    auto_commit: bool,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new<S: Into<String>>(index_name: S) -> Self {
        WriteBatch {
            index_name: index_name.into(),
            auto_commit: false,
            ops: Vec::new(),
        }
    }

    /// Parse the JSON form of a batch.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn op(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn insert_vector<S: Into<String>>(self, id: S, vector: Vec<f32>) -> Self {
        self.op(WriteOp::insert_vector(id, vector))
    }

    pub fn update_vector<S: Into<String>>(self, id: S, vector: Vec<f32>) -> Self {
        self.op(WriteOp::update_vector(id, vector))
    }

    pub fn insert_text<S: Into<String>>(self, id: S, fields: Vec<TextField>) -> Self {
        self.op(WriteOp::insert_text(id, fields))
    }

    pub fn update_text<S: Into<String>>(self, id: S, fields: Vec<TextField>) -> Self {
        self.op(WriteOp::update_text(id, fields))
    }

    pub fn delete<S: Into<String>>(self, id: S) -> Self {
        self.op(WriteOp::delete(id))
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

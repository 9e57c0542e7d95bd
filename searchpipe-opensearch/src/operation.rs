//! Bulk operations and their NDJSON expansion.

use crate::error::{OpenSearchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Metadata keys that the bulk API expects without their leading underscore.
const UNDERSCORE_STRIPPED: &[&str] = &[
    "_if_seq_no",
    "_if_primary_term",
    "_parent",
    "_retry_on_conflict",
    "_routing",
    "_version",
    "_version_type",
];

/// Action-line name of an underscore-prefixed metadata key.
pub(crate) fn action_key(key: &str) -> &str {
    if UNDERSCORE_STRIPPED.contains(&key) {
        &key[1..]
    } else {
        key
    }
}

/// Bulk operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    /// Index a document, replacing any existing one.
    #[default]
    Index,
    /// Create a document (fail if exists).
    Create,
    /// Update a document.
    Update,
    /// Delete a document.
    Delete,
}

impl OpType {
    /// Parse a bulk action name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "index" => Some(OpType::Index),
            "create" => Some(OpType::Create),
            "update" => Some(OpType::Update),
            "delete" => Some(OpType::Delete),
            _ => None,
        }
    }

    /// Bulk action name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Index => "index",
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    None,
    Json(Value),
    Raw(String),
}

/// One document mutation handed to the bulk helpers.
///
/// The action line carries the op type and metadata (`_index`, `_id`,
/// routing, versioning ...); the data line carries the document, the
/// partial `doc` of an update, or nothing for a delete.
///
/// ```rust
/// use searchpipe_opensearch::Operation;
/// use serde_json::json;
///
/// let op = Operation::index(json!({"title": "hello"}))
///     .with_index("articles")
///     .with_id("a-1");
/// assert_eq!(op.action_line().unwrap(), r#"{"index":{"_index":"articles","_id":"a-1"}}"#);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    op_type: OpType,
    meta: Map<String, Value>,
    payload: Payload,
}

impl Operation {
    fn with_payload(op_type: OpType, payload: Payload) -> Self {
        Self {
            op_type,
            meta: Map::new(),
            payload,
        }
    }

    /// Index a full document.
    pub fn index(source: Value) -> Self {
        Self::with_payload(OpType::Index, Payload::Json(source))
    }

    /// Create a document; fails per item if the id already exists.
    pub fn create(source: Value) -> Self {
        Self::with_payload(OpType::Create, Payload::Json(source))
    }

    /// Partially update a document.
    pub fn update(doc: Value) -> Self {
        Self::with_payload(OpType::Update, Payload::Json(json!({ "doc": doc })))
    }

    /// Update with a full update body (`doc`, `script`, `upsert` ...).
    pub fn update_body(body: Value) -> Self {
        Self::with_payload(OpType::Update, Payload::Json(body))
    }

    /// Delete a document by id.
    pub fn delete(id: impl Into<Value>) -> Self {
        Self::with_payload(OpType::Delete, Payload::None).with_id(id)
    }

    /// Index a pre-serialized document with an empty action line.
    pub fn raw(source: impl Into<String>) -> Self {
        Self::with_payload(OpType::Index, Payload::Raw(source.into()))
    }

    /// Build an operation from a JSON mapping.
    ///
    /// `_op_type` selects the action (default `index`). Other keys starting
    /// with `_` go to the action line, everything else is the document. A
    /// `_source` key, when present, is used as the document instead. A JSON
    /// string is treated like [`Operation::raw`].
    pub fn from_value(value: Value) -> Result<Self> {
        let map = match value {
            Value::String(raw) => return Ok(Self::raw(raw)),
            Value::Object(map) => map,
            other => {
                return Err(OpenSearchError::Validation(format!(
                    "bulk operation must be an object or a string, got {}",
                    other
                )));
            }
        };

        let mut op_type = OpType::Index;
        let mut source = None;
        let mut meta = Map::new();
        let mut data = Map::new();

        for (key, value) in map {
            match key.as_str() {
                "_op_type" => {
                    op_type = value.as_str().and_then(OpType::parse).ok_or_else(|| {
                        OpenSearchError::Validation(format!("unknown _op_type: {}", value))
                    })?;
                }
                "_source" => source = Some(value),
                k if k.starts_with('_') => {
                    meta.insert(action_key(k).to_string(), value);
                }
                _ => {
                    data.insert(key, value);
                }
            }
        }

        let payload = match op_type {
            OpType::Delete => Payload::None,
            _ => Payload::Json(source.unwrap_or(Value::Object(data))),
        };

        Ok(Self {
            op_type,
            meta,
            payload,
        })
    }

    /// Target index.
    pub fn with_index(self, index: impl Into<String>) -> Self {
        self.with_meta("_index", Value::String(index.into()))
    }

    /// Document id.
    pub fn with_id(self, id: impl Into<Value>) -> Self {
        self.with_meta("_id", id.into())
    }

    /// Shard routing value.
    pub fn with_routing(self, routing: impl Into<Value>) -> Self {
        self.with_meta("routing", routing.into())
    }

    /// Ingest pipeline to run the document through.
    pub fn with_pipeline(self, pipeline: impl Into<String>) -> Self {
        self.with_meta("pipeline", Value::String(pipeline.into()))
    }

    /// Set an arbitrary action-line key.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// For updates: insert `doc` when the document does not exist.
    pub fn doc_as_upsert(mut self, enabled: bool) -> Self {
        if let (OpType::Update, Payload::Json(Value::Object(body))) =
            (self.op_type, &mut self.payload)
        {
            body.insert("doc_as_upsert".to_string(), Value::Bool(enabled));
        }
        self
    }

    /// Operation type.
    pub fn op_type(&self) -> OpType {
        self.op_type
    }

    /// Action-line metadata.
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }

    /// Target index, if set on the operation.
    pub fn index_name(&self) -> Option<&str> {
        self.meta.get("_index").and_then(Value::as_str)
    }

    /// Document id, if set on the operation.
    pub fn id(&self) -> Option<&Value> {
        self.meta.get("_id")
    }

    /// The data line as JSON; raw sources are returned as a JSON string.
    pub fn data(&self) -> Option<Value> {
        match &self.payload {
            Payload::None => None,
            Payload::Json(value) => Some(value.clone()),
            Payload::Raw(raw) => Some(Value::String(raw.clone())),
        }
    }

    /// The action line object, `{"<op_type>": {...meta}}`.
    pub fn action(&self) -> Value {
        let mut action = Map::new();
        action.insert(self.op_type.as_str().to_string(), Value::Object(self.meta.clone()));
        Value::Object(action)
    }

    /// Serialized action line, without the trailing newline.
    pub fn action_line(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.action())?)
    }

    /// Serialized data line, without the trailing newline.
    pub fn data_line(&self) -> Result<Option<String>> {
        match &self.payload {
            Payload::None => Ok(None),
            Payload::Json(value) => Ok(Some(serde_json::to_string(value)?)),
            Payload::Raw(raw) => Ok(Some(raw.clone())),
        }
    }
}

impl TryFrom<Value> for Operation {
    type Error = OpenSearchError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

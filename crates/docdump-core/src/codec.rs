//! Per-document codecs.
//!
//! A codec turns one document into the bytes of one file and back. The
//! codec is chosen once per run and every job of that run shares it.
//!
//! - **bson**: the native binary document format, lossless for every type.
//! - **json**: human-readable text. ObjectIds, dates, binary values and
//!   64-bit integers are flattened into plain JSON values and do not come
//!   back with their original types.

use base64::Engine as _;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

use crate::error::CodecError;
use crate::layout::validate_component;
use crate::Result;

/// Capability shared by every document codec
pub trait DocumentCodec: Send + Sync {
    /// File extension, without the dot
    fn extension(&self) -> &str;

    /// Serialize a document into the bytes of one file
    fn encode(&self, document: &Document) -> Result<Vec<u8>>;

    /// Parse the bytes of one file back into a document
    fn decode(&self, bytes: &[u8]) -> Result<Document>;
}

/// Built-in codec selector, as written in run files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    #[default]
    Bson,
    Json,
}

/// Binary document codec
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonCodec;

impl DocumentCodec for BsonCodec {
    fn extension(&self) -> &str {
        "bson"
    }

    fn encode(&self, document: &Document) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        document
            .to_writer(&mut buf)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        Ok(Document::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))?)
    }
}

/// Structured-text codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    fn extension(&self) -> &str {
        "json"
    }

    fn encode(&self, document: &Document) -> Result<Vec<u8>> {
        let value = document_to_json(document);
        Ok(serde_json::to_vec(&value).map_err(|e| CodecError::Encode(e.to_string()))?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(json_to_document(map)),
            other => Err(CodecError::Decode(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))
            .into()),
        }
    }
}

/// The codec selected for one run
#[derive(Clone)]
pub enum Codec {
    Bson(BsonCodec),
    Json(JsonCodec),
    Custom(Arc<dyn DocumentCodec>),
}

impl Codec {
    pub fn from_kind(kind: CodecKind) -> Self {
        match kind {
            CodecKind::Bson => Codec::Bson(BsonCodec),
            CodecKind::Json => Codec::Json(JsonCodec),
        }
    }

    fn inner(&self) -> &dyn DocumentCodec {
        match self {
            Codec::Bson(codec) => codec,
            Codec::Json(codec) => codec,
            Codec::Custom(codec) => codec.as_ref(),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Codec::from_kind(CodecKind::default())
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Bson(_) => f.write_str("Codec::Bson"),
            Codec::Json(_) => f.write_str("Codec::Json"),
            Codec::Custom(codec) => write!(f, "Codec::Custom(.{})", codec.extension()),
        }
    }
}

impl DocumentCodec for Codec {
    fn extension(&self) -> &str {
        self.inner().extension()
    }

    fn encode(&self, document: &Document) -> Result<Vec<u8>> {
        self.inner().encode(document)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        self.inner().decode(bytes)
    }
}

/// File name stem for a document, derived from its `_id`.
pub fn document_file_stem(document: &Document) -> Result<String> {
    let id = document
        .get("_id")
        .ok_or_else(|| CodecError::DocumentId("document has no _id".to_string()))?;

    let stem = match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        other => other.clone().into_relaxed_extjson().to_string(),
    };

    if validate_component(&stem).is_err() {
        return Err(CodecError::DocumentId(format!("'{}' is not filesystem-safe", stem)).into());
    }
    Ok(stem)
}

/// Flatten a document into plain JSON.
pub fn document_to_json(document: &Document) -> Value {
    let map: Map<String, Value> = document
        .iter()
        .map(|(key, value)| (key.clone(), bson_to_json(value)))
        .collect();
    Value::Object(map)
}

fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(n) => Value::from(*n),
        Bson::Int64(n) => Value::from(*n),
        Bson::Double(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(s) => Value::String(s),
            Err(_) => Value::from(dt.timestamp_millis()),
        },
        Bson::Binary(bin) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(&bin.bytes))
        }
        other => other.clone().into_relaxed_extjson(),
    }
}

/// Rebuild a document from plain JSON, keeping field order.
pub fn json_to_document(map: Map<String, Value>) -> Document {
    map.into_iter()
        .map(|(key, value)| (key, json_to_bson(value)))
        .collect()
}

fn json_to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(small) => Bson::Int32(small),
                    Err(_) => Bson::Int64(i),
                }
            } else {
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(json_to_document(map)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

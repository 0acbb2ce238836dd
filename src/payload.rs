//! Payload types exchanged between pipeline stages.
//!
//! The engine moves `Box<dyn Payload>` values through its channels and only
//! relies on the capability set defined here, never on the representation.
//! The default implementation is a byte buffer holding JSON.

use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// A payload as it travels through the pipeline's channels.
pub type BoxedPayload = Box<dyn Payload>;

/// How data flows through pipelines.
///
/// Implementations must be deep-clonable: the branch wiring hands every
/// downstream stage its own copy, and downstream stages are free to mutate
/// theirs without affecting any sibling.
pub trait Payload: Send + fmt::Debug {
    /// Byte representation of the payload, used for transport and for the
    /// byte counters in the execution stats.
    fn bytes(&self) -> &[u8];

    /// Returns a deep-independent copy of this payload.
    fn clone_payload(&self) -> BoxedPayload;

    /// Upcast for downcasting to the concrete payload type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast, for stages that edit their copy in place.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Structured view of the payload. The default parses `bytes()` as JSON;
    /// implementations over other representations should override this.
    fn to_value(&self) -> PipelineResult<Value> {
        Ok(serde_json::from_slice(self.bytes())?)
    }
}

impl Clone for BoxedPayload {
    fn clone(&self) -> Self {
        self.clone_payload()
    }
}

impl dyn Payload {
    /// Decodes the payload into a struct, logging a debug record on failure.
    pub fn parse<T: DeserializeOwned>(&self) -> PipelineResult<T> {
        match self.parse_silent() {
            Ok(value) => Ok(value),
            Err(err) => {
                debug!(
                    "failed to decode payload \"{}\": {}",
                    String::from_utf8_lossy(self.bytes()),
                    err
                );
                Err(err)
            }
        }
    }

    /// Decodes the payload into a struct without logging on failure. Use it
    /// where a decode failure is an expected outcome.
    pub fn parse_silent<T: DeserializeOwned>(&self) -> PipelineResult<T> {
        Ok(serde_json::from_value(self.to_value()?)?)
    }

    /// Normalizes the payload into an ordered sequence of objects.
    ///
    /// A single object yields one entry, an array yields its objects in
    /// order, and the literal `null` yields an empty sequence. Anything else
    /// is an error naming the unsupported type.
    pub fn objects(&self) -> PipelineResult<Vec<Map<String, Value>>> {
        if self.bytes() == b"null" {
            debug!("objects: received null, expected object or objects, skipping");
            return Ok(Vec::new());
        }
        match self.to_value()? {
            Value::Object(object) => Ok(vec![object]),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(object) => Ok(object),
                    other => Err(PipelineError::UnsupportedObjects(json_type_name(&other))),
                })
                .collect(),
            other => Err(PipelineError::UnsupportedObjects(json_type_name(&other))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The default payload implementation: a byte buffer containing JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPayload(Vec<u8>);

impl JsonPayload {
    /// Serializes a value into a JSON payload.
    pub fn new<T: Serialize>(value: &T) -> PipelineResult<Self> {
        match serde_json::to_vec(value) {
            Ok(bytes) => Ok(Self(bytes)),
            Err(err) => {
                debug!("failed to encode value as a JSON payload: {}", err);
                Err(err.into())
            }
        }
    }

    /// Builds a JSON array of objects from a header row and rows of values.
    /// Missing header entries fall back to the key `"null"`.
    pub fn from_header_and_rows(header: &[&str], rows: &[Vec<Value>]) -> PipelineResult<Self> {
        let objects: Vec<Value> = rows
            .iter()
            .map(|row| {
                let mut object = Map::new();
                for (i, value) in row.iter().enumerate() {
                    let key = header.get(i).copied().unwrap_or("null");
                    object.insert(key.to_string(), value.clone());
                }
                Value::Object(object)
            })
            .collect();
        Self::new(&objects)
    }

    /// Mutable access to the underlying buffer, for stages that edit their
    /// branch copy in place.
    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.0
    }

    /// Consumes the payload, returning the underlying buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Boxes the payload for sending into a pipeline channel.
    pub fn boxed(self) -> BoxedPayload {
        Box::new(self)
    }
}

impl Payload for JsonPayload {
    fn bytes(&self) -> &[u8] {
        &self.0
    }

    fn clone_payload(&self) -> BoxedPayload {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl From<Vec<u8>> for JsonPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for JsonPayload {
    fn from(json: &str) -> Self {
        Self(json.as_bytes().to_vec())
    }
}

impl From<String> for JsonPayload {
    fn from(json: String) -> Self {
        Self(json.into_bytes())
    }
}

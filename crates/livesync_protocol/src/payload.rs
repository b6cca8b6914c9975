//! Push payload decoding.
//!
//! Push services deliver each event with a payload. Two shapes are in use:
//!
//! - **Envelope**: `{"message": "<JSON text>"}`, where the message holds the
//!   JSON-encoded record (or array of records for resets)
//! - **Raw**: the record itself, already decoded by the transport

use crate::error::{ProtocolError, ProtocolResult};
use crate::record::{json_type, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The envelope wrapping a JSON-encoded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// JSON-encoded body.
    pub message: String,
}

impl Envelope {
    /// Encodes a value into an envelope.
    pub fn new<T: Serialize>(body: &T) -> ProtocolResult<Self> {
        Ok(Self {
            message: serde_json::to_string(body)?,
        })
    }

    /// Encodes a value and returns the envelope as a JSON payload.
    pub fn wrap<T: Serialize>(body: &T) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(Self::new(body)?)?)
    }

    /// Decodes the message body.
    pub fn open(&self) -> ProtocolResult<Value> {
        Ok(serde_json::from_str(&self.message)?)
    }
}

/// How a push payload carries its body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// `{"message": "<JSON text>"}`.
    #[default]
    Envelope,
    /// The body itself.
    Raw,
}

impl PayloadFormat {
    /// Extracts the body of a payload.
    pub fn decode(&self, payload: &Value) -> ProtocolResult<Value> {
        match self {
            PayloadFormat::Envelope => Envelope::deserialize(payload)?.open(),
            PayloadFormat::Raw => Ok(payload.clone()),
        }
    }

    /// Extracts a single record from a payload.
    pub fn decode_record(&self, payload: &Value) -> ProtocolResult<Record> {
        Record::try_from(self.decode(payload)?)
    }

    /// Extracts an array of records from a payload.
    pub fn decode_records(&self, payload: &Value) -> ProtocolResult<Vec<Record>> {
        match self.decode(payload)? {
            Value::Array(items) => items.into_iter().map(Record::try_from).collect(),
            other => Err(ProtocolError::invalid_structure(format!(
                "expected array of records, found {}",
                json_type(&other)
            ))),
        }
    }
}

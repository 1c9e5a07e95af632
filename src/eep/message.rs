//! Decoded EEP messages.
//!
//! An [`EepMessage`] is the interpreted form of a radio telegram: a map of
//! per-field raw/value/unit triples plus a map of semantic entity values
//! keyed by observable UID. Messages are produced by an
//! [`EepHandler`](super::handler::EepHandler) (inbound) or a profile's
//! command encoder (outbound) and are never mutated afterwards.

use std::collections::HashMap;
use std::fmt;

use crate::address::{Destination, SenderAddress};
use crate::eep::id::EepId;

/// An interpreted field or entity value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Raw integer, used when a field declares neither enum nor scaling.
    Int(u64),
    /// Linearly scaled measurement.
    Float(f64),
    /// Enum label or derived state name.
    Text(String),
}

impl Value {
    /// Numeric view: integers widen to float, text has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(i) => i.fmt(f),
            Value::Float(v) => v.fmt(f),
            Value::Text(s) => s.fmt(f),
        }
    }
}

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

/// Which telegram of a multi-telegram EEP a message belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EepMessageType {
    /// The CMD selector value (0 for single-telegram EEPs).
    pub id: u64,
    pub description: String,
}

/// Raw and interpreted value of a single EEP data field.
#[derive(Debug, Clone, PartialEq)]
pub struct EepMessageValue {
    pub raw: u64,
    pub value: Value,
    pub unit: Option<&'static str>,
}

/// A semantic entity value, keyed by observable UID in
/// [`EepMessage::entities`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityValue {
    pub value: Value,
    pub unit: Option<&'static str>,
}

/// A message interpreted according to an EEP.
#[derive(Debug, Clone, PartialEq)]
pub struct EepMessage {
    pub sender: Option<SenderAddress>,
    /// Only set when addressed sending is used; `None` means broadcast.
    pub destination: Option<Destination>,
    pub eep: EepId,
    pub rssi: Option<u8>,
    pub message_type: Option<EepMessageType>,
    /// Per-field values, keyed by EEP field id (`"R1"`, `"POS"`, …).
    pub values: HashMap<&'static str, EepMessageValue>,
    /// Semantic values, keyed by observable UID (`"temperature"`, …).
    pub entities: HashMap<&'static str, EntityValue>,
}

impl EepMessage {
    pub fn new(eep: EepId) -> Self {
        EepMessage {
            sender: None,
            destination: None,
            eep,
            rssi: None,
            message_type: None,
            values: HashMap::new(),
            entities: HashMap::new(),
        }
    }

    /// Start an outbound message for the given CMD value, as command
    /// encoders do.
    pub fn outgoing(eep: EepId, cmd: u64, description: &str) -> Self {
        let mut msg = EepMessage::new(eep);
        msg.message_type = Some(EepMessageType {
            id: cmd,
            description: description.to_string(),
        });
        msg
    }

    /// Set a field's raw value on an outbound message.
    pub fn set_raw(&mut self, field_id: &'static str, raw: u64) -> &mut Self {
        self.values.insert(
            field_id,
            EepMessageValue {
                raw,
                value: Value::Int(raw),
                unit: None,
            },
        );
        self
    }

    /// Raw value of a field, if present.
    pub fn raw(&self, field_id: &str) -> Option<u64> {
        self.values.get(field_id).map(|v| v.raw)
    }

    /// Text label of a field decoded through an enum, if present.
    pub fn label(&self, field_id: &str) -> Option<&str> {
        self.values.get(field_id).and_then(|v| v.value.as_str())
    }
}

impl fmt::Display for EepMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.sender {
            Some(sender) => write!(f, "EepMessage({} from {sender}", self.eep)?,
            None => write!(f, "EepMessage({}", self.eep)?,
        }
        if let Some(kind) = &self.message_type {
            write!(f, ", {}", kind.description)?;
        }
        let mut fields: Vec<_> = self.values.iter().collect();
        fields.sort_by_key(|(id, _)| **id);
        for (id, value) in fields {
            write!(f, ", {id}={}", value.value)?;
            if let Some(unit) = value.unit {
                write!(f, "{unit}")?;
            }
        }
        write!(f, ")")
    }
}

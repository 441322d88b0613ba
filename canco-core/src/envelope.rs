//! The `{ "type": ..., "data": ... }` wrapper used in both directions.
//!
//! Inbound, only `type == "operation"` carries meaning; other types are
//! decoded but ignored by the server. Outbound, the server emits one event
//! per mutating operation, typed `CREATE_SHAPE` / `UPDATE_SHAPE` /
//! `DELETE_SHAPE` with the originating operation as `data`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::operation::{Operation, OperationType};

/// Envelope type of inbound edit requests.
pub const OPERATION_MESSAGE: &str = "operation";

/// Envelope with an untyped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Wrap an operation for sending to the server.
    pub fn operation(op: &Operation) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(op).map_err(ProtocolError::Serialization)?;
        Ok(Self::new(OPERATION_MESSAGE, data))
    }

    pub fn is_operation(&self) -> bool {
        self.kind == OPERATION_MESSAGE
    }

    /// Decode `data` as an [`Operation`]. Fails unless this is an operation envelope.
    pub fn into_operation(self) -> Result<Operation, ProtocolError> {
        if !self.is_operation() {
            return Err(ProtocolError::UnexpectedMessageType(self.kind));
        }
        serde_json::from_value(self.data).map_err(ProtocolError::MalformedOperation)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Serialization)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)
    }
}

/// Outbound event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    CreateShape,
    UpdateShape,
    DeleteShape,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateShape => "CREATE_SHAPE",
            Self::UpdateShape => "UPDATE_SHAPE",
            Self::DeleteShape => "DELETE_SHAPE",
        }
    }

    /// Event announced for an operation kind, if it is broadcast at all.
    pub fn for_operation(kind: OperationType) -> Option<Self> {
        match kind {
            OperationType::CreateShape => Some(Self::CreateShape),
            OperationType::UpdateShape => Some(Self::UpdateShape),
            OperationType::DeleteShape => Some(Self::DeleteShape),
            OperationType::SelectShape | OperationType::DeselectAll => None,
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        [Self::CreateShape, Self::UpdateShape, Self::DeleteShape]
            .into_iter()
            .find(|event| event.as_str() == tag)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowing envelope for serializing an event without cloning its payload.
#[derive(Debug, Serialize)]
pub struct Event<'a, T> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub data: &'a T,
}

impl<'a, T: Serialize> Event<'a, T> {
    pub fn new(kind: &'a str, data: &'a T) -> Self {
        Self { kind, data }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Serialization)
    }
}

/// A decoded shape event as seen by a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeEvent {
    pub event_type: EventType,
    pub operation: Operation,
}

impl ShapeEvent {
    /// Decode a shape event. `Ok(None)` for envelopes of any other type.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, ProtocolError> {
        let Some(event_type) = EventType::parse(&envelope.kind) else {
            return Ok(None);
        };
        let operation = Operation::deserialize(&envelope.data)
            .map_err(ProtocolError::MalformedOperation)?;
        Ok(Some(Self {
            event_type,
            operation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;
    use serde_json::json;

    #[test]
    fn test_operation_envelope_roundtrip() {
        let op = Operation::delete_shape("op-1", 42, "s1");
        let envelope = Envelope::operation(&op).unwrap();
        let text = envelope.encode().unwrap();

        let decoded = Envelope::decode(&text).unwrap();
        assert!(decoded.is_operation());
        assert_eq!(decoded.into_operation().unwrap(), op);
    }

    #[test]
    fn test_envelope_missing_data_is_null() {
        let envelope = Envelope::decode(r#"{"type":"cursor"}"#).unwrap();
        assert_eq!(envelope.kind, "cursor");
        assert_eq!(envelope.data, Value::Null);
        assert!(!envelope.is_operation());
    }

    #[test]
    fn test_envelope_rejects_garbage() {
        assert!(matches!(
            Envelope::decode("not json"),
            Err(ProtocolError::MalformedEnvelope(_))
        ));
        assert!(Envelope::decode(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn test_into_operation_wrong_type() {
        let envelope = Envelope::new("chat", json!({}));
        assert!(matches!(
            envelope.into_operation(),
            Err(ProtocolError::UnexpectedMessageType(kind)) if kind == "chat"
        ));
    }

    #[test]
    fn test_event_encoding() {
        let op = Operation::create_shape("op-1", 7, Shape::rect("s1", 0, 0, 1, 1));
        let text = Event::new(EventType::CreateShape.as_str(), &op).encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "CREATE_SHAPE");
        assert_eq!(value["data"]["type"], "CREATE_SHAPE");
        assert_eq!(value["data"]["data"]["id"], "s1");
    }

    #[test]
    fn test_shape_event_decoding() {
        let op = Operation::update_shape("op-9", 1, "s1", Default::default());
        let text = Event::new("UPDATE_SHAPE", &op).encode().unwrap();
        let envelope = Envelope::decode(&text).unwrap();

        let event = ShapeEvent::from_envelope(&envelope).unwrap().unwrap();
        assert_eq!(event.event_type, EventType::UpdateShape);
        assert_eq!(event.operation, op);

        let other = Envelope::new("pong", Value::Null);
        assert!(ShapeEvent::from_envelope(&other).unwrap().is_none());
    }

    #[test]
    fn test_event_type_mapping() {
        assert_eq!(
            EventType::for_operation(OperationType::DeleteShape),
            Some(EventType::DeleteShape)
        );
        assert_eq!(EventType::for_operation(OperationType::SelectShape), None);
        assert_eq!(EventType::for_operation(OperationType::DeselectAll), None);
        assert_eq!(EventType::parse("CREATE_SHAPE"), Some(EventType::CreateShape));
        assert_eq!(EventType::parse("create_shape"), None);
    }
}

//! Client edit requests.
//!
//! Wire format:
//! ```text
//! { "id": "op-1", "type": "UPDATE_SHAPE", "timestamp": 1700000000000,
//!   "data": { "id": "s1", "shape": { "x": 20 } } }
//! ```
//!
//! Decoding reads the `type` discriminant first and then decodes `data`
//! into the one payload variant it names. Unknown discriminants are
//! rejected. `timestamp` is carried verbatim and never used for ordering.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::shape::{PartialShape, Shape};

/// The five operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    CreateShape,
    UpdateShape,
    DeleteShape,
    SelectShape,
    DeselectAll,
}

impl OperationType {
    pub const ALL: [OperationType; 5] = [
        Self::CreateShape,
        Self::UpdateShape,
        Self::DeleteShape,
        Self::SelectShape,
        Self::DeselectAll,
    ];

    /// Upper-case wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateShape => "CREATE_SHAPE",
            Self::UpdateShape => "UPDATE_SHAPE",
            Self::DeleteShape => "DELETE_SHAPE",
            Self::SelectShape => "SELECT_SHAPE",
            Self::DeselectAll => "DESELECT_ALL",
        }
    }

    /// Whether applying this kind can change the shape collection.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::CreateShape | Self::UpdateShape | Self::DeleteShape
        )
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = ProtocolError;

    /// Tags are matched case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownOperationType(s.to_string()))
    }
}

impl Serialize for OperationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(de::Error::custom)
    }
}

/// Payload of an `UPDATE_SHAPE` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateShapeData {
    pub id: String,
    /// Older clients send the patch under `changes`
    #[serde(alias = "changes")]
    pub shape: PartialShape,
}

/// Payload of a `DELETE_SHAPE` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteShapeData {
    pub id: String,
}

/// `CREATE_SHAPE` accepts the shape bare or wrapped as `{ "shape": ... }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CreateShapeData {
    Bare(Shape),
    Wrapped { shape: Shape },
}

impl From<CreateShapeData> for Shape {
    fn from(data: CreateShapeData) -> Self {
        match data {
            CreateShapeData::Bare(shape) | CreateShapeData::Wrapped { shape } => shape,
        }
    }
}

/// Typed operation payload, one variant per [`OperationType`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    CreateShape(Shape),
    UpdateShape(UpdateShapeData),
    DeleteShape(DeleteShapeData),
    /// Archived as received, never interpreted
    SelectShape(Value),
    /// Archived as received, never interpreted
    DeselectAll(Value),
}

impl OperationPayload {
    pub fn kind(&self) -> OperationType {
        match self {
            Self::CreateShape(_) => OperationType::CreateShape,
            Self::UpdateShape(_) => OperationType::UpdateShape,
            Self::DeleteShape(_) => OperationType::DeleteShape,
            Self::SelectShape(_) => OperationType::SelectShape,
            Self::DeselectAll(_) => OperationType::DeselectAll,
        }
    }

    /// Decode `data` as the payload for `kind`.
    pub fn decode(kind: OperationType, data: Value) -> Result<Self, ProtocolError> {
        let invalid = |e: serde_json::Error| ProtocolError::InvalidPayload {
            kind,
            message: e.to_string(),
        };

        Ok(match kind {
            OperationType::CreateShape => Self::CreateShape(
                serde_json::from_value::<CreateShapeData>(data)
                    .map_err(invalid)?
                    .into(),
            ),
            OperationType::UpdateShape => {
                Self::UpdateShape(serde_json::from_value(data).map_err(invalid)?)
            }
            OperationType::DeleteShape => {
                Self::DeleteShape(serde_json::from_value(data).map_err(invalid)?)
            }
            OperationType::SelectShape => Self::SelectShape(data),
            OperationType::DeselectAll => Self::DeselectAll(data),
        })
    }
}

/// Shape of an operation on the wire, before its payload is typed.
#[derive(Deserialize)]
struct RawOperation {
    id: String,
    #[serde(rename = "type")]
    kind: OperationType,
    timestamp: i64,
    #[serde(default)]
    data: Value,
}

impl TryFrom<RawOperation> for Operation {
    type Error = ProtocolError;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        Ok(Self {
            id: raw.id,
            timestamp: raw.timestamp,
            payload: OperationPayload::decode(raw.kind, raw.data)?,
        })
    }
}

/// A single accepted edit request. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawOperation")]
pub struct Operation {
    pub id: String,
    /// Client-supplied epoch milliseconds, informational only
    pub timestamp: i64,
    pub payload: OperationPayload,
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Operation", 4)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.kind())?;
        state.serialize_field("timestamp", &self.timestamp)?;
        match &self.payload {
            OperationPayload::CreateShape(shape) => state.serialize_field("data", shape)?,
            OperationPayload::UpdateShape(data) => state.serialize_field("data", data)?,
            OperationPayload::DeleteShape(data) => state.serialize_field("data", data)?,
            OperationPayload::SelectShape(data) | OperationPayload::DeselectAll(data) => {
                state.serialize_field("data", data)?
            }
        }
        state.end()
    }
}

impl Operation {
    pub fn new(id: impl Into<String>, timestamp: i64, payload: OperationPayload) -> Self {
        Self {
            id: id.into(),
            timestamp,
            payload,
        }
    }

    pub fn create_shape(id: impl Into<String>, timestamp: i64, shape: Shape) -> Self {
        Self::new(id, timestamp, OperationPayload::CreateShape(shape))
    }

    pub fn update_shape(
        id: impl Into<String>,
        timestamp: i64,
        shape_id: impl Into<String>,
        patch: PartialShape,
    ) -> Self {
        Self::new(
            id,
            timestamp,
            OperationPayload::UpdateShape(UpdateShapeData {
                id: shape_id.into(),
                shape: patch,
            }),
        )
    }

    pub fn delete_shape(id: impl Into<String>, timestamp: i64, shape_id: impl Into<String>) -> Self {
        Self::new(
            id,
            timestamp,
            OperationPayload::DeleteShape(DeleteShapeData {
                id: shape_id.into(),
            }),
        )
    }

    pub fn select_shape(id: impl Into<String>, timestamp: i64, selection: Value) -> Self {
        Self::new(id, timestamp, OperationPayload::SelectShape(selection))
    }

    pub fn deselect_all(id: impl Into<String>, timestamp: i64) -> Self {
        Self::new(
            id,
            timestamp,
            OperationPayload::DeselectAll(Value::Object(Default::default())),
        )
    }

    pub fn kind(&self) -> OperationType {
        self.payload.kind()
    }

    /// Id of the shape a create/update/delete targets.
    pub fn target_shape_id(&self) -> Option<&str> {
        match &self.payload {
            OperationPayload::CreateShape(shape) => Some(&shape.id),
            OperationPayload::UpdateShape(data) => Some(&data.id),
            OperationPayload::DeleteShape(data) => Some(&data.id),
            OperationPayload::SelectShape(_) | OperationPayload::DeselectAll(_) => None,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Serialization)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::MalformedOperation)
    }
}

//! # canco-core: Canvas data model and wire codec
//!
//! Plain value types shared by the server and its clients:
//!
//! - [`shape`]: rectangles on the canvas and sparse patches against them
//! - [`operation`]: client edit requests, decoded into a tagged union
//! - [`envelope`]: the `{type, data}` wrapper exchanged over the socket
//!
//! Everything here is transport-agnostic; JSON is the only wire format.

pub mod envelope;
pub mod error;
pub mod operation;
pub mod shape;

pub use envelope::{Envelope, Event, EventType, ShapeEvent, OPERATION_MESSAGE};
pub use error::ProtocolError;
pub use operation::{
    DeleteShapeData, Operation, OperationPayload, OperationType, UpdateShapeData,
};
pub use shape::{PartialShape, Shape};

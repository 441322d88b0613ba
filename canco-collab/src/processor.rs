//! Operation semantics.
//!
//! | Kind           | Effect                                          |
//! |----------------|-------------------------------------------------|
//! | `CREATE_SHAPE` | append the shape (ignored if the id exists)     |
//! | `UPDATE_SHAPE` | overwrite the fields present in the patch       |
//! | `DELETE_SHAPE` | remove the shape, keeping the others in order   |
//! | `SELECT_SHAPE` | archived only                                   |
//! | `DESELECT_ALL` | archived only                                   |
//!
//! Every operation is appended to the log, whatever its effect.
//! Unknown target ids are no-ops, not errors. Callers hold the room's
//! exclusive lock.

use canco_core::{Operation, OperationPayload};

use crate::room::CanvasState;

/// What applying an operation did to the shape collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Created,
    /// A shape with this id already exists; nothing inserted
    DuplicateIgnored,
    Updated { fields: usize },
    Deleted,
    /// Update/delete target does not exist
    NotFound,
    /// Journaled without touching shapes
    Archived,
}

impl Effect {
    pub fn changed_shapes(self) -> bool {
        matches!(self, Self::Created | Self::Updated { .. } | Self::Deleted)
    }
}

/// Apply `op` to `canvas` and append it to the log.
pub fn apply(room_id: &str, canvas: &mut CanvasState, op: Operation) -> Effect {
    let shapes = &mut canvas.shapes;

    let effect = match &op.payload {
        OperationPayload::CreateShape(shape) => {
            if shapes.contains_key(&shape.id) {
                log::warn!(
                    "Room {room_id}: {} {} targets existing shape {}; ignored",
                    op.kind(),
                    op.id,
                    shape.id
                );
                Effect::DuplicateIgnored
            } else {
                shapes.insert(shape.id.clone(), shape.clone());
                Effect::Created
            }
        }
        OperationPayload::UpdateShape(data) => match shapes.get_mut(&data.id) {
            Some(shape) => Effect::Updated {
                fields: shape.apply(&data.shape),
            },
            None => Effect::NotFound,
        },
        OperationPayload::DeleteShape(data) => match shapes.shift_remove(&data.id) {
            Some(_) => Effect::Deleted,
            None => Effect::NotFound,
        },
        OperationPayload::SelectShape(_) | OperationPayload::DeselectAll(_) => Effect::Archived,
    };

    match effect {
        Effect::NotFound => log::debug!(
            "Room {room_id}: {} {} targets unknown shape {:?}",
            op.kind(),
            op.id,
            op.target_shape_id()
        ),
        _ => log::debug!("Room {room_id}: applied {} {} ({effect:?})", op.kind(), op.id),
    }

    canvas.operations.push(op);
    effect
}

#[cfg(test)]
mod tests {
    use super::*;
    use canco_core::{PartialShape, Shape};
    use serde_json::json;

    fn rect(id: &str) -> Shape {
        Shape::rect(id, 0, 0, 10, 10)
    }

    fn ids(canvas: &CanvasState) -> Vec<&str> {
        canvas.shapes().map(|shape| shape.id.as_str()).collect()
    }

    #[test]
    fn test_creates_with_distinct_ids() {
        let mut canvas = CanvasState::new();
        for i in 0..25 {
            let op = Operation::create_shape(format!("op-{i}"), i, rect(&format!("s{i}")));
            assert_eq!(apply("r", &mut canvas, op), Effect::Created);
        }
        assert_eq!(canvas.shape_count(), 25);
        assert_eq!(canvas.operations().len(), 25);
    }

    #[test]
    fn test_duplicate_create_keeps_first() {
        let mut canvas = CanvasState::new();
        apply("r", &mut canvas, Operation::create_shape("op-1", 1, rect("s1")));
        let effect = apply(
            "r",
            &mut canvas,
            Operation::create_shape("op-2", 2, rect("s1").with_color("red")),
        );

        assert_eq!(effect, Effect::DuplicateIgnored);
        assert!(!effect.changed_shapes());
        assert_eq!(canvas.shape_count(), 1);
        assert_eq!(canvas.shape("s1").unwrap().color, "#000000");
        assert_eq!(canvas.operations().len(), 2);
    }

    #[test]
    fn test_update_subset_of_fields() {
        let mut canvas = CanvasState::new();
        let original = Shape::rect("s1", 10, 10, 5, 5).with_color("#fff").with_z_index(1);
        apply("r", &mut canvas, Operation::create_shape("op-1", 1, original.clone()));

        let patch = PartialShape {
            x: Some(20),
            color: Some("#000".into()),
            ..PartialShape::default()
        };
        let effect = apply("r", &mut canvas, Operation::update_shape("op-2", 2, "s1", patch));
        assert_eq!(effect, Effect::Updated { fields: 2 });

        let shape = canvas.shape("s1").unwrap();
        assert_eq!(shape.x, 20);
        assert_eq!(shape.color, "#000");
        assert_eq!(shape.y, original.y);
        assert_eq!(shape.width, original.width);
        assert_eq!(shape.height, original.height);
        assert_eq!(shape.is_selected, original.is_selected);
        assert_eq!(shape.z_index, original.z_index);
        assert_eq!(shape.kind, original.kind);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let mut canvas = CanvasState::new();
        apply("r", &mut canvas, Operation::create_shape("op-1", 1, rect("s1")));

        let effect = apply(
            "r",
            &mut canvas,
            Operation::update_shape("op-2", 2, "ghost", PartialShape::position(5, 5)),
        );

        assert_eq!(effect, Effect::NotFound);
        assert_eq!(canvas.shape("s1"), Some(&rect("s1")));
        assert_eq!(canvas.operations().len(), 2);
    }

    #[test]
    fn test_empty_patch_touches_nothing() {
        let mut canvas = CanvasState::new();
        apply("r", &mut canvas, Operation::create_shape("op-1", 1, rect("s1")));

        let effect = apply(
            "r",
            &mut canvas,
            Operation::update_shape("op-2", 2, "s1", PartialShape::default()),
        );

        assert_eq!(effect, Effect::Updated { fields: 0 });
        assert_eq!(canvas.shape("s1"), Some(&rect("s1")));
    }

    #[test]
    fn test_delete_preserves_order() {
        let mut canvas = CanvasState::new();
        for id in ["a", "b", "c", "d"] {
            apply("r", &mut canvas, Operation::create_shape(format!("op-{id}"), 0, rect(id)));
        }

        let effect = apply("r", &mut canvas, Operation::delete_shape("op-x", 0, "b"));

        assert_eq!(effect, Effect::Deleted);
        assert_eq!(ids(&canvas), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_delete_unknown_id_is_journaled() {
        let mut canvas = CanvasState::new();
        apply("r", &mut canvas, Operation::create_shape("op-1", 1, rect("s1")));
        let before: Vec<Shape> = canvas.shapes().cloned().collect();

        let effect = apply("r", &mut canvas, Operation::delete_shape("op-2", 2, "ghost"));

        assert_eq!(effect, Effect::NotFound);
        assert_eq!(canvas.shapes().cloned().collect::<Vec<_>>(), before);
        assert_eq!(canvas.operations().len(), 2);
        assert_eq!(canvas.operations()[1].id, "op-2");
    }

    #[test]
    fn test_recreate_after_delete_goes_last() {
        let mut canvas = CanvasState::new();
        for id in ["a", "b"] {
            apply("r", &mut canvas, Operation::create_shape(format!("op-{id}"), 0, rect(id)));
        }
        apply("r", &mut canvas, Operation::delete_shape("op-del", 0, "a"));
        apply("r", &mut canvas, Operation::create_shape("op-again", 0, rect("a")));

        assert_eq!(ids(&canvas), vec!["b", "a"]);
    }

    #[test]
    fn test_selection_ops_archived() {
        let mut canvas = CanvasState::new();
        apply("r", &mut canvas, Operation::create_shape("op-1", 1, rect("s1")));

        let select = apply(
            "r",
            &mut canvas,
            Operation::select_shape("op-2", 2, json!({ "id": "s1" })),
        );
        let deselect = apply("r", &mut canvas, Operation::deselect_all("op-3", 3));

        assert_eq!(select, Effect::Archived);
        assert_eq!(deselect, Effect::Archived);
        assert!(!canvas.shape("s1").unwrap().is_selected);
        assert_eq!(canvas.operations().len(), 3);
    }
}

//! Canvas shapes and sparse patches.
//!
//! Field names follow the browser client: `isSelected`, `zIndex`, and the
//! shape kind travels as `type`.

use serde::{Deserialize, Serialize};

/// A rectangle on the canvas. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: String,
    /// Kind tag, e.g. `"rect"`
    #[serde(rename = "type")]
    pub kind: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub color: String,
    pub is_selected: bool,
    /// Stacking order (higher draws on top)
    pub z_index: i64,
}

impl Shape {
    /// Create an unselected rectangle with a black fill at z-index 0.
    pub fn rect(id: impl Into<String>, x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            id: id.into(),
            kind: "rect".to_string(),
            x,
            y,
            width,
            height,
            color: "#000000".to_string(),
            is_selected: false,
            z_index: 0,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_z_index(mut self, z_index: i64) -> Self {
        self.z_index = z_index;
        self
    }

    /// Overwrite every field present in `patch`; absent fields are untouched.
    ///
    /// Returns the number of fields written.
    pub fn apply(&mut self, patch: &PartialShape) -> usize {
        let mut written = 0;

        if let Some(x) = patch.x {
            self.x = x;
            written += 1;
        }
        if let Some(y) = patch.y {
            self.y = y;
            written += 1;
        }
        if let Some(width) = patch.width {
            self.width = width;
            written += 1;
        }
        if let Some(height) = patch.height {
            self.height = height;
            written += 1;
        }
        if let Some(color) = &patch.color {
            self.color.clone_from(color);
            written += 1;
        }
        if let Some(is_selected) = patch.is_selected {
            self.is_selected = is_selected;
            written += 1;
        }
        if let Some(z_index) = patch.z_index {
            self.z_index = z_index;
            written += 1;
        }

        written
    }
}

/// Sparse patch against a [`Shape`].
///
/// A field that is absent (or `null`) on the wire decodes to `None` and is
/// never applied. Neither `id` nor the kind (`type`) is patchable; those
/// keys inside a patch are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialShape {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_selected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
}

impl PartialShape {
    /// Patch that only moves the shape.
    pub fn position(x: i64, y: i64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// True when no field is present.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

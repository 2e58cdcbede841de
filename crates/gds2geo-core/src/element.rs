use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::layer::LayerKey;

/// A decoded layout-stream element, reduced to what extraction needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutElement {
    /// A closed polygon, points exactly as stored in the stream.
    Boundary { key: LayerKey, points: Vec<Point> },
    /// A routed wire: center line plus width.
    Path {
        key: LayerKey,
        points: Vec<Point>,
        width: i64,
    },
    /// Any other record kind (text, box, references); carried only so it can
    /// be counted.
    Other { kind: ElementKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Box,
    Text,
    Node,
    StructRef,
    ArrayRef,
}

impl LayoutElement {
    pub fn boundary(layer: u16, datatype: u16, points: Vec<Point>) -> Self {
        LayoutElement::Boundary {
            key: LayerKey::new(layer, datatype),
            points,
        }
    }

    pub fn path(layer: u16, datatype: u16, points: Vec<Point>, width: i64) -> Self {
        LayoutElement::Path {
            key: LayerKey::new(layer, datatype),
            points,
            width,
        }
    }
}

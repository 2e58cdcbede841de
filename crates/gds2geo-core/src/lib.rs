//! # gds2geo Core
//!
//! Layer tables, layout elements, wire-to-rectangle decomposition and the
//! classifier that sorts layout geometry into per-layer buckets for the
//! `.geo` capacitance-extraction format.

pub mod classify;
pub mod element;
pub mod geometry;
pub mod layer;
pub mod rectangulize;

pub use classify::{ClassificationStats, ClassifyError, GeometryClassifier, LayerBuckets, Routing};
pub use element::{ElementKind, LayoutElement};
pub use geometry::{Point, Polygon, Rect, WirePath};
pub use layer::{LayerError, LayerKey, LayerRef, LayerTable, LayerTableBuilder, MetalLayer, ViaLayer};
pub use rectangulize::{rectangulize, GeometryError};

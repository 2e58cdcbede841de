//! Routing of layout elements into per-layer polygon buckets.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::LayoutElement;
use crate::geometry::{Point, Polygon, WirePath};
use crate::layer::{LayerKey, LayerRef, LayerTable};
use crate::rectangulize::{rectangulize, GeometryError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("wire on layer {key} does not belong to any declared metal layer")]
    UnresolvedWireLayer { key: LayerKey },

    #[error("wire on layer {key} resolves to via '{via}', wires must be on metal layers")]
    WireOnVia { key: LayerKey, via: String },

    #[error("wire on layer {key}: {source}")]
    Geometry {
        key: LayerKey,
        #[source]
        source: GeometryError,
    },
}

/// Ordered polygons per declared layer, metals first, then vias.
#[derive(Debug, Clone, Default)]
pub struct LayerBuckets {
    metal_count: usize,
    buckets: Vec<VecDeque<Polygon>>,
}

impl LayerBuckets {
    /// One empty bucket per layer of `table`.
    pub fn for_table(table: &LayerTable) -> Self {
        Self {
            metal_count: table.metal_count(),
            buckets: vec![VecDeque::new(); table.layer_count()],
        }
    }

    pub fn push(&mut self, layer: LayerRef, polygon: Polygon) {
        let index = layer.global_index(self.metal_count);
        self.buckets[index].push_back(polygon);
    }

    pub fn bucket(&self, layer: LayerRef) -> &VecDeque<Polygon> {
        &self.buckets[layer.global_index(self.metal_count)]
    }

    pub fn polygon_count(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }

    /// Polygon count per bucket, in global layer order.
    pub fn counts(&self) -> Vec<usize> {
        self.buckets.iter().map(VecDeque::len).collect()
    }

    /// Remove a layer's polygons, oldest first.
    pub fn drain(&mut self, layer: LayerRef) -> std::collections::vec_deque::Drain<'_, Polygon> {
        let index = layer.global_index(self.metal_count);
        self.buckets[index].drain(..)
    }
}

/// Outcome of classifying one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// `polygons` polygons were appended to `layer`.
    Routed { layer: LayerRef, polygons: usize },
    /// A boundary on a layer outside the extraction set.
    Dropped,
    /// Not a boundary or path.
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationStats {
    pub boundaries: usize,
    pub boundaries_dropped: usize,
    pub non_manhattan: usize,
    pub paths: usize,
    pub rectangles: usize,
    pub ignored: usize,
}

/// Sorts elements into the buckets of a finished [`LayerTable`].
pub struct GeometryClassifier<'t> {
    table: &'t LayerTable,
    buckets: LayerBuckets,
    stats: ClassificationStats,
}

impl<'t> GeometryClassifier<'t> {
    pub fn new(table: &'t LayerTable) -> Self {
        Self {
            table,
            buckets: LayerBuckets::for_table(table),
            stats: ClassificationStats::default(),
        }
    }

    pub fn classify(&mut self, element: LayoutElement) -> Result<Routing, ClassifyError> {
        match element {
            LayoutElement::Boundary { key, points } => Ok(self.classify_boundary(key, points)),
            LayoutElement::Path { key, points, width } => {
                self.classify_path(key, WirePath::new(points, width))
            }
            LayoutElement::Other { kind } => {
                log::trace!("Ignoring {:?} element", kind);
                self.stats.ignored += 1;
                Ok(Routing::Ignored)
            }
        }
    }

    /// Classify every element, stopping at the first error.
    pub fn classify_all<I>(&mut self, elements: I) -> Result<(), ClassifyError>
    where
        I: IntoIterator<Item = LayoutElement>,
    {
        for element in elements {
            self.classify(element)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> &ClassificationStats {
        &self.stats
    }

    pub fn buckets(&self) -> &LayerBuckets {
        &self.buckets
    }

    /// Hand the filled buckets over, ending classification.
    pub fn finish(self) -> (LayerBuckets, ClassificationStats) {
        (self.buckets, self.stats)
    }

    fn classify_boundary(&mut self, key: LayerKey, points: Vec<Point>) -> Routing {
        let Some(layer) = self.table.resolve_key(key) else {
            log::debug!("Dropping boundary on unmapped layer {}", key);
            self.stats.boundaries_dropped += 1;
            return Routing::Dropped;
        };

        let polygon = Polygon::new(points);
        if !polygon.is_manhattan() {
            log::warn!(
                "Boundary on layer {} ({}) is not Manhattan",
                key,
                self.table.layer_name(layer).unwrap_or("?")
            );
            self.stats.non_manhattan += 1;
        }
        self.buckets.push(layer, polygon);
        self.stats.boundaries += 1;
        Routing::Routed { layer, polygons: 1 }
    }

    fn classify_path(&mut self, key: LayerKey, wire: WirePath) -> Result<Routing, ClassifyError> {
        let layer = match self.table.resolve_key(key) {
            Some(layer @ LayerRef::Metal(_)) => layer,
            Some(LayerRef::Via(_)) => {
                return Err(ClassifyError::WireOnVia {
                    key,
                    via: self.table.name_for_key(key).unwrap_or_default().to_string(),
                });
            }
            None => return Err(ClassifyError::UnresolvedWireLayer { key }),
        };

        let rects = rectangulize(&wire).map_err(|source| ClassifyError::Geometry { key, source })?;
        let count = rects.len();
        for rect in rects {
            self.buckets.push(layer, rect.to_polygon());
        }
        self.stats.paths += 1;
        self.stats.rectangles += count;
        Ok(Routing::Routed {
            layer,
            polygons: count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerTableBuilder;

    fn table() -> LayerTable {
        let mut b = LayerTableBuilder::new();
        b.add_metal("m1", LayerKey::new(10, 0), 0, 100).unwrap();
        b.add_metal("m2", LayerKey::new(20, 0), 200, 100).unwrap();
        b.add_via("v1", LayerKey::new(15, 0), "m1", "m2").unwrap();
        b.build()
    }

    fn pts(points: &[(i64, i64)]) -> Vec<Point> {
        points.iter().map(|&p| Point::from(p)).collect()
    }

    fn square(x: i64) -> Vec<Point> {
        pts(&[(x, 0), (x + 10, 0), (x + 10, 10), (x, 10), (x, 0)])
    }

    #[test]
    fn test_boundaries_go_to_their_layers() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        let r = c.classify(LayoutElement::boundary(20, 0, square(0))).unwrap();
        assert_eq!(r, Routing::Routed { layer: LayerRef::Metal(1), polygons: 1 });
        let r = c.classify(LayoutElement::boundary(15, 0, square(5))).unwrap();
        assert_eq!(r, Routing::Routed { layer: LayerRef::Via(0), polygons: 1 });

        let (buckets, stats) = c.finish();
        assert_eq!(buckets.counts(), vec![0, 1, 1]);
        assert_eq!(buckets.bucket(LayerRef::Via(0))[0].points, square(5));
        assert_eq!(stats.boundaries, 2);
    }

    #[test]
    fn test_unmapped_boundary_is_dropped_silently() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        let r = c.classify(LayoutElement::boundary(99, 0, square(0))).unwrap();
        assert_eq!(r, Routing::Dropped);
        // Same layer, different datatype.
        let r = c.classify(LayoutElement::boundary(10, 1, square(0))).unwrap();
        assert_eq!(r, Routing::Dropped);
        assert!(c.buckets().is_empty());
        assert_eq!(c.stats().boundaries_dropped, 2);
    }

    #[test]
    fn test_wire_is_decomposed_into_metal_bucket() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        let wire = LayoutElement::path(10, 0, pts(&[(0, 0), (100, 0), (100, 100)]), 10);
        let r = c.classify(wire).unwrap();
        assert_eq!(r, Routing::Routed { layer: LayerRef::Metal(0), polygons: 2 });

        let bucket = c.buckets().bucket(LayerRef::Metal(0));
        assert_eq!(bucket.len(), 2);
        assert_eq!(
            bucket[0].points,
            pts(&[(-5, -5), (105, -5), (105, 5), (-5, 5), (-5, -5)])
        );
        assert_eq!(c.stats().rectangles, 2);
    }

    #[test]
    fn test_wire_on_via_layer_is_an_error() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        let err = c
            .classify(LayoutElement::path(15, 0, pts(&[(0, 0), (10, 0)]), 2))
            .unwrap_err();
        assert_eq!(
            err,
            ClassifyError::WireOnVia {
                key: LayerKey::new(15, 0),
                via: "v1".into()
            }
        );
        assert!(c.buckets().is_empty());
    }

    #[test]
    fn test_wire_on_unmapped_layer_is_an_error() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        let err = c
            .classify(LayoutElement::path(42, 0, pts(&[(0, 0), (10, 0)]), 2))
            .unwrap_err();
        assert!(matches!(err, ClassifyError::UnresolvedWireLayer { .. }));
    }

    #[test]
    fn test_diagonal_wire_is_an_error() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        let err = c
            .classify(LayoutElement::path(10, 0, pts(&[(0, 0), (10, 10)]), 2))
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Geometry { .. }));
    }

    #[test]
    fn test_other_elements_are_ignored() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        let r = c
            .classify(LayoutElement::Other {
                kind: crate::element::ElementKind::Text,
            })
            .unwrap();
        assert_eq!(r, Routing::Ignored);
        assert_eq!(c.stats().ignored, 1);
    }

    #[test]
    fn test_bucket_order_and_drain() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        c.classify_all(vec![
            LayoutElement::boundary(10, 0, square(0)),
            LayoutElement::boundary(10, 0, square(20)),
            LayoutElement::boundary(10, 0, square(40)),
        ])
        .unwrap();
        let (mut buckets, _) = c.finish();
        let drained: Vec<Polygon> = buckets.drain(LayerRef::Metal(0)).collect();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].points, square(0));
        assert_eq!(drained[2].points, square(40));
        assert!(buckets.is_empty());
    }

    #[test]
    fn test_non_manhattan_boundary_is_kept_and_counted() {
        let table = table();
        let mut c = GeometryClassifier::new(&table);
        c.classify(LayoutElement::boundary(10, 0, pts(&[(0, 0), (10, 0), (0, 10), (0, 0)])))
            .unwrap();
        assert_eq!(c.stats().non_manhattan, 1);
        assert_eq!(c.buckets().polygon_count(), 1);
    }
}

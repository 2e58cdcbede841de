//! The `.geo` layer-indexed geometry format.
//!
//! ```text
//! <metalCount>
//! <index>, <bottomNm>, <topNm>                                  per metal
//! <viaCount>
//! <index + metalCount>, <bottomNm>, <topNm>, <bottomMetal>, <topMetal>   per via
//! ```
//! followed by one section per layer, metals first:
//! ```text
//! <globalLayerIndex>
//! <polygonCount>
//! <pointCount>
//! <x>, <y>
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gds2geo_core::classify::LayerBuckets;
use gds2geo_core::geometry::{Point, Polygon};
use gds2geo_core::layer::{LayerRef, LayerTable};

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("via '{0}' references a metal missing from the layer table")]
    DanglingVia(String),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("unexpected end of file, expected {0}")]
    UnexpectedEof(&'static str),
}

/// Output path for a layout file: same name, `.geo` extension.
pub fn geo_path_for(layout: impl AsRef<Path>) -> PathBuf {
    layout.as_ref().with_extension("geo")
}

// ── Writer ────────────────────────────────────────────────────────────

pub struct GeoWriter<W: Write> {
    writer: W,
}

impl<W: Write> GeoWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write the layer header and every bucket, draining the buckets.
    pub fn write(&mut self, table: &LayerTable, buckets: &mut LayerBuckets) -> Result<(), GeoError> {
        self.write_layers(table)?;

        let metals = (0..table.metal_count()).map(LayerRef::Metal);
        let vias = (0..table.via_count()).map(LayerRef::Via);
        for layer in metals.chain(vias) {
            let index = layer.global_index(table.metal_count());
            let polygons: Vec<Polygon> = buckets.drain(layer).collect();
            self.write_bucket(index, &polygons)?;
        }

        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_layers(&mut self, table: &LayerTable) -> Result<(), GeoError> {
        let w = &mut self.writer;
        writeln!(w, "{}", table.metal_count())?;
        for metal in table.metals() {
            writeln!(w, "{}, {}, {}", metal.index, metal.bottom_height, metal.top_height)?;
        }

        writeln!(w, "{}", table.via_count())?;
        for via in table.vias() {
            let (bottom, top) = table
                .via_connection(via)
                .ok_or_else(|| GeoError::DanglingVia(via.name.clone()))?;
            writeln!(
                w,
                "{}, {}, {}, {}, {}",
                via.index + table.metal_count(),
                via.bottom_height,
                via.top_height,
                bottom,
                top
            )?;
        }
        Ok(())
    }

    fn write_bucket(&mut self, index: usize, polygons: &[Polygon]) -> Result<(), GeoError> {
        let w = &mut self.writer;
        writeln!(w, "{}", index)?;
        writeln!(w, "{}", polygons.len())?;
        for polygon in polygons {
            writeln!(w, "{}", polygon.point_count())?;
            for p in &polygon.points {
                writeln!(w, "{}, {}", p.x, p.y)?;
            }
        }
        Ok(())
    }
}

// ── Reader ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoMetal {
    pub index: usize,
    pub bottom_height: i64,
    pub top_height: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoVia {
    /// Global index (already offset by the metal count).
    pub index: usize,
    pub bottom_height: i64,
    pub top_height: i64,
    pub bottom_metal: usize,
    pub top_metal: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLayer {
    pub index: usize,
    pub polygons: Vec<Polygon>,
}

/// A `.geo` file read back into memory.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeoFile {
    pub metals: Vec<GeoMetal>,
    pub vias: Vec<GeoVia>,
    /// Metal layers first, then vias.
    pub layers: Vec<GeoLayer>,
}

impl GeoFile {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, GeoError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, GeoError> {
        let mut lines = Lines::new(text);
        let mut geo = GeoFile::default();

        let [metal_count] = lines.next_ints::<1>("metal count")?;
        for _ in 0..metal_count {
            let [index, bottom, top] = lines.next_ints::<3>("metal definition")?;
            geo.metals.push(GeoMetal {
                index: lines.index(index)?,
                bottom_height: bottom,
                top_height: top,
            });
        }

        let [via_count] = lines.next_ints::<1>("via count")?;
        for _ in 0..via_count {
            let [index, bottom, top, bottom_metal, top_metal] = lines.next_ints::<5>("via definition")?;
            geo.vias.push(GeoVia {
                index: lines.index(index)?,
                bottom_height: bottom,
                top_height: top,
                bottom_metal: lines.index(bottom_metal)?,
                top_metal: lines.index(top_metal)?,
            });
        }

        for _ in 0..geo.metals.len() + geo.vias.len() {
            let [index] = lines.next_ints::<1>("layer index")?;
            let [polygon_count] = lines.next_ints::<1>("polygon count")?;
            let mut polygons = Vec::new();
            for _ in 0..polygon_count {
                let [point_count] = lines.next_ints::<1>("point count")?;
                let mut points = Vec::new();
                for _ in 0..point_count {
                    let [x, y] = lines.next_ints::<2>("point")?;
                    points.push(Point::new(x, y));
                }
                polygons.push(Polygon::new(points));
            }
            geo.layers.push(GeoLayer {
                index: lines.index(index)?,
                polygons,
            });
        }

        Ok(geo)
    }

    pub fn polygon_count(&self) -> usize {
        self.layers.iter().map(|l| l.polygons.len()).sum()
    }

    /// Polygon count per layer, in file order.
    pub fn counts(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.polygons.len()).collect()
    }
}

/// Line cursor over `.geo` text, tracking line numbers for errors.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    line: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
            line: 0,
        }
    }

    /// Next non-blank line as exactly `N` comma-separated integers.
    fn next_ints<const N: usize>(&mut self, what: &'static str) -> Result<[i64; N], GeoError> {
        let text = loop {
            let (i, text) = self.inner.next().ok_or(GeoError::UnexpectedEof(what))?;
            self.line = i + 1;
            if !text.trim().is_empty() {
                break text;
            }
        };

        let values = text
            .split(',')
            .map(|v| v.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.error(format!("invalid {what} '{text}': {e}")))?;
        let found = values.len();
        values
            .try_into()
            .map_err(|_| self.error(format!("expected {} value(s) for {}, found {}", N, what, found)))
    }

    fn index(&self, value: i64) -> Result<usize, GeoError> {
        usize::try_from(value).map_err(|_| self.error(format!("negative index {value}")))
    }

    fn error(&self, message: String) -> GeoError {
        GeoError::Parse {
            line: self.line,
            message,
        }
    }
}

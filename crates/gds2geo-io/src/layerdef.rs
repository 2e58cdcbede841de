//! Layer definition file parser.
//!
//! The format is a sequence of `}`-terminated blocks. Each block may set a
//! length unit before declaring its type, then lists one layer per line:
//!
//! ```text
//! unit: nm                # um/u (default), nm/n, am/a, or meters as a number
//! metal {
//!     m1  10 0  300 200   # name layer datatype height thickness
//!     m2  20 0  800 250
//! }
//! via {
//!     v1  15 0  m1 m2     # name layer datatype bottom-metal top-metal
//! }
//! ```
//!
//! Heights are stored in nanometers. The unit applies to the block it appears
//! in and resets to micrometers at the start of the next one.

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use gds2geo_core::layer::{LayerError, LayerKey, LayerTable, LayerTableBuilder};

const NANOMETER: f64 = 1e-9;
const DEFAULT_UNIT: f64 = 1e-6;

#[derive(Error, Debug)]
pub enum LayerDefError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: unknown block type '{kind}', expected 'metal' or 'via'")]
    UnknownBlock { line: usize, kind: String },

    #[error("line {line}: invalid unit '{value}'")]
    InvalidUnit { line: usize, value: String },

    #[error("line {line}: {block} line needs {expected} fields, found {found}: '{text}'")]
    FieldCount {
        line: usize,
        block: BlockKind,
        expected: usize,
        found: usize,
        text: String,
    },

    #[error("line {line}: invalid {field} '{value}' in '{text}'")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
        text: String,
    },

    #[error("line {line}: {source}")]
    Layer {
        line: usize,
        #[source]
        source: LayerError,
    },
}

impl LayerDefError {
    /// 1-based line of the offending text, if the error came from the text.
    pub fn line(&self) -> Option<usize> {
        match self {
            LayerDefError::Io(_) => None,
            LayerDefError::UnknownBlock { line, .. }
            | LayerDefError::InvalidUnit { line, .. }
            | LayerDefError::FieldCount { line, .. }
            | LayerDefError::InvalidNumber { line, .. }
            | LayerDefError::Layer { line, .. } => Some(*line),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Metal,
    Via,
}

impl BlockKind {
    fn from_header(header: &str) -> Option<Self> {
        match header.trim().to_lowercase().as_str() {
            "metal" => Some(BlockKind::Metal),
            "via" => Some(BlockKind::Via),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::Metal => f.write_str("metal"),
            BlockKind::Via => f.write_str("via"),
        }
    }
}

/// A line of source text with its 1-based line number.
#[derive(Debug, Clone, Copy)]
struct SourceLine<'a> {
    number: usize,
    text: &'a str,
}

/// A parsed `metal` block line. Lengths are in the block's unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MetalLine {
    pub name: String,
    pub key: LayerKey,
    pub height: f64,
    pub thickness: f64,
}

impl MetalLine {
    fn parse(line: SourceLine<'_>) -> Result<Self, LayerDefError> {
        let [name, layer, datatype, height, thickness] = fields::<5>(line, BlockKind::Metal)?;
        Ok(Self {
            name: name.to_lowercase(),
            key: LayerKey::new(
                number(line, "layer", layer)?,
                number(line, "datatype", datatype)?,
            ),
            height: length(line, "height", height)?,
            thickness: length(line, "thickness", thickness)?,
        })
    }
}

/// A parsed `via` block line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViaLine {
    pub name: String,
    pub key: LayerKey,
    pub bottom_metal: String,
    pub top_metal: String,
}

impl ViaLine {
    fn parse(line: SourceLine<'_>) -> Result<Self, LayerDefError> {
        let [name, layer, datatype, bottom, top] = fields::<5>(line, BlockKind::Via)?;
        Ok(Self {
            name: name.to_lowercase(),
            key: LayerKey::new(
                number(line, "layer", layer)?,
                number(line, "datatype", datatype)?,
            ),
            bottom_metal: bottom.to_lowercase(),
            top_metal: top.to_lowercase(),
        })
    }
}

/// Resolve a `unit:` value to meters.
///
/// A plain number is taken as meters; otherwise the value must be one of the
/// named units.
pub fn parse_unit(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Ok(meters) = value.parse::<f64>() {
        return (meters.is_finite() && meters > 0.0).then_some(meters);
    }
    match value.to_lowercase().as_str() {
        "um" | "u" => Some(1e-6),
        "nm" | "n" => Some(1e-9),
        "am" | "a" => Some(1e-10),
        _ => None,
    }
}

/// Parse layer definition text into a [`LayerTable`].
///
/// Any malformed line fails the whole parse.
pub fn parse_layer_definitions(text: &str) -> Result<LayerTable, LayerDefError> {
    let mut parser = Parser::default();
    for block in split_blocks(text) {
        parser.parse_block(&block)?;
    }
    let table = parser.builder.build();
    log::debug!(
        "Parsed {} metal and {} via layer(s)",
        table.metal_count(),
        table.via_count()
    );
    Ok(table)
}

pub fn read_layer_definitions(path: impl AsRef<Path>) -> Result<LayerTable, LayerDefError> {
    let text = std::fs::read_to_string(path)?;
    parse_layer_definitions(&text)
}

#[derive(Default)]
struct Parser {
    builder: LayerTableBuilder,
}

impl Parser {
    fn parse_block(&mut self, lines: &[SourceLine<'_>]) -> Result<(), LayerDefError> {
        let mut kind = None;
        let mut scale = DEFAULT_UNIT / NANOMETER;

        for &line in lines {
            if let Some(kind) = kind {
                self.parse_layer_line(kind, line, scale)?;
                continue;
            }

            if let Some((header, rest)) = line.text.split_once('{') {
                let block = BlockKind::from_header(header).ok_or_else(|| {
                    LayerDefError::UnknownBlock {
                        line: line.number,
                        kind: header.trim().to_string(),
                    }
                })?;
                kind = Some(block);
                let rest = rest.trim();
                if !rest.is_empty() {
                    let first = SourceLine {
                        number: line.number,
                        text: rest,
                    };
                    self.parse_layer_line(block, first, scale)?;
                }
            } else if let Some((key, value)) = line.text.split_once(':') {
                if key.trim().eq_ignore_ascii_case("unit") {
                    let unit = parse_unit(value).ok_or_else(|| LayerDefError::InvalidUnit {
                        line: line.number,
                        value: value.trim().to_string(),
                    })?;
                    scale = unit / NANOMETER;
                } else {
                    log::warn!("line {}: ignoring unknown setting '{}'", line.number, key.trim());
                }
            } else {
                log::warn!("line {}: ignoring '{}' outside a block", line.number, line.text);
            }
        }
        Ok(())
    }

    fn parse_layer_line(
        &mut self,
        kind: BlockKind,
        line: SourceLine<'_>,
        scale: f64,
    ) -> Result<(), LayerDefError> {
        let layer_err = |source| LayerDefError::Layer {
            line: line.number,
            source,
        };
        match kind {
            BlockKind::Metal => {
                let metal = MetalLine::parse(line)?;
                let bottom = to_nanometers(metal.height, scale);
                let thickness = to_nanometers(metal.thickness, scale);
                let layer = self
                    .builder
                    .add_metal(&metal.name, metal.key, bottom, thickness)
                    .map_err(layer_err)?;
                log::trace!(
                    "metal {} [{}] {}..{} nm",
                    layer.name,
                    layer.key,
                    layer.bottom_height,
                    layer.top_height
                );
            }
            BlockKind::Via => {
                let via = ViaLine::parse(line)?;
                let layer = self
                    .builder
                    .add_via(&via.name, via.key, &via.bottom_metal, &via.top_metal)
                    .map_err(layer_err)?;
                log::trace!(
                    "via {} [{}] {} -> {}",
                    layer.name,
                    layer.key,
                    layer.bottom_metal,
                    layer.top_metal
                );
            }
        }
        Ok(())
    }
}

fn to_nanometers(value: f64, scale: f64) -> i64 {
    (value * scale).round() as i64
}

/// Split text into `}`-terminated blocks of non-blank, comment-free lines.
/// Anything after the last `}` is dropped.
fn split_blocks(text: &str) -> Vec<Vec<SourceLine<'_>>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let content = raw.split('#').next().unwrap_or_default();
        let mut pieces = content.split('}').peekable();
        while let Some(piece) = pieces.next() {
            let piece = piece.trim();
            if !piece.is_empty() {
                current.push(SourceLine {
                    number: i + 1,
                    text: piece,
                });
            }
            if pieces.peek().is_some() {
                blocks.push(std::mem::take(&mut current));
            }
        }
    }

    if !current.is_empty() {
        log::debug!("Ignoring {} line(s) after the last '}}'", current.len());
    }
    blocks
}

fn fields<'a, const N: usize>(
    line: SourceLine<'a>,
    block: BlockKind,
) -> Result<[&'a str; N], LayerDefError> {
    let tokens: Vec<&str> = line.text.split_whitespace().collect();
    let found = tokens.len();
    tokens.try_into().map_err(|_| LayerDefError::FieldCount {
        line: line.number,
        block,
        expected: N,
        found,
        text: line.text.to_string(),
    })
}

fn number<T: FromStr>(line: SourceLine<'_>, field: &'static str, value: &str) -> Result<T, LayerDefError> {
    value.parse().map_err(|_| LayerDefError::InvalidNumber {
        line: line.number,
        field,
        value: value.to_string(),
        text: line.text.to_string(),
    })
}

fn length(line: SourceLine<'_>, field: &'static str, value: &str) -> Result<f64, LayerDefError> {
    let parsed: f64 = number(line, field, value)?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(LayerDefError::InvalidNumber {
            line: line.number,
            field,
            value: value.to_string(),
            text: line.text.to_string(),
        })
    }
}

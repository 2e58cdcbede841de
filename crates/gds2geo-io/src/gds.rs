//! GDS-II stream decoder.
//!
//! Walks the record stream and keeps only what geometry extraction needs:
//! boundaries and paths with their layer, datatype and raw integer
//! coordinates. Other element kinds are reported as
//! [`LayoutElement::Other`] so callers can count them.
//!
//! ## GDS-II Record Structure
//! Each record: [2-byte length][2-byte record type][payload]
//! Record types define the hierarchy: BGNLIB → BGNSTR → BOUNDARY/PATH/SREF → ENDSTR → ENDLIB

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use gds2geo_core::element::{ElementKind, LayoutElement};
use gds2geo_core::geometry::Point;

// ── GDS-II Record Types ──────────────────────────────────────────────

#[allow(dead_code)]
pub(crate) mod record_type {
    pub const HEADER: u16     = 0x0002;
    pub const BGNLIB: u16     = 0x0102;
    pub const LIBNAME: u16    = 0x0206;
    pub const UNITS: u16      = 0x0305;
    pub const ENDLIB: u16     = 0x0400;
    pub const BGNSTR: u16     = 0x0502;
    pub const STRNAME: u16    = 0x0606;
    pub const ENDSTR: u16     = 0x0700;
    pub const BOUNDARY: u16   = 0x0800;
    pub const PATH: u16       = 0x0900;
    pub const SREF: u16       = 0x0A00;
    pub const AREF: u16       = 0x0B00;
    pub const TEXT: u16       = 0x0C00;
    pub const LAYER: u16      = 0x0D02;
    pub const DATATYPE: u16   = 0x0E02;
    pub const WIDTH: u16      = 0x0F03;
    pub const XY: u16         = 0x1003;
    pub const ENDEL: u16      = 0x1100;
    pub const NODE: u16       = 0x1500;
    pub const STRING: u16     = 0x1906;
    pub const PATHTYPE: u16   = 0x2102;
    pub const BOX: u16        = 0x2D00;
}

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum GdsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid GDS-II record at offset {offset}: {message}")]
    InvalidRecord { offset: u64, message: String },

    #[error("Unexpected record type 0x{record_type:04X}, expected 0x{expected:04X}")]
    UnexpectedRecord { record_type: u16, expected: u16 },

    #[error("Stream ended inside {0}")]
    UnexpectedEof(&'static str),
}

// ── Decoded library ───────────────────────────────────────────────────

/// The `UNITS` record: database unit in user units and in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GdsUnits {
    pub user_units_per_db_unit: f64,
    pub meters_per_db_unit: f64,
}

impl Default for GdsUnits {
    fn default() -> Self {
        Self {
            user_units_per_db_unit: 1e-3,
            meters_per_db_unit: 1e-9,
        }
    }
}

/// One structure (cell) and its elements in stream order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdsStructure {
    pub name: String,
    pub elements: Vec<LayoutElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GdsLibrary {
    pub name: String,
    pub units: GdsUnits,
    pub structures: Vec<GdsStructure>,
}

impl GdsLibrary {
    pub fn structure_names(&self) -> Vec<&str> {
        self.structures.iter().map(|s| s.name.as_str()).collect()
    }
}

// ── GDS-II Record ─────────────────────────────────────────────────────

#[derive(Debug)]
struct GdsRecord {
    record_type: u16,
    data: Vec<u8>,
}

impl GdsRecord {
    /// Parse payload as 16-bit integers.
    fn as_i16_vec(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|c| i16::from_be_bytes([c[0], c[1]]))
            .collect()
    }

    /// Parse payload as 32-bit integers.
    fn as_i32_vec(&self) -> Vec<i32> {
        self.data
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Parse payload as ASCII string.
    fn as_string(&self) -> String {
        let s: String = self.data.iter().map(|&b| b as char).collect();
        s.trim_end_matches('\0').to_string()
    }

    /// Parse payload as GDS-II 8-byte reals (excess-64 floating point).
    fn as_f64_vec(&self) -> Vec<f64> {
        self.data
            .chunks_exact(8)
            .map(|c| {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(c);
                gds_real8_to_f64(&bytes)
            })
            .collect()
    }

    fn first_i16(&self) -> Option<i16> {
        self.as_i16_vec().first().copied()
    }

    fn points(&self) -> Vec<Point> {
        self.as_i32_vec()
            .chunks_exact(2)
            .map(|pair| Point::new(pair[0] as i64, pair[1] as i64))
            .collect()
    }
}

/// Convert GDS-II excess-64 real format to IEEE 754 f64.
fn gds_real8_to_f64(bytes: &[u8; 8]) -> f64 {
    if bytes.iter().all(|&b| b == 0) {
        return 0.0;
    }

    let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (bytes[0] & 0x7F) as i32 - 64;

    let mut mantissa: u64 = 0;
    for &b in &bytes[1..] {
        mantissa = (mantissa << 8) | (b as u64);
    }

    let mantissa_f = mantissa as f64 / (1u64 << 56) as f64;
    sign * mantissa_f * 16.0_f64.powi(exponent)
}

/// GDS-II stores layer and datatype as signed 16-bit values; anything
/// negative is out of range for a [`LayerKey`](gds2geo_core::LayerKey).
fn layer_number(value: i16, offset: u64) -> Result<u16, GdsError> {
    u16::try_from(value).map_err(|_| GdsError::InvalidRecord {
        offset,
        message: format!("negative layer or datatype {}", value),
    })
}

// ── GDS-II Reader ─────────────────────────────────────────────────────

pub struct GdsReader<R: Read> {
    reader: R,
    offset: u64,
}

impl<R: Read> GdsReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, offset: 0 }
    }

    /// Decode the entire stream.
    pub fn read(&mut self) -> Result<GdsLibrary, GdsError> {
        self.read_header()?;
        self.read_lib()
    }

    fn read_record(&mut self) -> Result<Option<GdsRecord>, GdsError> {
        let mut len_buf = [0u8; 2];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(GdsError::Io(e)),
        }

        let total_len = u16::from_be_bytes(len_buf) as usize;
        if total_len < 4 {
            return Err(GdsError::InvalidRecord {
                offset: self.offset,
                message: format!("Record length {} is too small", total_len),
            });
        }

        let mut type_buf = [0u8; 2];
        self.reader.read_exact(&mut type_buf)?;
        let record_type = u16::from_be_bytes(type_buf);

        let data_len = total_len - 4;
        let mut data = vec![0u8; data_len];
        if data_len > 0 {
            self.reader.read_exact(&mut data)?;
        }
        self.offset += total_len as u64;

        Ok(Some(GdsRecord { record_type, data }))
    }

    /// Like [`read_record`](Self::read_record), but end of stream is an error.
    fn next_record(&mut self, context: &'static str) -> Result<GdsRecord, GdsError> {
        self.read_record()?.ok_or(GdsError::UnexpectedEof(context))
    }

    fn read_header(&mut self) -> Result<(), GdsError> {
        let rec = self.read_record()?.ok_or(GdsError::InvalidRecord {
            offset: 0,
            message: "Empty file".into(),
        })?;

        if rec.record_type != record_type::HEADER {
            return Err(GdsError::UnexpectedRecord {
                record_type: rec.record_type,
                expected: record_type::HEADER,
            });
        }

        if let Some(version) = rec.first_i16() {
            log::debug!("GDS-II version: {}", version);
        }

        Ok(())
    }

    fn read_lib(&mut self) -> Result<GdsLibrary, GdsError> {
        let mut lib = GdsLibrary {
            name: String::new(),
            units: GdsUnits::default(),
            structures: Vec::new(),
        };

        while let Some(rec) = self.read_record()? {
            match rec.record_type {
                record_type::LIBNAME => {
                    lib.name = rec.as_string();
                    log::debug!("Library name: {}", lib.name);
                }
                record_type::UNITS => {
                    let units = rec.as_f64_vec();
                    if units.len() >= 2 {
                        lib.units = GdsUnits {
                            user_units_per_db_unit: units[0],
                            meters_per_db_unit: units[1],
                        };
                        log::info!(
                            "Database unit: {} user units, {} m",
                            units[0],
                            units[1]
                        );
                    }
                }
                record_type::BGNSTR => {
                    let structure = self.read_structure()?;
                    lib.structures.push(structure);
                }
                record_type::ENDLIB => {
                    log::debug!("End of library. {} structures read.", lib.structures.len());
                    break;
                }
                _ => {}
            }
        }

        Ok(lib)
    }

    fn read_structure(&mut self) -> Result<GdsStructure, GdsError> {
        let mut structure = GdsStructure {
            name: String::from("unnamed"),
            elements: Vec::new(),
        };

        loop {
            let rec = self.next_record("structure")?;
            match rec.record_type {
                record_type::STRNAME => {
                    structure.name = rec.as_string();
                    log::debug!("Reading structure: {}", structure.name);
                }
                record_type::BOUNDARY => {
                    structure.elements.push(self.read_boundary()?);
                }
                record_type::PATH => {
                    structure.elements.push(self.read_path()?);
                }
                record_type::BOX => {
                    self.skip_to_endel()?;
                    structure.elements.push(LayoutElement::Other {
                        kind: ElementKind::Box,
                    });
                }
                record_type::TEXT | record_type::NODE | record_type::SREF | record_type::AREF => {
                    let kind = match rec.record_type {
                        record_type::TEXT => ElementKind::Text,
                        record_type::NODE => ElementKind::Node,
                        record_type::SREF => ElementKind::StructRef,
                        _ => ElementKind::ArrayRef,
                    };
                    self.skip_to_endel()?;
                    structure.elements.push(LayoutElement::Other { kind });
                }
                record_type::ENDSTR => break,
                _ => {}
            }
        }

        log::debug!(
            "Structure {} has {} element(s)",
            structure.name,
            structure.elements.len()
        );
        Ok(structure)
    }

    fn read_boundary(&mut self) -> Result<LayoutElement, GdsError> {
        let mut layer: u16 = 0;
        let mut datatype: u16 = 0;
        let mut points: Vec<Point> = Vec::new();

        loop {
            let rec = self.next_record("boundary")?;
            match rec.record_type {
                record_type::LAYER => {
                    if let Some(v) = rec.first_i16() {
                        layer = layer_number(v, self.offset)?;
                    }
                }
                record_type::DATATYPE => {
                    if let Some(v) = rec.first_i16() {
                        datatype = layer_number(v, self.offset)?;
                    }
                }
                record_type::XY => points.extend(rec.points()),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        Ok(LayoutElement::boundary(layer, datatype, points))
    }

    fn read_path(&mut self) -> Result<LayoutElement, GdsError> {
        let mut layer: u16 = 0;
        let mut datatype: u16 = 0;
        let mut width: i64 = 0;
        let mut points: Vec<Point> = Vec::new();

        loop {
            let rec = self.next_record("path")?;
            match rec.record_type {
                record_type::LAYER => {
                    if let Some(v) = rec.first_i16() {
                        layer = layer_number(v, self.offset)?;
                    }
                }
                record_type::DATATYPE => {
                    if let Some(v) = rec.first_i16() {
                        datatype = layer_number(v, self.offset)?;
                    }
                }
                record_type::PATHTYPE => {
                    if let Some(v) = rec.first_i16() {
                        log::trace!("Path end type {} (square ends are always used)", v);
                    }
                }
                record_type::WIDTH => {
                    // Negative widths mean "absolute" (not scaled by magnification).
                    if let Some(&w) = rec.as_i32_vec().first() {
                        width = (w as i64).abs();
                    }
                }
                record_type::XY => points.extend(rec.points()),
                record_type::ENDEL => break,
                _ => {}
            }
        }

        Ok(LayoutElement::path(layer, datatype, points, width))
    }

    fn skip_to_endel(&mut self) -> Result<(), GdsError> {
        loop {
            let rec = self.next_record("element")?;
            if rec.record_type == record_type::ENDEL {
                break;
            }
        }
        Ok(())
    }
}

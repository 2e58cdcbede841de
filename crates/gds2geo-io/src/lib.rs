//! # gds2geo I/O
//!
//! File formats around the core: the layer definition file, the GDS-II
//! stream decoder, the `.geo` writer and reader, and the conversion job
//! that ties them together.

pub mod config;
pub mod convert;
pub mod gds;
pub mod geo;
pub mod layerdef;

pub use config::{ConfigError, ConvertConfig, StructureSelection};
pub use convert::{convert, verify, ConvertError, ConvertReport};
pub use gds::{GdsError, GdsLibrary, GdsReader, GdsStructure, GdsUnits};
pub use geo::{geo_path_for, GeoError, GeoFile, GeoWriter};
pub use layerdef::{parse_layer_definitions, read_layer_definitions, LayerDefError};

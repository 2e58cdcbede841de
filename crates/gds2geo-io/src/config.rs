use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::geo_path_for;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid job file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which structure of the layout library to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureSelection {
    /// The first structure in the stream.
    #[default]
    First,
    Named(String),
}

/// Settings for one layout-to-`.geo` conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// GDS-II layout stream.
    pub layout_file: PathBuf,
    /// Layer definition file.
    pub layer_file: PathBuf,
    /// Output path; derived from `layout_file` when absent.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub structure: StructureSelection,
    /// Where to dump the resolved layer table as JSON, if anywhere.
    #[serde(default)]
    pub layers_json: Option<PathBuf>,
}

impl ConvertConfig {
    pub fn new(layout_file: impl Into<PathBuf>, layer_file: impl Into<PathBuf>) -> Self {
        Self {
            layout_file: layout_file.into(),
            layer_file: layer_file.into(),
            output: None,
            structure: StructureSelection::default(),
            layers_json: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_structure(mut self, name: &str) -> Self {
        self.structure = StructureSelection::Named(name.to_string());
        self
    }

    pub fn with_layers_json(mut self, path: impl Into<PathBuf>) -> Self {
        self.layers_json = Some(path.into());
        self
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| geo_path_for(&self.layout_file))
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

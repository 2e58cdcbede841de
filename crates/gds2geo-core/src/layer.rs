use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A GDS-II `(layer, datatype)` pair, the only way stream elements name a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerKey {
    pub layer: u16,
    pub datatype: u16,
}

impl LayerKey {
    pub fn new(layer: u16, datatype: u16) -> Self {
        Self { layer, datatype }
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.layer, self.datatype)
    }
}

/// A conductive layer with a height range in nanometers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetalLayer {
    pub name: String,
    pub key: LayerKey,
    pub bottom_height: i64,
    pub top_height: i64,
    /// Declaration order among metals.
    pub index: usize,
}

/// An interconnect layer between two metals. Its heights are taken from the
/// metals it joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViaLayer {
    pub name: String,
    pub key: LayerKey,
    pub bottom_height: i64,
    pub top_height: i64,
    /// Declaration order among vias (not offset by the metal count).
    pub index: usize,
    pub bottom_metal: String,
    pub top_metal: String,
}

/// What a layer name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerRef {
    Metal(usize),
    Via(usize),
}

impl LayerRef {
    /// Index in the combined metals-then-vias numbering used by `.geo` files.
    pub fn global_index(self, metal_count: usize) -> usize {
        match self {
            LayerRef::Metal(i) => i,
            LayerRef::Via(i) => metal_count + i,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayerError {
    #[error("layer '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("layer key {key} of '{name}' is already used by '{existing}'")]
    DuplicateKey {
        key: LayerKey,
        name: String,
        existing: String,
    },

    #[error("via '{via}' references metal '{metal}' which has not been declared")]
    UndeclaredMetal { via: String, metal: String },

    #[error("metal '{name}' has non-positive thickness {thickness}")]
    NonPositiveThickness { name: String, thickness: i64 },
}

/// The resolved metal and via stack.
///
/// Holds the ordered layer records plus two lookups: name to layer, and
/// stream key to name. Only [`LayerTableBuilder`] creates one, so a table is
/// never modified after it is handed out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LayerTable {
    metals: Vec<MetalLayer>,
    vias: Vec<ViaLayer>,
    #[serde(skip)]
    names: HashMap<String, LayerRef>,
    #[serde(skip)]
    keys: HashMap<LayerKey, String>,
}

impl LayerTable {
    pub fn metals(&self) -> &[MetalLayer] {
        &self.metals
    }

    pub fn vias(&self) -> &[ViaLayer] {
        &self.vias
    }

    pub fn metal_count(&self) -> usize {
        self.metals.len()
    }

    pub fn via_count(&self) -> usize {
        self.vias.len()
    }

    pub fn layer_count(&self) -> usize {
        self.metals.len() + self.vias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layer_count() == 0
    }

    /// Case-insensitive name lookup.
    pub fn resolve_name(&self, name: &str) -> Option<LayerRef> {
        self.names.get(&name.to_lowercase()).copied()
    }

    pub fn resolve_key(&self, key: LayerKey) -> Option<LayerRef> {
        self.keys.get(&key).and_then(|name| self.names.get(name)).copied()
    }

    pub fn name_for_key(&self, key: LayerKey) -> Option<&str> {
        self.keys.get(&key).map(String::as_str)
    }

    pub fn metal(&self, name: &str) -> Option<&MetalLayer> {
        match self.resolve_name(name)? {
            LayerRef::Metal(i) => self.metals.get(i),
            LayerRef::Via(_) => None,
        }
    }

    pub fn via(&self, name: &str) -> Option<&ViaLayer> {
        match self.resolve_name(name)? {
            LayerRef::Via(i) => self.vias.get(i),
            LayerRef::Metal(_) => None,
        }
    }

    /// Display name of a layer reference.
    pub fn layer_name(&self, layer: LayerRef) -> Option<&str> {
        match layer {
            LayerRef::Metal(i) => self.metals.get(i).map(|m| m.name.as_str()),
            LayerRef::Via(i) => self.vias.get(i).map(|v| v.name.as_str()),
        }
    }

    /// Metal indices joined by a via, bottom first.
    pub fn via_connection(&self, via: &ViaLayer) -> Option<(usize, usize)> {
        let bottom = self.metal(&via.bottom_metal)?.index;
        let top = self.metal(&via.top_metal)?.index;
        Some((bottom, top))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Accumulates layer declarations in order and checks the table invariants as
/// each one arrives.
#[derive(Debug, Default)]
pub struct LayerTableBuilder {
    table: LayerTable,
}

impl LayerTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a metal. Heights are in nanometers.
    pub fn add_metal(
        &mut self,
        name: &str,
        key: LayerKey,
        bottom_height: i64,
        thickness: i64,
    ) -> Result<&MetalLayer, LayerError> {
        let name = name.to_lowercase();
        if thickness <= 0 {
            return Err(LayerError::NonPositiveThickness { name, thickness });
        }
        self.claim(&name, key)?;

        let index = self.table.metals.len();
        self.table.names.insert(name.clone(), LayerRef::Metal(index));
        self.table.keys.insert(key, name.clone());
        self.table.metals.push(MetalLayer {
            name,
            key,
            bottom_height,
            top_height: bottom_height + thickness,
            index,
        });
        Ok(&self.table.metals[index])
    }

    /// Declare a via between two already declared metals.
    pub fn add_via(
        &mut self,
        name: &str,
        key: LayerKey,
        bottom_metal: &str,
        top_metal: &str,
    ) -> Result<&ViaLayer, LayerError> {
        let name = name.to_lowercase();
        let bottom = self.declared_metal(&name, bottom_metal)?;
        let top = self.declared_metal(&name, top_metal)?;
        let (bottom_height, bottom_metal) = (bottom.top_height, bottom.name.clone());
        let (top_height, top_metal) = (top.bottom_height, top.name.clone());
        self.claim(&name, key)?;

        let index = self.table.vias.len();
        self.table.names.insert(name.clone(), LayerRef::Via(index));
        self.table.keys.insert(key, name.clone());
        self.table.vias.push(ViaLayer {
            name,
            key,
            bottom_height,
            top_height,
            index,
            bottom_metal,
            top_metal,
        });
        Ok(&self.table.vias[index])
    }

    pub fn build(self) -> LayerTable {
        self.table
    }

    fn declared_metal(&self, via: &str, metal: &str) -> Result<&MetalLayer, LayerError> {
        self.table
            .metal(metal)
            .ok_or_else(|| LayerError::UndeclaredMetal {
                via: via.to_string(),
                metal: metal.to_lowercase(),
            })
    }

    fn claim(&self, name: &str, key: LayerKey) -> Result<(), LayerError> {
        if self.table.names.contains_key(name) {
            return Err(LayerError::DuplicateName(name.to_string()));
        }
        if let Some(existing) = self.table.keys.get(&key) {
            return Err(LayerError::DuplicateKey {
                key,
                name: name.to_string(),
                existing: existing.clone(),
            });
        }
        Ok(())
    }
}

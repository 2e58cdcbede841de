//! One-shot layout to `.geo` conversion.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use gds2geo_core::classify::{ClassificationStats, ClassifyError, GeometryClassifier};

use crate::config::{ConvertConfig, StructureSelection};
use crate::gds::{GdsError, GdsLibrary, GdsReader, GdsStructure};
use crate::geo::{GeoError, GeoFile, GeoWriter};
use crate::layerdef::{read_layer_definitions, LayerDefError};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("layer file {}: {source}", path.display())]
    LayerDef {
        path: PathBuf,
        #[source]
        source: LayerDefError,
    },

    #[error("cannot open layout {}: {source}", path.display())]
    OpenLayout {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("layout {}: {source}", path.display())]
    Gds {
        path: PathBuf,
        #[source]
        source: GdsError,
    },

    #[error("output {} would overwrite the layout it is read from", .0.display())]
    OutputIsLayout(PathBuf),

    #[error("library '{0}' contains no structures")]
    NoStructures(String),

    #[error("structure '{name}' not found, library has: {available}")]
    StructureNotFound { name: String, available: String },

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: GeoError,
    },

    #[error("cannot write layer table {}: {source}", path.display())]
    LayersJson {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("layer table serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{} does not match what was written: {message}", path.display())]
    VerifyMismatch { path: PathBuf, message: String },
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    pub output: PathBuf,
    pub library: String,
    pub structure: String,
    pub metal_count: usize,
    pub via_count: usize,
    /// Polygons written per layer, metals first.
    pub polygons_per_layer: Vec<usize>,
    pub stats: ClassificationStats,
}

impl ConvertReport {
    pub fn polygon_count(&self) -> usize {
        self.polygons_per_layer.iter().sum()
    }
}

/// Convert one layout structure to a `.geo` file.
///
/// The output file is only created once every element has been classified,
/// so a rejected layout never leaves a partial file behind. The optional
/// layer-table JSON is written before the `.geo` file.
pub fn convert(config: &ConvertConfig) -> Result<ConvertReport, ConvertError> {
    let output = config.output_path();
    if same_file(&output, &config.layout_file) {
        return Err(ConvertError::OutputIsLayout(output));
    }

    let table = read_layer_definitions(&config.layer_file).map_err(|source| {
        ConvertError::LayerDef {
            path: config.layer_file.clone(),
            source,
        }
    })?;
    log::info!(
        "Loaded {} metal and {} via layer(s) from {}",
        table.metal_count(),
        table.via_count(),
        config.layer_file.display()
    );
    if table.is_empty() {
        log::warn!(
            "{} declares no layers, the output will be empty",
            config.layer_file.display()
        );
    }

    let library = read_library(config)?;
    let library_name = library.name.clone();
    let structure = select_structure(library, &config.structure)?;
    log::info!(
        "Extracting structure '{}' ({} elements)",
        structure.name,
        structure.elements.len()
    );

    let mut classifier = GeometryClassifier::new(&table);
    classifier.classify_all(structure.elements)?;
    let (mut buckets, stats) = classifier.finish();
    let polygons_per_layer = buckets.counts();
    log::debug!("Classification: {:?}", stats);

    if let Some(path) = &config.layers_json {
        std::fs::write(path, table.to_json()?).map_err(|source| ConvertError::LayersJson {
            path: path.clone(),
            source,
        })?;
        log::info!("Wrote layer table to {}", path.display());
    }

    let written = File::create(&output)
        .map_err(GeoError::from)
        .and_then(|file| GeoWriter::new(BufWriter::new(file)).write(&table, &mut buckets));
    if let Err(source) = written {
        if output.exists() {
            if let Err(e) = std::fs::remove_file(&output) {
                log::warn!("Could not remove partial output {}: {}", output.display(), e);
            }
        }
        return Err(ConvertError::Write {
            path: output,
            source,
        });
    }
    log::info!("Wrote {}", output.display());

    Ok(ConvertReport {
        output,
        library: library_name,
        structure: structure.name,
        metal_count: table.metal_count(),
        via_count: table.via_count(),
        polygons_per_layer,
        stats,
    })
}

/// Read back a converted file and check it against its report.
pub fn verify(report: &ConvertReport) -> Result<GeoFile, ConvertError> {
    let mismatch = |message: String| ConvertError::VerifyMismatch {
        path: report.output.clone(),
        message,
    };

    let geo = GeoFile::read(&report.output).map_err(|e| mismatch(e.to_string()))?;
    if geo.metals.len() != report.metal_count || geo.vias.len() != report.via_count {
        return Err(mismatch(format!(
            "expected {} metal and {} via layer(s), found {} and {}",
            report.metal_count,
            report.via_count,
            geo.metals.len(),
            geo.vias.len()
        )));
    }
    let counts = geo.counts();
    if counts != report.polygons_per_layer {
        return Err(mismatch(format!(
            "polygon counts {:?}, expected {:?}",
            counts, report.polygons_per_layer
        )));
    }
    if let Some((i, layer)) = geo.layers.iter().enumerate().find(|(i, l)| l.index != *i) {
        return Err(mismatch(format!(
            "layer section {} carries index {}",
            i, layer.index
        )));
    }
    Ok(geo)
}

/// Equal paths, or two existing paths that resolve to the same file.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn read_library(config: &ConvertConfig) -> Result<GdsLibrary, ConvertError> {
    let path = &config.layout_file;
    let file = File::open(path).map_err(|source| ConvertError::OpenLayout {
        path: path.clone(),
        source,
    })?;
    let library = GdsReader::new(BufReader::new(file))
        .read()
        .map_err(|source| ConvertError::Gds {
            path: path.clone(),
            source,
        })?;
    log::info!(
        "Read library '{}' with {} structure(s) from {}",
        library.name,
        library.structures.len(),
        path.display()
    );
    Ok(library)
}

fn select_structure(
    library: GdsLibrary,
    selection: &StructureSelection,
) -> Result<GdsStructure, ConvertError> {
    match selection {
        StructureSelection::First => {
            if library.structures.len() > 1 {
                log::warn!(
                    "Library '{}' has {} structures, only '{}' is extracted",
                    library.name,
                    library.structures.len(),
                    library.structures[0].name
                );
            }
            library
                .structures
                .into_iter()
                .next()
                .ok_or(ConvertError::NoStructures(library.name))
        }
        StructureSelection::Named(name) => {
            let available = library.structure_names().join(", ");
            library
                .structures
                .into_iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| ConvertError::StructureNotFound {
                    name: name.clone(),
                    available,
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gds::test_support::GdsBuilder;
    use tempfile::TempDir;

    const LAYERS: &str = "\
unit: nm
metal {
    m1 10 0 300 200
    m2 20 0 800 250
}
unit: nm
via {
    v1 15 0 m1 m2
}
";

    fn layout() -> Vec<u8> {
        let mut b = GdsBuilder::library("LIB");
        b.begin_structure("TOP")
            .boundary(10, 0, &[(0, 0), (10, 0), (10, 10), (0, 10), (0, 0)])
            .path(20, 0, 10, &[(0, 0), (100, 0), (100, 100)])
            .boundary(15, 0, &[(1, 1), (2, 1), (2, 2), (1, 2), (1, 1)])
            .boundary(63, 0, &[(0, 0), (1, 0), (1, 1), (0, 1), (0, 0)])
            .text(10, (5, 5), "VDD")
            .end_structure();
        b.begin_structure("SUB")
            .boundary(20, 0, &[(0, 0), (3, 0), (3, 3), (0, 3), (0, 0)])
            .end_structure();
        b.finish()
    }

    fn setup(dir: &Path, gds: &[u8]) -> ConvertConfig {
        let layout = dir.join("chip.gds");
        let layers = dir.join("tech.layers");
        std::fs::write(&layout, gds).unwrap();
        std::fs::write(&layers, LAYERS).unwrap();
        ConvertConfig::new(layout, layers)
    }

    #[test]
    fn test_convert_first_structure() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path(), &layout());

        let report = convert(&config).unwrap();
        assert_eq!(report.output, dir.path().join("chip.geo"));
        assert_eq!(report.library, "LIB");
        assert_eq!(report.structure, "TOP");
        assert_eq!(report.polygons_per_layer, vec![1, 2, 1]);
        assert_eq!(report.stats.boundaries_dropped, 1);
        assert_eq!(report.stats.ignored, 1);

        let text = std::fs::read_to_string(&report.output).unwrap();
        assert!(text.starts_with("2\n0, 300, 500\n1, 800, 1050\n1\n2, 500, 800, 0, 1\n"));

        let geo = verify(&report).unwrap();
        assert_eq!(geo.polygon_count(), report.polygon_count());
    }

    #[test]
    fn test_convert_named_structure() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path(), &layout())
            .with_structure("SUB")
            .with_output(dir.path().join("sub.geo"));

        let report = convert(&config).unwrap();
        assert_eq!(report.structure, "SUB");
        assert_eq!(report.polygons_per_layer, vec![0, 1, 0]);
        assert!(dir.path().join("sub.geo").exists());
        assert!(!dir.path().join("chip.geo").exists());
    }

    #[test]
    fn test_unknown_structure() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path(), &layout()).with_structure("MISSING");
        let err = convert(&config).unwrap_err();
        assert!(
            matches!(err, ConvertError::StructureNotFound { ref available, .. } if available == "TOP, SUB")
        );
    }

    #[test]
    fn test_empty_library() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path(), &GdsBuilder::library("EMPTY").finish());
        let err = convert(&config).unwrap_err();
        assert!(matches!(err, ConvertError::NoStructures(ref name) if name == "EMPTY"));
    }

    #[test]
    fn test_rejected_wire_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let mut b = GdsBuilder::library("LIB");
        b.begin_structure("TOP")
            .boundary(10, 0, &[(0, 0), (10, 0), (10, 10), (0, 10), (0, 0)])
            .path(15, 0, 4, &[(0, 0), (10, 0)])
            .end_structure();
        let config = setup(dir.path(), &b.finish());

        let err = convert(&config).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Classify(ClassifyError::WireOnVia { .. })
        ));
        assert!(!config.output_path().exists());
    }

    #[test]
    fn test_bad_layer_file() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path(), &layout());
        std::fs::write(&config.layer_file, "metal {\n m1 10 0 300\n}\n").unwrap();
        let err = convert(&config).unwrap_err();
        assert!(matches!(err, ConvertError::LayerDef { .. }));
        assert!(!config.output_path().exists());
    }

    #[test]
    fn test_missing_layout() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path(), &layout());
        let config = ConvertConfig::new(dir.path().join("nope.gds"), config.layer_file);
        assert!(matches!(
            convert(&config).unwrap_err(),
            ConvertError::OpenLayout { .. }
        ));
    }

    #[test]
    fn test_layers_json_dump() {
        let dir = TempDir::new().unwrap();
        let json_path = dir.path().join("layers.json");
        let config = setup(dir.path(), &layout()).with_layers_json(&json_path);
        convert(&config).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(value["metals"][1]["name"], "m2");
        assert_eq!(value["vias"][0]["top_metal"], "m2");
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path(), &layout());
        let mut report = convert(&config).unwrap();
        report.polygons_per_layer[0] += 1;
        assert!(matches!(
            verify(&report).unwrap_err(),
            ConvertError::VerifyMismatch { .. }
        ));
    }

    #[test]
    fn test_layout_with_geo_extension_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let gds = layout();
        let config = setup(dir.path(), &gds);
        let layout_path = dir.path().join("chip.geo");
        std::fs::rename(&config.layout_file, &layout_path).unwrap();
        let config = ConvertConfig::new(&layout_path, &config.layer_file);

        let err = convert(&config).unwrap_err();
        assert!(matches!(err, ConvertError::OutputIsLayout(ref p) if p == &layout_path));
        assert_eq!(std::fs::read(&layout_path).unwrap(), gds);

        let config = ConvertConfig::new(&layout_path, &config.layer_file)
            .with_output(dir.path().join(".").join("chip.geo"));
        assert!(matches!(
            convert(&config).unwrap_err(),
            ConvertError::OutputIsLayout(_)
        ));
    }

    #[test]
    fn test_failed_layers_json_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path(), &layout())
            .with_layers_json(dir.path().join("missing").join("layers.json"));

        let err = convert(&config).unwrap_err();
        assert!(matches!(err, ConvertError::LayersJson { .. }));
        assert!(!config.output_path().exists());
    }

    #[test]
    fn test_empty_layer_file_writes_empty_geo() {
        let dir = TempDir::new().unwrap();
        let mut b = GdsBuilder::library("LIB");
        b.begin_structure("TOP")
            .boundary(10, 0, &[(0, 0), (10, 0), (10, 10), (0, 10), (0, 0)])
            .boundary(15, 0, &[(1, 1), (2, 1), (2, 2), (1, 2), (1, 1)])
            .end_structure();
        let config = setup(dir.path(), &b.finish());
        std::fs::write(&config.layer_file, "# nothing declared\n").unwrap();

        let report = convert(&config).unwrap();
        assert_eq!(report.stats.boundaries_dropped, 2);
        assert_eq!(std::fs::read_to_string(&report.output).unwrap(), "0\n0\n");
    }
}

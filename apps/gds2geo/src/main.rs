use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use gds2geo_io::{convert, verify, ConvertConfig};

/// Arguments to `gds2geo`.
#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = "Extract the metal and via geometry of one GDS-II structure into a .geo file \
                  for capacitance extraction. Wires are decomposed into rectangles; boundaries \
                  on layers missing from the layer file are dropped."
)]
struct Args {
    /// The GDS-II layout file.
    #[arg(required_unless_present = "config")]
    layout: Option<PathBuf>,
    /// The layer definition file.
    #[arg(short, long, required_unless_present = "config")]
    layer: Option<PathBuf>,
    /// Where to write the .geo file. Defaults to the layout path with a `.geo` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Extract this structure instead of the first one in the library.
    #[arg(short, long)]
    structure: Option<String>,
    /// Also write the resolved layer table as JSON.
    #[arg(long)]
    layers_json: Option<PathBuf>,
    /// A JSON job file. Options given on the command line take precedence.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read the output back and check it against what was written.
    #[arg(long)]
    verify: bool,
    /// Print a JSON summary of the conversion.
    #[arg(long)]
    report: bool,
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,
    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Merge the job file, if any, with the command line.
    fn job(&self) -> anyhow::Result<ConvertConfig> {
        let mut job = match &self.config {
            Some(path) => ConvertConfig::from_json_file(path)
                .with_context(|| format!("Failed to load job file {}", path.display()))?,
            None => match (&self.layout, &self.layer) {
                (Some(layout), Some(layer)) => ConvertConfig::new(layout, layer),
                _ => bail!("a layout file and a layer file are required"),
            },
        };

        if let Some(layout) = &self.layout {
            job.layout_file = layout.clone();
        }
        if let Some(layer) = &self.layer {
            job.layer_file = layer.clone();
        }
        if let Some(output) = &self.output {
            job.output = Some(output.clone());
        }
        if let Some(structure) = &self.structure {
            job = job.with_structure(structure);
        }
        if let Some(path) = &self.layers_json {
            job.layers_json = Some(path.clone());
        }
        Ok(job)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    let job = args.job()?;
    println!("LAYER_FILE: {}", job.layer_file.display());
    println!("GDSii_FILE: {}", job.layout_file.display());
    println!("OUTPUTFILE: {}", job.output_path().display());

    let report = convert(&job).with_context(|| {
        format!("Failed to convert {}", job.layout_file.display())
    })?;
    log::info!(
        "{} polygon(s) on {} layer(s)",
        report.polygon_count(),
        report.polygons_per_layer.len()
    );

    if args.verify {
        verify(&report).context("Verification failed")?;
        log::info!("Verified {}", report.output.display());
    }
    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    println!("Success.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gds2geo_io::StructureSelection;

    #[test]
    fn test_positional_arguments() {
        let args = Args::try_parse_from(["gds2geo", "chip.gds", "-l", "tech.layers"]).unwrap();
        let job = args.job().unwrap();
        assert_eq!(job.layout_file, PathBuf::from("chip.gds"));
        assert_eq!(job.layer_file, PathBuf::from("tech.layers"));
        assert_eq!(job.output_path(), PathBuf::from("chip.geo"));
        assert_eq!(job.structure, StructureSelection::First);
        assert_eq!(args.log_filter(), "warn");
    }

    #[test]
    fn test_layer_file_is_required() {
        assert!(Args::try_parse_from(["gds2geo", "chip.gds"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "gds2geo",
            "chip.gds",
            "--layer",
            "tech.layers",
            "-o",
            "out/x.geo",
            "-s",
            "TOP",
            "-vv",
        ])
        .unwrap();
        let job = args.job().unwrap();
        assert_eq!(job.output_path(), PathBuf::from("out/x.geo"));
        assert_eq!(job.structure, StructureSelection::Named("TOP".into()));
        assert_eq!(args.log_filter(), "debug");
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["gds2geo", "a.gds", "-l", "a.layers", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_job_file_with_command_line_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let job_path = dir.path().join("job.json");
        std::fs::write(
            &job_path,
            r#"{
                "layout_file": "chip.gds",
                "layer_file": "tech.layers",
                "output": "job.geo",
                "structure": { "named": "TOP" }
            }"#,
        )
        .unwrap();
        let config = job_path.to_str().unwrap();

        let args = Args::try_parse_from(["gds2geo", "--config", config]).unwrap();
        let job = args.job().unwrap();
        assert_eq!(job.layout_file, PathBuf::from("chip.gds"));
        assert_eq!(job.output_path(), PathBuf::from("job.geo"));
        assert_eq!(job.structure, StructureSelection::Named("TOP".into()));

        let args = Args::try_parse_from([
            "gds2geo",
            "other.gds",
            "--config",
            config,
            "-l",
            "other.layers",
            "-s",
            "SUB",
            "--layers-json",
            "layers.json",
        ])
        .unwrap();
        let job = args.job().unwrap();
        assert_eq!(job.layout_file, PathBuf::from("other.gds"));
        assert_eq!(job.layer_file, PathBuf::from("other.layers"));
        assert_eq!(job.output_path(), PathBuf::from("job.geo"));
        assert_eq!(job.structure, StructureSelection::Named("SUB".into()));
        assert_eq!(job.layers_json, Some(PathBuf::from("layers.json")));
    }

    #[test]
    fn test_missing_job_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");
        let args =
            Args::try_parse_from(["gds2geo", "--config", missing.to_str().unwrap()]).unwrap();
        assert!(args.job().is_err());
    }
}

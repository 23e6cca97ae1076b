use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use compute::{AreaUnit, MergeEngine, SelectionMode, area_in_unit, format_area, geodesic_area_m2};
use drawing::EngineConfig;
use formats::{decode_str, encode, encode_projected};
use foundation::math::Projection;
use scene::Feature;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Site-boundary geometry tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the area of every feature in a GeoJSON file
    Area {
        file: PathBuf,

        /// m2 or ha
        #[arg(long, default_value = "m2")]
        unit: AreaUnit,

        /// Projection the file's coordinates are in
        #[arg(long, default_value = "EPSG:4326")]
        data_projection: Projection,
    },

    /// Reproject a GeoJSON file
    Convert {
        file: PathBuf,

        #[arg(long)]
        from: Projection,

        #[arg(long)]
        to: Projection,
    },

    /// Union the polygons of several query results into one boundary
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// How each file is folded into the selection: replace or toggle
        #[arg(long, default_value = "toggle")]
        mode: SelectionMode,

        #[arg(long, default_value = "EPSG:4326")]
        data_projection: Projection,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let args = Args::parse();
    let config = EngineConfig::from_env();
    debug!("config: {config:?}");

    match args.command {
        Command::Area {
            file,
            unit,
            data_projection,
        } => cmd_area(&config, &file, unit, data_projection),
        Command::Convert { file, from, to } => cmd_convert(&file, from, to),
        Command::Merge {
            files,
            mode,
            data_projection,
        } => cmd_merge(&config, &files, mode, data_projection),
    }
}

fn read_features(path: &Path, projection: Projection) -> Result<Vec<Feature>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
    decode_str(&text, projection).map_err(|e| format!("decode {path:?}: {e}"))
}

fn cmd_area(
    config: &EngineConfig,
    file: &Path,
    unit: AreaUnit,
    data_projection: Projection,
) -> Result<(), String> {
    let features = read_features(file, data_projection)?;
    let mut total = 0.0;
    for (i, feature) in features.iter().enumerate() {
        let name = feature
            .id
            .clone()
            .or_else(|| feature.label().map(str::to_string))
            .unwrap_or_else(|| (i + 1).to_string());
        let area = format_area(&feature.geometry, unit, config.area_rounding);
        println!("{name}\t{area}");
        total += geodesic_area_m2(&feature.geometry);
    }
    if features.len() > 1 {
        let total = area_in_unit(total, unit, config.area_rounding);
        println!("total\t{total} {}", unit.suffix());
    }
    Ok(())
}

fn cmd_convert(file: &Path, from: Projection, to: Projection) -> Result<(), String> {
    let features = read_features(file, from)?;
    let collection = encode(&features, to);
    let payload = serde_json::to_string_pretty(&collection).map_err(|e| format!("json: {e}"))?;
    println!("{payload}");
    info!("converted {} feature(s) from {from} to {to}", features.len());
    Ok(())
}

fn cmd_merge(
    config: &EngineConfig,
    files: &[PathBuf],
    mode: SelectionMode,
    data_projection: Projection,
) -> Result<(), String> {
    let mut engine = MergeEngine::new(config.merge_options());
    for file in files {
        let features = read_features(file, data_projection)?;
        debug!("{file:?}: {} feature(s)", features.len());
        engine.update_pool(features, mode);
    }
    let merged = engine.retry_union().map_err(|e| e.to_string())?.cloned();
    info!(
        "merged {} selected feature(s) into {}",
        engine.pool().len(),
        merged
            .as_ref()
            .map_or("nothing", |f| f.geometry.kind().as_str())
    );
    let payload = encode_projected(merged.as_slice());
    let text = serde_json::to_string_pretty(&payload).map_err(|e| format!("json: {e}"))?;
    println!("{text}");
    Ok(())
}

//! AMREL command line - automatic mountain road extraction from LiDAR data

use anyhow::{Context, Result};
use clap::Parser;
use amrel_pipeline::{AmrelConfig, AmrelTool, ExportMode, Step};
use amrel_tiles::CloudAccess;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "amrel")]
#[command(version, about = "Automatic mountain road extraction from LiDAR data", long_about = None)]
struct Cli {
    /// Tile or tile-set name to process (without extension)
    input: Option<String>,

    /// Complete automatic detection (default)
    #[arg(long)]
    auto: bool,
    /// Stages 1-5 only, producing seeds
    #[arg(long)]
    sawing: bool,
    /// DTM shading stage only
    #[arg(long)]
    shade: bool,
    /// RORPO filtering stage only
    #[arg(long)]
    rorpo: bool,
    /// Sobel gradient stage only
    #[arg(long)]
    sobel: bool,
    /// Blurred segment detection stage only
    #[arg(long)]
    fbsd: bool,
    /// Seed generation stage only
    #[arg(long)]
    seeds: bool,
    /// Road extraction stage only
    #[arg(long)]
    asd: bool,

    /// Use the sparsest point cloud class
    #[arg(long)]
    eco: bool,
    /// Use the intermediate point cloud class
    #[arg(long)]
    mid: bool,
    /// Use the densest point cloud class
    #[arg(long)]
    top: bool,

    /// Sawing pad size in tiles (positive odd)
    #[arg(long)]
    pad: Option<i32>,
    /// Point tile buffer size in tiles (positive odd, 0 = all resident)
    #[arg(long)]
    buf: Option<i32>,

    /// Produce the hill-shaded DTM image and stop
    #[arg(long)]
    hill: bool,
    /// Emit the PNG image of the processed stage
    #[arg(long)]
    map: bool,
    /// Colorize output images
    #[arg(long)]
    color: bool,
    /// Draw outputs over the shaded DTM
    #[arg(long)]
    dtm: bool,
    /// Use loose road points instead of connected strips
    #[arg(long)]
    unconnected: bool,

    /// Minimal blurred segment length
    #[arg(long = "bsminlength", value_name = "N")]
    bs_min_length: Option<i32>,
    /// Assigned blurred segment thickness
    #[arg(long = "bsmaxthick", value_name = "N")]
    bs_max_thick: Option<i32>,
    /// Distance between successive seeds
    #[arg(long = "seedshift", value_name = "N")]
    seed_shift: Option<i32>,
    /// Seed width
    #[arg(long = "seedwidth", value_name = "N")]
    seed_width: Option<i32>,

    /// Export detected road bounds as a shapefile
    #[arg(long)]
    export: bool,
    /// Export detected road centerlines as a shapefile
    #[arg(long = "exportlines")]
    export_lines: bool,

    /// Suppress progress output
    #[arg(long)]
    silent: bool,

    /// Directory of DTM files to import
    #[arg(long = "dtmdir", value_name = "DIR")]
    dtm_dir: Option<String>,
    /// Directory of XYZ files to import
    #[arg(long = "xyzdir", value_name = "DIR")]
    xyz_dir: Option<String>,
    /// File to import (.asc for DTM, otherwise XYZ)
    #[arg(long, short = 'i', value_name = "FILE")]
    import: Vec<String>,
    /// Tile to add to the current set (repeatable)
    #[arg(long, short = 't', value_name = "NAME")]
    tile: Vec<String>,
}

fn apply(cli: &Cli, cfg: &mut AmrelConfig) -> Result<()> {
    if cli.auto {
        cfg.set_step(Step::All);
    }
    if cli.sawing {
        cfg.set_step(Step::Sawing);
    }
    if cli.shade {
        cfg.set_step(Step::Shade);
    }
    if cli.rorpo {
        cfg.set_step(Step::Rorpo);
    }
    if cli.sobel {
        cfg.set_step(Step::Sobel);
    }
    if cli.fbsd {
        cfg.set_step(Step::Fbsd);
    }
    if cli.seeds {
        cfg.set_step(Step::Seeds);
    }
    if cli.asd {
        cfg.set_step(Step::Asd);
    }

    if cli.eco {
        cfg.set_cloud_access(CloudAccess::Eco);
    }
    if cli.mid {
        cfg.set_cloud_access(CloudAccess::Mid);
    }
    if cli.top {
        cfg.set_cloud_access(CloudAccess::Top);
    }

    if let Some(pad) = cli.pad {
        cfg.set_pad_size(pad)?;
    }
    if let Some(buf) = cli.buf {
        cfg.set_buffer_size(buf)?;
    }

    if cli.hill {
        cfg.set_hill_map(true);
    }
    if cli.map {
        cfg.set_out_map(true);
    }
    if cli.color {
        cfg.set_false_color(true);
    }
    if cli.dtm {
        cfg.set_back_dtm(true);
    }
    if cli.unconnected {
        cfg.set_connected(false);
    }

    if let Some(v) = cli.bs_min_length {
        cfg.set_min_bs_length(v);
    }
    if let Some(v) = cli.bs_max_thick {
        cfg.set_max_bs_thickness(v);
    }
    if let Some(v) = cli.seed_shift {
        cfg.set_seed_shift(v);
    }
    if let Some(v) = cli.seed_width {
        cfg.set_seed_width(v);
    }

    if cli.export {
        cfg.set_export(Some(ExportMode::Bounds));
    }
    if cli.export_lines {
        cfg.set_export(Some(ExportMode::Centerlines));
    }
    if cli.silent {
        cfg.set_verbose(false);
    }

    if let Some(dir) = &cli.dtm_dir {
        cfg.set_dtm_dir(dir);
    }
    if let Some(dir) = &cli.xyz_dir {
        cfg.set_xyz_dir(dir);
    }
    for file in &cli.import {
        cfg.set_import_file(file);
    }
    for name in &cli.tile {
        cfg.add_tile_name(name);
    }

    if let Some(input) = &cli.input {
        if !cfg.set_input_name(input) {
            anyhow::bail!(
                "conflicting input names: {} and {}",
                cfg.input_name(),
                input
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.silent { Level::WARN } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("cannot install the log subscriber")?;

    let mut cfg = AmrelConfig::load(".").context("cannot read configuration")?;
    apply(&cli, &mut cfg)?;

    let mut tool = AmrelTool::new(cfg);
    tool.run().context("road extraction failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        let cli = Cli::parse_from(["amrel", "--seeds", "sector_a"]);
        let mut cfg = AmrelConfig::default();
        apply(&cli, &mut cfg).unwrap();
        assert_eq!(cfg.step(), Step::Seeds);
        assert_eq!(cfg.input_name(), "sector_a");
    }

    #[test]
    fn test_cloud_and_knob_flags() {
        let cli = Cli::parse_from([
            "amrel",
            "--mid",
            "--pad",
            "5",
            "--buf",
            "3",
            "--seedshift",
            "32",
            "--unconnected",
        ]);
        let mut cfg = AmrelConfig::default();
        apply(&cli, &mut cfg).unwrap();
        assert_eq!(cfg.cloud_access(), CloudAccess::Mid);
        assert_eq!(cfg.pad_size(), 5);
        assert_eq!(cfg.buffer_size(), 3);
        assert_eq!(cfg.seed_shift(), 32);
        assert!(!cfg.is_connected_on());
    }

    #[test]
    fn test_even_pad_rejected() {
        let cli = Cli::parse_from(["amrel", "--pad", "4"]);
        let mut cfg = AmrelConfig::default();
        assert!(apply(&cli, &mut cfg).is_err());
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Cli::try_parse_from(["amrel", "--frobnicate"]).is_err());
    }

    #[test]
    fn test_import_routing() {
        let cli = Cli::parse_from(["amrel", "--dtmdir", "asc", "-i", "zone.asc"]);
        let mut cfg = AmrelConfig::default();
        apply(&cli, &mut cfg).unwrap();
        assert!(cfg.is_dtm_import_on());
    }
}

//! svotool - build sparse voxel octree buffers from MagicaVoxel models

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glam::IVec3;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use svo::{FieldOptions, FlatSvo, InsertReport, Octree, SvoConfig, VoxelField, VoxelSample};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Samples inserted between progress bar updates
const PROGRESS_BATCH: usize = 4096;

/// svotool - Sparse voxel octree builder
#[derive(Parser)]
#[command(name = "svotool")]
#[command(about = "Build GPU-ready sparse voxel octree buffers from .vox models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a model, build the octree and write the flat buffers
    Build {
        /// MagicaVoxel model (.vox)
        model: PathBuf,

        /// Octree configuration (RON); defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// World offset of the model's minimum corner, as X,Y,Z
        #[arg(long, value_parser = parse_offset, default_value = "0,0,0")]
        offset: IVec3,

        /// Edge length of the voxel field
        #[arg(long, default_value_t = svo::field::DEFAULT_DIM)]
        dim: i32,

        /// Drop voxels fully enclosed by solid neighbours
        #[arg(long)]
        cull_interior: bool,

        /// Build root subtrees on all cores
        #[arg(long)]
        parallel: bool,

        /// Output file for the node buffer
        #[arg(long, default_value = "nodes.bin")]
        nodes: PathBuf,

        /// Output file for the voxel buffer
        #[arg(long, default_value = "voxels.bin")]
        voxels: PathBuf,

        /// Print the octree structure
        #[arg(long)]
        dump: bool,

        /// Look up every sample in the flat arrays after building
        #[arg(long)]
        verify: bool,
    },

    /// Print the default configuration as RON
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            model,
            config,
            offset,
            dim,
            cull_interior,
            parallel,
            nodes,
            voxels,
            dump,
            verify,
        } => {
            let options = BuildOptions {
                field: FieldOptions { dim, cull_interior },
                offset,
                parallel,
                dump,
                verify,
            };
            build_command(&model, config.as_deref(), &options, &nodes, &voxels)?;
        }
        Commands::Config => {
            println!("{}", SvoConfig::default().to_ron()?);
        }
    }

    Ok(())
}

struct BuildOptions {
    field: FieldOptions,
    offset: IVec3,
    parallel: bool,
    dump: bool,
    verify: bool,
}

fn parse_offset(value: &str) -> Result<IVec3, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<Vec<i32>, _>>()
        .map_err(|e| format!("invalid offset {value:?}: {e}"))?;
    match parts.as_slice() {
        [x, y, z] => Ok(IVec3::new(*x, *y, *z)),
        _ => Err(format!("offset {value:?} must be X,Y,Z")),
    }
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress.set_message(message);
    Ok(progress)
}

fn build_command(
    model_path: &Path,
    config_path: Option<&Path>,
    options: &BuildOptions,
    nodes_path: &Path,
    voxels_path: &Path,
) -> Result<()> {
    let config = match config_path {
        Some(path) => SvoConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SvoConfig::default(),
    };
    config.validate()?;

    let progress = spinner("Decoding model...")?;
    let model = svo::parse(model_path)
        .with_context(|| format!("decoding {}", model_path.display()))?;
    progress.finish_with_message(format!(
        "✓ Decoded {} chunks, size {}",
        model.chunks.len(),
        model.size
    ));

    let mut field = VoxelField::new(options.field);
    let placement = field.place_model(&model, options.offset);
    let samples = field.samples();
    info!(
        "Field holds {} voxels, {} samples after culling ({} clipped)",
        field.len(),
        samples.len(),
        placement.clipped
    );

    let tree = if options.parallel {
        let progress = spinner("Building octree in parallel...")?;
        let tree = Octree::build_parallel(config.clone(), samples.iter().copied())?;
        progress.finish_with_message("✓ Octree built");
        tree
    } else {
        build_with_progress(config.clone(), &samples)?
    };

    if options.dump {
        print!("{}", tree.dump());
    }

    let flat = tree.flatten();
    let stats = flat.stats(&config.layout);
    info!(
        "Flat arrays: {} nodes ({} leaves, {} bytes), {} voxels ({} bytes)",
        stats.nodes, stats.leaves, stats.node_bytes, stats.voxels, stats.voxel_bytes
    );

    if options.verify {
        verify(&tree, &flat, &samples)?;
    }

    write_buffer(nodes_path, &flat.encode_nodes(&config.layout))?;
    write_buffer(voxels_path, &flat.encode_voxels(&config.layout))?;
    Ok(())
}

fn build_with_progress(config: SvoConfig, samples: &[VoxelSample]) -> Result<Octree> {
    let progress = ProgressBar::new(samples.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.green/white} {pos}/{len} samples {msg}")?,
    );

    let mut tree = Octree::new(config)?;
    let mut total = InsertReport::default();
    for batch in samples.chunks(PROGRESS_BATCH) {
        let report = tree.insert_all(batch.iter().copied())?;
        total.inserted += report.inserted;
        total.skipped_empty += report.skipped_empty;
        total.out_of_bounds += report.out_of_bounds;
        progress.inc(batch.len() as u64);
    }
    progress.finish_with_message("✓");

    if total.out_of_bounds > 0 {
        warn!(
            "{} samples fell outside the octree root; check scale and offset",
            total.out_of_bounds
        );
    }
    info!(
        "Inserted {} samples into {} nodes",
        total.inserted,
        tree.node_count()
    );
    Ok(tree)
}

fn verify(tree: &Octree, flat: &FlatSvo, samples: &[VoxelSample]) -> Result<()> {
    let mut checked = 0;
    let mut failures = 0;
    for sample in samples.iter().filter(|s| tree.contains(s)) {
        checked += 1;
        match flat.find_voxel(sample.position) {
            Some(voxel) if voxel.color == sample.color => {}
            Some(voxel) => {
                failures += 1;
                warn!(
                    "Voxel at {} has color #{:08X}, expected #{:08X}",
                    sample.position, voxel.color, sample.color
                );
            }
            None => {
                failures += 1;
                warn!("Voxel at {} not found in flat arrays", sample.position);
            }
        }
    }

    if failures > 0 {
        bail!("verification failed for {failures} of {checked} samples");
    }
    info!("Verified {} samples", checked);
    Ok(())
}

fn write_buffer(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    println!("✓ Saved {} ({} bytes)", path.display(), data.len());
    Ok(())
}

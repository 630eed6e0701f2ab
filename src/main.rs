use eyre::{Result, WrapErr, eyre};
use indicatif::ParallelProgressIterator;
use memmap2::{Mmap, MmapOptions};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing::{debug, error, info};

use ffna::export::json;
use ffna::models::chunk::{ContainerKind, parse_signature, read_chunks};
use ffna::models::filenames;
use ffna::models::geometry::ChunkVariant;
use ffna::{DecodeOptions, compare_bindings, decode_model};

/// Inspect and decode FFNA model containers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log at debug level (RUST_LOG overrides this)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the chunks of a container
    Chunks { file: PathBuf },
    /// Decode containers to JSON
    Decode {
        /// Files, directories or glob patterns
        inputs: Vec<String>,

        /// Where to write `<name>.json`. Defaults to next to each input.
        #[clap(short, long)]
        out_dir: Option<PathBuf>,

        /// Geometry encoding to decode when a container has both
        #[clap(long, default_value = "normal")]
        prefer: ChunkVariant,

        /// Accept containers that are not typed as models
        #[clap(long)]
        allow_any_container: bool,
    },
    /// Check that two encodings of one model reconcile to the same bindings
    Compare { normal: PathBuf, other: PathBuf },
    /// Decode a texture filename id pair to its file hash
    Filename {
        #[clap(value_parser = parse_u16)]
        id0: u16,
        #[clap(value_parser = parse_u16)]
        id1: u16,
    },
}

fn parse_u16(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid id '{value}': {e}"))
}

fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    Ok(mmap)
}

fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_dir() {
            for entry in fs::read_dir(&path)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    paths.push(entry.path());
                }
            }
        } else if path.exists() {
            paths.push(path);
        } else {
            for entry in glob::glob(input).wrap_err("Invalid glob pattern")? {
                paths.push(entry?);
            }
        }
    }
    Ok(paths)
}

fn decode_path(path: &Path, options: &DecodeOptions) -> Result<ffna::ModelGeometry> {
    let mmap = map_file(path)?;
    decode_model(&mmap[..], options).map_err(|e| eyre!("{e}"))
}

fn decode_to_json(path: &Path, out_dir: Option<&Path>, options: &DecodeOptions) -> Result<PathBuf> {
    let model = decode_path(path, options)?;
    let json = json::to_json(&model).map_err(|e| eyre!("{e}"))?;

    let stem = path.file_stem().unwrap_or(path.as_os_str()).to_string_lossy();
    let file_name = format!("{stem}.json");
    let out_path = match out_dir {
        Some(dir) => dir.join(file_name),
        None => path.with_file_name(file_name),
    };
    fs::write(&out_path, json).wrap_err_with(|| format!("Failed to write {}", out_path.display()))?;

    debug!(
        input = %path.display(),
        output = %out_path.display(),
        submeshes = model.submeshes.len(),
        "decoded"
    );
    Ok(out_path)
}

fn list_chunks(path: &Path) -> Result<()> {
    let mmap = map_file(path)?;
    let kind = parse_signature(&mmap[..]).map_err(|e| eyre!("{e}"))?;
    let chunks = read_chunks(&mmap[..]).map_err(|e| eyre!("{e}"))?;

    let kind_name = match kind {
        ContainerKind::Model => "model".to_string(),
        ContainerKind::Map => "map".to_string(),
        ContainerKind::Other(byte) => format!("type {byte}"),
    };
    println!("{}: {kind_name}, {} chunks", path.display(), chunks.len());
    for chunk in chunks {
        let note = match ChunkVariant::from_tag(chunk.id) {
            Some(variant) => format!(" ({variant:?} geometry)"),
            None => String::new(),
        };
        println!(
            "  0x{:04X} at 0x{:08X}, 0x{:X} bytes{note}",
            chunk.id, chunk.offset, chunk.size
        );
    }
    Ok(())
}

fn decode_all(
    inputs: &[String],
    out_dir: Option<PathBuf>,
    options: DecodeOptions,
) -> Result<()> {
    let paths = expand_inputs(inputs)?;
    if let Some(dir) = &out_dir {
        fs::create_dir_all(dir).wrap_err("Failed to create output directory")?;
    }

    let failed = AtomicUsize::new(0);
    let total = paths.len();
    paths
        .into_par_iter()
        .progress_count(total as u64)
        .for_each(|path| {
            if let Err(e) = decode_to_json(&path, out_dir.as_deref(), &options) {
                error!(path = %path.display(), "{e:?}");
                failed.fetch_add(1, Ordering::Relaxed);
            }
        });

    let failed = failed.into_inner();
    info!(total, failed, "decode finished");
    if failed > 0 {
        return Err(eyre!("{failed} of {total} files failed to decode"));
    }
    Ok(())
}

fn compare(normal: &Path, other: &Path) -> Result<()> {
    let normal_model = decode_path(
        normal,
        &DecodeOptions::builder()
            .preferred_variant(ChunkVariant::Normal)
            .build(),
    )?;
    let other_model = decode_path(
        other,
        &DecodeOptions::builder()
            .preferred_variant(ChunkVariant::Other)
            .build(),
    )?;

    compare_bindings(&normal_model, &other_model).map_err(|e| eyre!("{e}"))?;
    println!(
        "{} submeshes reconcile to identical bindings",
        normal_model.submeshes.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Chunks { file } => list_chunks(&file),
        Command::Decode {
            inputs,
            out_dir,
            prefer,
            allow_any_container,
        } => {
            let options = DecodeOptions::builder()
                .preferred_variant(prefer)
                .require_model_container(!allow_any_container)
                .build();
            decode_all(&inputs, out_dir, options)
        }
        Command::Compare { normal, other } => compare(&normal, &other),
        Command::Filename { id0, id1 } => {
            println!("0x{:X}", filenames::decode(id0, id1));
            Ok(())
        }
    }
}

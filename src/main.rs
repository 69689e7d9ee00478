use eyre::{Result, WrapErr, bail};
use memmap2::Mmap;
use std::{
    fs::{self, File},
    io::Cursor,
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use tracing::{info, warn};

use ninjachunk::{
    data::{Endian, writer::ChunkWriter},
    export::{ExportOptions, export_model},
    import::{ImportOptions, reimport_model},
    models::{
        node::{ModelRead, ReadOptions, read_model, write_model},
        strip::UvPrecision,
    },
};

/// Inspect, export and rebuild Ninja chunk models stored in raw binary files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Source {
    /// File containing the model(s)
    file: PathBuf,

    /// Offset of a root node record. May be given more than once.
    #[clap(short, long = "offset", value_parser = parse_number::<usize>, required = true)]
    offsets: Vec<usize>,

    /// Value subtracted from stored pointers to get file offsets
    #[clap(short, long, value_parser = parse_number::<u32>, default_value = "0")]
    key: u32,

    /// Byte order of the file
    #[clap(short, long, value_enum, default_value_t = Endian::Little)]
    endian: Endian,
}

impl Source {
    fn read_options(&self) -> ReadOptions {
        ReadOptions::builder().endian(self.endian).key(self.key).build()
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the node hierarchy and chunk counts of each model
    Info {
        #[command(flatten)]
        source: Source,
    },
    /// Convert each model to a skinned mesh and write it as JSON
    Export {
        #[command(flatten)]
        source: Source,

        /// Directory the JSON files are written to
        #[clap(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Re-encode one model, optionally through the skinned mesh form
    Rebuild {
        #[command(flatten)]
        source: Source,

        /// Output file
        #[clap(long)]
        out: PathBuf,

        /// Byte order to write. Defaults to the input's.
        #[clap(long, value_enum)]
        target_endian: Option<Endian>,

        /// Pointer key to write with. Defaults to the input's.
        #[clap(long, value_parser = parse_number::<u32>)]
        target_key: Option<u32>,

        /// Export to a skinned mesh and import it again instead of copying chunks
        #[clap(long)]
        reimport: bool,

        /// Strip UV format used when reimporting
        #[clap(long, value_enum, default_value_t = UvPrecision::Normal)]
        uv_precision: UvPrecision,
    },
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
fn parse_number<T>(text: &str) -> Result<T, String>
where
    T: TryFrom<u64>,
{
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    }
    .map_err(|err| format!("invalid number {text:?}: {err}"))?;
    T::try_from(value).map_err(|_| format!("{text} is out of range"))
}

fn map_file(path: &PathBuf) -> Result<Mmap> {
    let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

fn read(data: &[u8], offset: usize, options: ReadOptions) -> Result<ModelRead> {
    let model = read_model(data, offset, options)
        .wrap_err_with(|| format!("Failed to read model at 0x{offset:X}"))?;
    for (node, err) in &model.failures {
        warn!(offset = format_args!("0x{offset:X}"), node = node.0, "{err}");
    }
    Ok(model)
}

fn print_info(source: &Source) -> Result<()> {
    let data = map_file(&source.file)?;
    for &offset in &source.offsets {
        let model = read(&data, offset, source.read_options())?;
        println!(
            "model at 0x{offset:X}: {} nodes, {} failed geometries",
            model.tree.len(),
            model.failures.len()
        );
        for visit in model.tree.depth_first() {
            let node = model.tree.node(visit.id);
            let depth = std::iter::successors(node.parent, |p| model.tree.node(*p).parent).count();
            let summary = match &node.geometry {
                Some(geometry) => format!(
                    "{} vertex chunks ({} vertices), {} polygon chunks{}",
                    geometry.vertex_chunks.len(),
                    geometry
                        .vertex_chunks
                        .iter()
                        .map(|c| c.vertices.len())
                        .sum::<usize>(),
                    geometry.poly_chunks.len(),
                    if geometry.is_supplementary() {
                        " (supplementary)"
                    } else {
                        ""
                    }
                ),
                None => "no geometry".to_string(),
            };
            println!("{:indent$}#{} {}", "", visit.index, summary, indent = depth * 2);
        }
    }
    Ok(())
}

fn export(source: &Source, out_dir: &PathBuf) -> Result<()> {
    let data = map_file(&source.file)?;
    fs::create_dir_all(out_dir).wrap_err("Failed to create output directory")?;

    let options = ExportOptions::builder().skip_failed_geometry(true).build();
    source.offsets.par_iter().try_for_each(|&offset| {
        let model = read(&data, offset, source.read_options())?;
        let mesh = export_model(&model.tree, &options)
            .wrap_err_with(|| format!("Failed to export model at 0x{offset:X}"))?;

        let path = out_dir.join(format!("model_{offset:08X}.json"));
        let json = serde_json::to_string_pretty(&mesh)?;
        fs::write(&path, json).wrap_err_with(|| format!("Failed to write {}", path.display()))?;
        info!(
            path = %path.display(),
            triangles = mesh.triangle_count(),
            materials = mesh.materials.len(),
            "exported"
        );

        Ok::<(), eyre::Error>(())
    })
}

struct RebuildArgs<'a> {
    source: &'a Source,
    out: &'a PathBuf,
    target_endian: Option<Endian>,
    target_key: Option<u32>,
    reimport: bool,
    uv_precision: UvPrecision,
}

fn rebuild(args: RebuildArgs<'_>) -> Result<()> {
    let source = args.source;
    let &[offset] = source.offsets.as_slice() else {
        bail!("rebuild takes exactly one --offset");
    };
    let data = map_file(&source.file)?;
    let mut tree = read(&data, offset, source.read_options())?.tree;

    if args.reimport {
        let options = ImportOptions::builder().uv_precision(args.uv_precision).build();
        let report = reimport_model(&mut tree, &options).wrap_err("Failed to reimport model")?;
        info!(?report, "reimported");
    }

    let endian = args.target_endian.unwrap_or(source.endian);
    let key = args.target_key.unwrap_or(source.key);
    let mut writer = ChunkWriter::new(Cursor::new(Vec::new()), endian);
    let root = write_model(&mut writer, &tree, key).wrap_err("Failed to encode model")?;
    fs::write(args.out, writer.into_inner().into_inner())
        .wrap_err_with(|| format!("Failed to write {}", args.out.display()))?;
    println!("root node record at 0x{root:X} ({endian} endian, key 0x{key:X})");

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Info { source } => print_info(source),
        Command::Export { source, out_dir } => export(source, out_dir),
        Command::Rebuild {
            source,
            out,
            target_endian,
            target_key,
            reimport,
            uv_precision,
        } => rebuild(RebuildArgs {
            source,
            out,
            target_endian: *target_endian,
            target_key: *target_key,
            reimport: *reimport,
            uv_precision: *uv_precision,
        }),
    }
}

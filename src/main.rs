use anyhow::{Context, Result, bail};
use blocktree::index::build::{self, BuildOptions};
use blocktree::index::{BlockTreeConfig, BlockTreeReader, DeltaPostingsCodec, stats};
use blocktree::output;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "blocktree")]
#[command(about = "Block-tree term dictionary builder and inspector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a segment from a term listing (field<TAB>term<TAB>doc[:freq],...)
    Build {
        /// Listing file
        listing: PathBuf,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Segment name
        #[arg(short, long, default_value = "_0")]
        segment: String,

        /// Minimum entries per block
        #[arg(long)]
        min_block: Option<usize>,

        /// Maximum entries per block
        #[arg(long)]
        max_block: Option<usize>,

        /// Block configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Show segment statistics
    Stats {
        /// Segment directory
        dir: PathBuf,

        #[arg(short, long, default_value = "_0")]
        segment: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Look up one term and print its documents
    Lookup {
        /// Segment directory
        dir: PathBuf,

        field: String,

        term: String,

        #[arg(short, long, default_value = "_0")]
        segment: String,
    },
    /// List the terms of a field
    Dump {
        /// Segment directory
        dir: PathBuf,

        field: String,

        /// Only terms starting with this prefix
        #[arg(short, long)]
        prefix: Option<String>,

        #[arg(short, long, default_value = "_0")]
        segment: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log)),
        )
        .with_writer(std::io::stderr)
        .init();

    let color = !cli.no_color;

    match cli.command {
        Commands::Build {
            listing,
            out,
            segment,
            min_block,
            max_block,
            config,
            quiet,
        } => {
            let config = load_config(config.as_deref(), min_block, max_block)?;
            let options = BuildOptions {
                segment,
                config,
                silent: quiet,
            };
            build::build_from_file(&listing, &out, &options)?;
        }
        Commands::Stats { dir, segment, json } => {
            stats::show_stats(&dir, &segment, json)?;
        }
        Commands::Lookup {
            dir,
            field,
            term,
            segment,
        } => {
            let reader = BlockTreeReader::open_segment(&dir, &segment)
                .with_context(|| format!("Failed to open segment {} in {}", segment, dir.display()))?;
            let field_reader = reader.field(&field)?;
            let found = field_reader.seek_exact(term.as_bytes(), &mut DeltaPostingsCodec::new())?;
            match found {
                Some(state) => {
                    let postings = build::load_postings(&dir, reader.segment())?;
                    let Some(&offset) = state.longs.first() else {
                        bail!("term has no postings offset");
                    };
                    let docs = build::read_postings(
                        &postings,
                        offset,
                        field_reader.info().index_options.has_freqs(),
                    )?;
                    output::print_lookup(&field, term.as_bytes(), Some((&state, docs.as_slice())), color)?;
                }
                None => {
                    output::print_lookup(&field, term.as_bytes(), None, color)?;
                    std::process::exit(1);
                }
            }
        }
        Commands::Dump {
            dir,
            field,
            prefix,
            segment,
        } => {
            let reader = BlockTreeReader::open_segment(&dir, &segment)
                .with_context(|| format!("Failed to open segment {} in {}", segment, dir.display()))?;
            let field_reader = reader.field(&field)?;
            let mut postings = DeltaPostingsCodec::new();
            let terms = match prefix {
                Some(prefix) => field_reader.prefix_terms(prefix.as_bytes(), &mut postings)?,
                None => field_reader.terms(&mut postings)?,
            };
            output::print_terms(&terms, color)?;
        }
    }

    Ok(())
}

/// Start from the config file (or defaults), then apply flag overrides
fn load_config(path: Option<&Path>, min_block: Option<usize>, max_block: Option<usize>) -> Result<BlockTreeConfig> {
    let mut config = match path {
        Some(path) => {
            let json =
                fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => BlockTreeConfig::default(),
    };
    if let Some(min) = min_block {
        config.min_items_in_block = min;
    }
    if let Some(max) = max_block {
        config.max_items_in_block = max;
    }
    config.validate().context("Invalid block configuration")?;
    Ok(config)
}

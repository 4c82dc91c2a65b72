//! ecvol - erasure-coded volume tool
//!
//! ```text
//!   <base>.dat ──encode──► <base>.ec01 .. <base>.ec14 + <base>.ecm
//!                               │
//!        read / verify / rebuild / decode
//! ```

use std::io::Write;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ecvol::config::EcConfig;
use ecvol::ec::{ReadMode, ShardSelection};
use ecvol::error::Result;
use ecvol::metrics::EcMetrics;
use ecvol::volume::Volume;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Erasure-coded volume files with ranged reads
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML or JSON config file
    #[arg(long, env = "ECVOL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Number of data shards (N)
    #[arg(long, env = "ECVOL_DATA_SHARDS", global = true)]
    data_shards: Option<usize>,

    /// Number of parity shards (M)
    #[arg(long, env = "ECVOL_PARITY_SHARDS", global = true)]
    parity_shards: Option<usize>,

    /// Large block size in bytes (L)
    #[arg(long, env = "ECVOL_LARGE_BLOCK_SIZE", global = true)]
    large_block_size: Option<u64>,

    /// Small block size in bytes (S)
    #[arg(long, env = "ECVOL_SMALL_BLOCK_SIZE", global = true)]
    small_block_size: Option<u64>,

    /// Bytes of each block processed per codec call
    #[arg(long, env = "ECVOL_BUFFER_SIZE", global = true)]
    buffer_size: Option<usize>,

    /// Worker threads for encode and verify
    #[arg(long, env = "ECVOL_WORKERS", global = true)]
    workers: Option<usize>,

    /// Pick reconstruction sources at random from this seed
    #[arg(long, env = "ECVOL_SEED", global = true)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct ShardArgs {
    /// Volume base path (without extension)
    base: PathBuf,

    /// Shards to treat as unavailable, e.g. `2,7`
    #[arg(long, value_delimiter = ',')]
    unavailable: Vec<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode <base>.dat into shard files and a manifest
    Encode {
        /// Volume base path (without extension)
        base: PathBuf,
    },

    /// Read a byte range of the source from the shards
    Read {
        #[command(flatten)]
        shards: ShardArgs,

        #[arg(long)]
        offset: u64,

        #[arg(long)]
        size: u64,

        /// Rebuild intervals whose shard is unavailable
        #[arg(long)]
        reconstruct: bool,

        /// Cross-check every interval against a reconstruction
        #[arg(long, conflicts_with = "reconstruct")]
        verify: bool,

        /// Write the bytes here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare every indexed record between source and shards
    Verify {
        #[command(flatten)]
        shards: ShardArgs,
    },

    /// Build <base>.ecx from an unsorted index log
    Index {
        /// Volume base path (without extension)
        base: PathBuf,

        /// Index log to sort
        #[arg(long)]
        log: PathBuf,
    },

    /// Regenerate missing (or listed) shard files
    Rebuild {
        #[command(flatten)]
        shards: ShardArgs,
    },

    /// Reassemble the source from the shards
    Decode {
        #[command(flatten)]
        shards: ShardArgs,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = load_config(&args)?;
    let metrics = EcMetrics::new()?;

    run(&args.command, &config, &metrics)?;

    if args.print_metrics {
        eprint!("{}", metrics.render()?);
    }
    Ok(())
}

fn run(command: &Command, config: &EcConfig, metrics: &EcMetrics) -> Result<()> {
    match command {
        Command::Encode { base } => {
            let manifest = Volume::new(base).encode(config, Some(metrics))?;
            info!(
                source_size = manifest.source_size,
                shard_size = manifest.shard_size,
                "Encoded {}",
                base.display()
            );
        }

        Command::Read {
            shards,
            offset,
            size,
            reconstruct,
            verify,
            output,
        } => {
            let reader = Volume::new(&shards.base)
                .open_reader(config.selection, &shards.unavailable)?
                .with_metrics(metrics.clone());

            let mode = if *verify {
                ReadMode::Verify
            } else if *reconstruct {
                ReadMode::AllowReconstruct
            } else {
                ReadMode::Primary
            };
            let bytes = reader.read_with_mode(*offset, *size, mode)?;

            match output {
                Some(path) => std::fs::write(path, &bytes)?,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
            }
        }

        Command::Verify { shards } => {
            let report =
                Volume::new(&shards.base).verify(config, &shards.unavailable, Some(metrics))?;
            info!(
                records = report.records,
                bytes = report.bytes,
                "Verified {}",
                shards.base.display()
            );
        }

        Command::Index { base, log } => {
            let index = Volume::new(base).build_index(log)?;
            info!(records = index.len(), "Indexed {}", base.display());
        }

        Command::Rebuild { shards } => {
            let summary =
                Volume::new(&shards.base).rebuild(config, &shards.unavailable, Some(metrics))?;
            info!(rebuilt = ?summary.shards, "Rebuilt {}", shards.base.display());
        }

        Command::Decode { shards, output } => {
            let bytes = Volume::new(&shards.base).decode(output, config, &shards.unavailable)?;
            info!(bytes, "Decoded into {}", output.display());
        }
    }
    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> Result<EcConfig> {
    let mut config = match &args.config {
        Some(path) => EcConfig::from_file(path)?,
        None => EcConfig::default(),
    };

    if let Some(v) = args.data_shards {
        config.data_shards = v;
    }
    if let Some(v) = args.parity_shards {
        config.parity_shards = v;
    }
    if let Some(v) = args.large_block_size {
        config.large_block_size = v;
    }
    if let Some(v) = args.small_block_size {
        config.small_block_size = v;
    }
    if let Some(v) = args.buffer_size {
        config.buffer_size = v;
    }
    if let Some(v) = args.workers {
        config.workers = v;
    }
    if let Some(seed) = args.seed {
        config.selection = ShardSelection::Seeded(seed);
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // stdout carries `read` output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

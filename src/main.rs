//! # txt2kb CLI
//!
//! Turns plain-text operational logs, incident notes and chat exports into
//! structured Markdown records for a knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! txt2kb --config ./config/txt2kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `txt2kb convert <SRC> <OUT>` | Convert every `.txt` under SRC into OUT |
//! | `txt2kb mask <FILE>` | Print the masked text of one file |
//! | `txt2kb classify <FILE>` | Print the tags and categories of one file |
//! | `txt2kb extract <FILE>` | Run the full pipeline on one file, print JSON |
//! | `txt2kb rules` | List the loaded masking and tagging rules |
//!
//! ## Examples
//!
//! ```bash
//! # Convert a directory with rule-based extraction
//! txt2kb convert ./raw ./kb
//!
//! # Use the LLM-assisted extractor, at most 3 tags, JSON output
//! txt2kb --llm --max-tags 3 convert ./raw ./kb --format json
//!
//! # Check what would be redacted
//! txt2kb mask ./raw/incident.txt
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use txt2kb::cancel::cancel_on_interrupt;
use txt2kb::config::{self, OutputFormat, Overrides};
use txt2kb::convert::{self, ConvertOptions};
use txt2kb::{inspect, logging, rules};

/// txt2kb: convert text logs into structured knowledge-base records.
///
/// Configuration is read from `--config`, or from `./config/txt2kb.toml`
/// when it exists; otherwise built-in defaults apply. The flags below
/// override the file.
#[derive(Parser)]
#[command(
    name = "txt2kb",
    about = "Convert text logs and chat exports into structured knowledge-base records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Force masking on.
    #[arg(long, global = true, conflicts_with = "no_mask")]
    mask: bool,

    /// Turn masking off.
    #[arg(long, global = true)]
    no_mask: bool,

    /// Use the LLM-assisted extractor (requires `[llm]` provider).
    #[arg(long, global = true)]
    llm: bool,

    /// Maximum number of tags per record.
    #[arg(long, global = true)]
    max_tags: Option<usize>,

    /// Maximum number of categories per record.
    #[arg(long, global = true)]
    max_categories: Option<usize>,

    /// Per-attempt LLM timeout in seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Number of documents processed at once.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every matching document under SRC into OUT.
    ///
    /// Output paths mirror the source tree. Prints a summary of found,
    /// converted, fallback, skipped and failed documents.
    Convert {
        /// Source directory.
        src: PathBuf,

        /// Output directory.
        out: PathBuf,

        /// Run the pipeline without writing any file.
        #[arg(long)]
        dry_run: bool,

        /// Output format (defaults to `run.output_format`).
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Maximum number of documents to process.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the masked text of a file; the replacement count goes to stderr.
    Mask {
        file: PathBuf,
    },

    /// Print the tags and categories assigned to a file.
    Classify {
        file: PathBuf,
    },

    /// Run the full pipeline on one file and print the record as JSON.
    Extract {
        file: PathBuf,
    },

    /// List the loaded masking and tagging rules.
    Rules,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut cfg = config::resolve_config(cli.config.as_deref())?;
    let mask = match (cli.mask, cli.no_mask) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    cfg.apply_overrides(&Overrides {
        mask,
        llm: cli.llm,
        max_tags: cli.max_tags,
        max_categories: cli.max_categories,
        timeout_secs: cli.timeout_secs,
        concurrency: cli.concurrency,
    })?;

    match cli.command {
        Commands::Convert {
            src,
            out,
            dry_run,
            format,
            limit,
        } => {
            let options = ConvertOptions {
                src,
                out,
                dry_run,
                format: format.unwrap_or(cfg.run.output_format),
                limit,
            };
            let report = convert::run_convert(&cfg, &options, cancel_on_interrupt()).await?;
            if report.cancelled > 0 {
                anyhow::bail!("conversion cancelled");
            }
        }
        Commands::Mask { file } => {
            inspect::run_mask(&cfg, &file)?;
        }
        Commands::Classify { file } => {
            inspect::run_classify(&cfg, &file)?;
        }
        Commands::Extract { file } => {
            inspect::run_extract(&cfg, &file, cancel_on_interrupt()).await?;
        }
        Commands::Rules => {
            rules::list_rules(&cfg)?;
        }
    }

    Ok(())
}

//! # qa-context CLI (`qactx`)
//!
//! ## Usage
//!
//! ```bash
//! qactx --config ./config/qactx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `qactx check` | Load corpus and index, verify they are aligned |
//! | `qactx search "<question>"` | Print the ranked records and the assembled context |
//! | `qactx ask "<question>"` | Retrieve context and generate an answer |
//! | `qactx repl` | Interactive ask loop (`exit` to quit) |
//! | `qactx index build` | Embed every corpus record into a safetensors index |
//! | `qactx serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use qa_context::{ask, check, config, index_cmd, search, server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// qa-context CLI: semantic retrieval and answer generation over a Q&A corpus.
#[derive(Parser)]
#[command(
    name = "qactx",
    about = "Semantic retrieval and context assembly over a question/answer corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/qactx.toml`. Relative corpus and index paths
    /// inside it resolve against the file's directory.
    #[arg(long, global = true, default_value = "./config/qactx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the corpus and index and verify they are aligned.
    ///
    /// Does not load an embedding model. Exits non-zero when the row
    /// counts differ or the index was built from another corpus.
    Check,

    /// Retrieve the closest records without generating an answer.
    Search {
        /// The question to search for.
        question: String,

        /// Number of records to retrieve.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve context and generate an answer.
    Ask {
        /// The question to answer.
        question: String,

        /// Number of records to put into the context.
        #[arg(long)]
        top_k: Option<usize>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Read questions from stdin and answer each one.
    Repl {
        /// Number of records to put into the context.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Manage the embedding index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed every corpus record and write a safetensors index.
    Build {
        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Check => {
            check::run_check(&cfg)?;
        }
        Commands::Search {
            question,
            top_k,
            json,
        } => {
            search::run_search(&cfg, &question, top_k, json).await?;
        }
        Commands::Ask {
            question,
            top_k,
            json,
        } => {
            ask::run_ask(&cfg, &question, top_k, json).await?;
        }
        Commands::Repl { top_k } => {
            ask::run_repl(&cfg, top_k).await?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build { batch_size } => {
                index_cmd::run_index_build(&cfg, batch_size).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

//! docsync CLI
//!
//! Offline tools for documents, path expressions and text patches.
//!
//! # Commands
//!
//! - `match` - Print every value an expression selects in a document
//! - `apply` - Apply mutations to a document
//! - `diff` - Produce a patch between two text files
//! - `patch` - Apply a patch to a text file
//! - `squash` - Coalesce mutations the way the commit buffer does

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docsync_cli::{commands, OutputFormat};
use tracing_subscriber::EnvFilter;

/// docsync document tools.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every value a path expression selects
    Match {
        /// Path expression, e.g. `items[_key=="a"].title`
        expression: String,

        /// JSON document
        document: PathBuf,
    },

    /// Apply mutations to a document
    Apply {
        /// JSON document
        document: PathBuf,

        /// JSON array of mutations, or a mutate request body
        mutations: PathBuf,
    },

    /// Produce a patch turning one text into another
    Diff {
        /// Original text
        from: PathBuf,

        /// Edited text
        to: PathBuf,
    },

    /// Apply a patch to a text
    Patch {
        /// Patch text
        patch: PathBuf,

        /// Text to patch
        text: PathBuf,
    },

    /// Coalesce mutations against a document
    Squash {
        /// JSON document the mutations start from
        document: PathBuf,

        /// JSON array of mutations, or a mutate request body
        mutations: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = cli.format;
    let output = match cli.command {
        Commands::Match {
            expression,
            document,
        } => commands::match_path::run(&expression, &document, format)?,
        Commands::Apply {
            document,
            mutations,
        } => commands::apply::run(&document, &mutations, format)?,
        Commands::Diff { from, to } => commands::diff::run(&from, &to, format)?,
        Commands::Patch { patch, text } => commands::patch::run(&patch, &text, format)?,
        Commands::Squash {
            document,
            mutations,
        } => commands::squash::run(&document, &mutations, format)?,
    };

    println!("{output}");
    Ok(())
}

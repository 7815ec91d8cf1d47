//! docsmith CLI — the main entry point.
//!
//! Commands:
//! - `serve`     — Start the HTTP gateway
//! - `generate`  — Document a source archive from the command line
//! - `scan`      — Show what ingestion extracts from an archive
//! - `headings`  — Extract section headings from a template document
//! - `init`      — Write the default configuration
//! - `doctor`    — Diagnose configuration and provider health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "docsmith",
    about = "docsmith — staged documentation generation for source archives",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate documentation for a zip archive
    Generate {
        /// Path to the project archive (.zip)
        archive: PathBuf,

        /// Project name (defaults to the archive file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Short project description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Project domain, e.g. "e-commerce"
        #[arg(long, default_value = "")]
        domain: String,

        /// Section heading; repeat for several
        #[arg(long = "heading")]
        headings: Vec<String>,

        /// File with one heading per line
        #[arg(long, conflicts_with = "headings")]
        headings_file: Option<PathBuf>,

        /// Write the full JSON payload here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show the context and analysis extracted from an archive
    Scan {
        /// Path to the project archive (.zip)
        archive: PathBuf,
    },

    /// Extract section headings from a template document
    Headings {
        /// Template file (.txt, .md, ...)
        file: PathBuf,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Diagnose configuration and provider health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Generate {
            archive,
            name,
            description,
            domain,
            headings,
            headings_file,
            out,
        } => {
            commands::generate::run(commands::generate::GenerateArgs {
                archive,
                name,
                description,
                domain,
                headings,
                headings_file,
                out,
            })
            .await?
        }
        Commands::Scan { archive } => commands::scan::run(&archive)?,
        Commands::Headings { file } => commands::headings::run(&file)?,
        Commands::Init { force } => commands::init::run(force)?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}

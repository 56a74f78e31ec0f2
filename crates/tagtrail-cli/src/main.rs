//! # tagtrail
//!
//! Owner-side tooling for tagtrail trackers: generate key material, build a
//! per-tracker firmware image and decrypt fetched location reports. Private
//! keys are only ever handled here, never by the server.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tagtrail")]
#[command(about = "Offline-finding tracker tooling", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new tracker key pair
    Keygen {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the public fields derived from a private key
    Inspect {
        /// Base64 private key
        #[arg(short, long)]
        private: String,
        #[arg(long)]
        json: bool,
    },
    /// Write the tracker's key and MAC into a firmware image
    Patch {
        /// Base64 private key
        #[arg(short, long)]
        private: String,
        /// Firmware image containing the placeholder regions
        #[arg(short, long)]
        input: PathBuf,
        /// Defaults to `<input-stem>-<MAC>.bin` next to the input
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// JSON file with hex `broadcast`, `broadcast_length` and `mac` templates
        #[arg(long)]
        templates: Option<PathBuf>,
    },
    /// Decrypt base64 report payloads
    Decrypt {
        /// Base64 private key
        #[arg(short, long)]
        private: String,
        /// Report payloads as fetched
        #[arg(required = true)]
        payloads: Vec<String>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Keygen { json } => commands::keygen(&mut out, json),
        Commands::Inspect { private, json } => commands::inspect(&mut out, &private, json),
        Commands::Patch {
            private,
            input,
            output,
            templates,
        } => commands::patch(&mut out, &private, &input, output, templates.as_deref()),
        Commands::Decrypt {
            private,
            payloads,
            json,
        } => commands::decrypt(&mut out, &private, &payloads, json),
    }
}

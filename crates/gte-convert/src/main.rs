//! gte-convert: Packs a safetensors BERT-style encoder into a `.gtemodel` file.
//!
//! The model directory must contain `config.json`, `vocab.txt` and
//! `model.safetensors`, as published on Hugging Face.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gte-convert")]
#[command(about = "Convert a safetensors encoder model to the .gtemodel format")]
struct Args {
    /// Directory holding config.json, vocab.txt and model.safetensors
    model_dir: PathBuf,

    /// Path of the .gtemodel file to write
    output: PathBuf,

    /// Re-read the written artifact and check its layout
    #[arg(long)]
    verify: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "info,gte_model=debug,gte_convert=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let report = gte_model::convert(&args.model_dir, &args.output).with_context(|| {
        format!(
            "Failed to convert {} (any partial {} is invalid)",
            args.model_dir.display(),
            args.output.display()
        )
    })?;

    info!(
        "Wrote {} tensors across {} layers",
        report.tensors_written, report.layers_written
    );
    info!(
        "File size: {:.2} MB ({} bytes)",
        report.size_mib(),
        report.bytes_written
    );

    if args.verify {
        let summary = gte_model::verify_artifact(&report.output)
            .with_context(|| format!("Failed to verify {}", report.output.display()))?;
        if summary.bytes != report.bytes_written || summary.vocab_entries != report.vocab_entries
        {
            bail!(
                "Verification mismatch: read {} bytes / {} tokens, wrote {} bytes / {} tokens",
                summary.bytes,
                summary.vocab_entries,
                report.bytes_written,
                report.vocab_entries
            );
        }
    }

    Ok(())
}

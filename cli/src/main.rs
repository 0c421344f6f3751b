use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use digest_core::{DigestConfig, DigestError};
use digest_fhir::{compress_bundle_value, digest_bundle_value};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "digest-cli",
    about = "Compress a FHIR JSON bundle into a one-line clinical digest."
)]
struct Args {
    /// Path to the JSON bundle.
    #[arg(short, long)]
    input: PathBuf,

    /// JSON file with digest settings; missing keys keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of readings kept per observation code.
    #[arg(long)]
    max_observations: Option<usize>,

    /// Print clauses, resource counts and skipped entries as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref(), args.max_observations)?;

    let data = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Could not read bundle file {:?}", args.input))?;
    let bundle: Value = serde_json::from_str(&data)
        .map_err(|err| DigestError::Parse(err.to_string()))
        .with_context(|| format!("Bundle file {:?} is not valid JSON", args.input))?;

    if !args.json {
        println!("{}", compress_bundle_value(&bundle, &config));
        return Ok(());
    }

    match digest_bundle_value(&bundle, &config) {
        Ok(digest) => {
            debug!(
                clauses = digest.clauses.len(),
                skipped = digest.skipped_entries,
                "bundle digested"
            );
            let report = serde_json::json!({
                "text": digest.text(),
                "clauses": digest.clauses,
                "resource_counts": digest.resource_counts,
                "skipped_entries": digest.skipped_entries,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Err(err) => println!("{err}"),
    }

    Ok(())
}

fn load_config(
    path: Option<&Path>,
    max_observations: Option<usize>,
) -> anyhow::Result<DigestConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read config file {path:?}"))?;
            serde_json::from_str::<DigestConfig>(&raw)
                .with_context(|| format!("Config file {path:?} is not valid"))?
        }
        None => DigestConfig::default(),
    };

    if let Some(max) = max_observations {
        config.max_observations_per_type = max;
    }
    config.validate()?;

    debug!(?config, "digest configuration loaded");
    Ok(config)
}

//! `in-verify`: verify a signed layout against the chain of links its
//! functionaries produced.

// CRITICAL: Enforce proper error handling - no unwrap/expect in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use in_verify_core::config::VerifyConfig;
use in_verify_core::crypto::Ed25519Verifier;
use in_verify_core::inspection::SubprocessRunner;
use in_verify_core::loader::FileLinkLoader;
use in_verify_core::model::{Layout, PublicKey};
use in_verify_core::orchestrator;

#[derive(Parser)]
#[command(name = "in-verify", about = "Supply-chain layout/link verifier", version)]
struct Cli {
    /// Path to a TOML config file overriding verification defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a layout file against the link directory and run inspections.
    Verify {
        /// Path to the signed layout JSON file.
        layout: PathBuf,
        /// Directory containing `{step}.{keyid}.link` files.
        #[arg(long, default_value = ".")]
        link_dir: PathBuf,
        /// Working directory inspections run in and record artifacts under.
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,
        /// Directory to persist inspection link output for audit.
        #[arg(long)]
        audit_dir: Option<PathBuf>,
        /// Owner public keys, `keyid=hex` pairs authorized to sign the layout.
        #[arg(long = "owner-key", value_parser = parse_owner_key)]
        owner_keys: Vec<(String, PublicKey)>,
    },
}

fn parse_owner_key(s: &str) -> Result<(String, PublicKey), String> {
    let (keyid, hex_key) = s
        .split_once('=')
        .ok_or_else(|| "expected 'keyid=hex' format".to_string())?;
    let key = hex::decode(hex_key).map_err(|e| e.to_string())?;
    Ok((
        keyid.to_string(),
        PublicKey {
            keyid: keyid.to_string(),
            key,
        },
    ))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = VerifyConfig::load(cli.config.as_deref()).context("loading verification config")?;

    match cli.command {
        Command::Verify {
            layout,
            link_dir,
            base_dir,
            audit_dir,
            owner_keys,
        } => run_verify(&layout, &link_dir, &base_dir, audit_dir.as_deref(), owner_keys, &config),
    }
}

fn run_verify(
    layout_path: &std::path::Path,
    link_dir: &std::path::Path,
    base_dir: &std::path::Path,
    audit_dir: Option<&std::path::Path>,
    owner_keys: Vec<(String, PublicKey)>,
    config: &VerifyConfig,
) -> Result<()> {
    let content = std::fs::read_to_string(layout_path)
        .with_context(|| format!("reading layout file '{}'", layout_path.display()))?;
    let layout: Layout =
        serde_json::from_str(&content).context("parsing layout JSON")?;

    let owner_keys: HashMap<String, PublicKey> = owner_keys.into_iter().collect();
    let loader = FileLinkLoader::new(link_dir);
    let verifier = Ed25519Verifier;
    let runner = SubprocessRunner::default();
    let audit_dir = audit_dir.unwrap_or(base_dir);

    let report = orchestrator::verify(
        &layout,
        &owner_keys,
        &loader,
        config,
        &verifier,
        &runner,
        base_dir,
        audit_dir,
        chrono::Utc::now(),
    )?;

    for warning in &report.command_alignment_warnings {
        tracing::warn!(
            step = warning.step,
            keyid = warning.keyid,
            "command alignment mismatch: expected {:?}, got {:?}",
            warning.expected,
            warning.actual
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report.summary).context("serializing summary link")?
    );
    Ok(())
}

//! Command-line access to persisted store state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use storelens::logging::init_tracing;
use storelens::store::{FileStorage, Intent, Store};
use storelens::{lens, StoreConfig, Tree};

#[derive(Parser)]
#[command(
    name = "storelens",
    version,
    about = "Read and patch persisted store state"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the persisted `<key>.json` blobs.
    #[arg(long, value_name = "DIR", global = true)]
    dir: Option<PathBuf>,

    /// Config file to use instead of the default location.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log more; repeat for debug and trace output.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Print the value at PATH.
    Get { key: String, path: String },

    /// Write JSON at PATH.
    Set {
        key: String,
        path: String,
        json: String,
    },

    /// Shallow-merge a JSON object into the root.
    Merge { key: String, json: String },

    /// Print the whole state.
    Dump { key: String },
}

impl Command {
    fn key(&self) -> &str {
        match self {
            Command::Get { key, .. }
            | Command::Set { key, .. }
            | Command::Merge { key, .. }
            | Command::Dump { key } => key,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose).context("Failed to open log file")?;

    let config = match &cli.config {
        Some(path) => StoreConfig::load_from(path)?,
        None => StoreConfig::load()?,
    };
    let dir = cli.dir.clone().unwrap_or_else(|| config.storage_dir());
    let key = cli.command.key().to_string();

    let store = Store::builder()
        .storage(Arc::new(FileStorage::new(&dir)))
        .restore(key.clone(), Tree::map())
        .build()
        .with_context(|| format!("Failed to load '{key}' from {}", dir.display()))?;

    match cli.command {
        Command::Get { path, .. } => {
            let state = store.get_state();
            let value = lens::get(&state, &path).cloned().unwrap_or_default();
            print_tree(&value)?;
        }
        Command::Set { path, json, .. } => {
            let value = parse_json(&json)?;
            store.dispatch(Intent::write("set", path, value));
            store.save_now()?;
        }
        Command::Merge { json, .. } => {
            let changes = parse_json(&json)?;
            if changes.as_map().is_none() {
                anyhow::bail!("merge expects a JSON object, got: {json}");
            }
            store.merge(changes);
            store.save_now()?;
        }
        Command::Dump { .. } => print_tree(&store.get_state())?,
    }

    Ok(())
}

fn parse_json(text: &str) -> Result<Tree> {
    serde_json::from_str(text).with_context(|| format!("Invalid JSON: {text}"))
}

fn print_tree(tree: &Tree) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(tree)?);
    Ok(())
}

//! Command-line interface wiring for labnorm.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::config::Settings;

pub mod merge;
pub mod normalize;
pub mod parse;
pub mod serve;
pub mod terms;

/// Top-level CLI definition.
#[derive(Debug, Parser)]
#[command(author, version, about = "Lab and pathology report normalizer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Parse CLI arguments from the environment.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Dispatch the selected sub-command.
    pub async fn dispatch(self, settings: Settings) -> Result<()> {
        match self.command {
            Commands::Normalize(args) => normalize::run(args, settings).await,
            Commands::Parse(args) => parse::run(args, settings).await,
            Commands::Merge(args) => merge::run(args, settings).await,
            Commands::Terms => terms::run(settings).await,
            Commands::Serve(args) => serve::run(args, settings).await,
        }
    }
}

/// Supported sub-commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Map raw indicator names onto canonical terms.
    Normalize(normalize::Args),
    /// Extract and normalize indicators from one report file.
    Parse(parse::Args),
    /// Parse several reports and merge them into per-indicator series.
    Merge(merge::Args),
    /// Print the active term dictionary.
    Terms,
    /// Serve the JSON API.
    Serve(serve::Args),
}

/// Pretty-print `value` to stdout, or to `output` when given.
pub(crate) async fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

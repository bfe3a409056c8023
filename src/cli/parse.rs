//! CLI entry-point for parsing a single report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::{
    cli::emit_json,
    config::{ExtractionStrategy, Settings},
    data::{self, report::ReportType},
    nlp::ReportParser,
};

/// Args for the `parse` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Plain-text report to parse.
    pub file: PathBuf,
    #[arg(long, value_enum, default_value = "lab")]
    pub report_type: ReportType,
    /// Overrides EXTRACTION_STRATEGY.
    #[arg(long, value_enum)]
    pub strategy: Option<ExtractionStrategy>,
    /// Write JSON here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, mut settings: Settings) -> Result<()> {
    if let Some(strategy) = args.strategy {
        settings.extraction_strategy = strategy;
    }
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("reading report {}", args.file.display()))?;
    let dictionary = data::load_dictionary(&settings)?;
    let parser = ReportParser::from_settings(&settings, dictionary)?;
    let report = parser.parse(&text, args.report_type).await;
    emit_json(&report, args.output.as_deref()).await
}

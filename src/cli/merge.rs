//! CLI entry-point for merging several reports.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args as ClapArgs;
use futures::{stream, StreamExt};
use tracing::{info, instrument};
use walkdir::WalkDir;

use crate::{
    cli::emit_json,
    config::Settings,
    data::{self, report::ReportType},
    nlp::ReportParser,
    series::{merge_reports, MergedReport},
};

/// Args for the `merge` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Report files, in the order they should be merged.
    #[arg(long, num_args = 1.., conflicts_with = "dir")]
    pub files: Vec<PathBuf>,
    /// Directory scanned recursively for `.txt` and `.md` reports.
    #[arg(long)]
    pub dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "lab")]
    pub report_type: ReportType,
    /// Reports parsed concurrently.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,
    /// Write merged JSON here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Also write a per-indicator CSV summary under OUTPUTS_DIR.
    #[arg(long)]
    pub csv: bool,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let paths = match &args.dir {
        Some(dir) => collect_reports(dir)?,
        None => args.files.clone(),
    };
    if paths.is_empty() {
        bail!("no report files given; use --files or --dir");
    }

    let dictionary = data::load_dictionary(&settings)?;
    let parser = ReportParser::from_settings(&settings, dictionary)?;
    let report_type = args.report_type;

    // `buffered` keeps input order, which decides history order.
    let reports = stream::iter(paths)
        .map(|path| {
            let parser = &parser;
            async move {
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading report {}", path.display()))?;
                Ok::<_, anyhow::Error>(parser.parse(&text, report_type).await)
            }
        })
        .buffered(args.concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    let merged = merge_reports(&reports);
    info!(
        reports = merged.report_count,
        indicators = merged.indicators.len(),
        "merged reports"
    );
    if args.csv {
        let path = settings.join_output("merged_indicators.csv");
        write_summary_csv(&merged, &path)?;
    }
    emit_json(&merged, args.output.as_deref()).await
}

/// Report files under `dir`, sorted by path.
fn collect_reports(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        let is_report = matches!(
            entry.path().extension().and_then(|s| s.to_str()),
            Some("txt" | "md")
        );
        if entry.file_type().is_file() && is_report {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

pub fn write_summary_csv(merged: &MergedReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record([
        "indicator",
        "latest_value",
        "unit",
        "is_abnormal",
        "occurrences",
        "trend",
    ])?;
    for series in &merged.indicators {
        let trend = series
            .trend
            .as_ref()
            .map(|t| t.direction.to_string())
            .unwrap_or_default();
        let occurrences = series.occurrence_count.to_string();
        writer.write_record([
            series.name.as_str(),
            series.latest.value.as_str(),
            series.latest.unit.as_str(),
            if series.latest.is_abnormal { "true" } else { "false" },
            occurrences.as_str(),
            trend.as_str(),
        ])?;
    }
    writer.flush()?;
    info!(rows = merged.indicators.len(), path = %path.display(), "wrote merge summary");
    Ok(())
}

//! CLI entry-point for listing the term dictionary.

use anyhow::Result;
use tracing::instrument;

use crate::{cli::emit_json, config::Settings, data};

#[instrument(skip(settings))]
pub async fn run(settings: Settings) -> Result<()> {
    let dictionary = data::load_dictionary(&settings)?.snapshot();
    let terms: Vec<_> = dictionary.terms().collect();
    emit_json(&terms, None).await
}

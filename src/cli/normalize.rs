//! CLI entry-point for terminology normalization.

use anyhow::{bail, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use crate::{
    cli::emit_json,
    config::Settings,
    data,
    nlp::{
        classifier::ClassifierProvider,
        llm::{ChatClient, ChatEndpoint},
        normalizer::Normalizer,
    },
};

/// Args for the `normalize` command.
#[derive(Debug, Clone, ClapArgs)]
pub struct Args {
    /// Raw indicator names to normalize.
    #[arg(required = true)]
    pub terms: Vec<String>,
    /// Escalation threshold; defaults to AI_NORMALIZATION_THRESHOLD.
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Skip the remote classifier and report lexical matches only.
    #[arg(long)]
    pub lexical_only: bool,
}

#[instrument(skip(settings))]
pub async fn run(args: Args, settings: Settings) -> Result<()> {
    let threshold = args.threshold.unwrap_or(settings.ai_normalization_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        bail!("threshold must lie in [0, 1], got {threshold}");
    }
    let dictionary = data::load_dictionary(&settings)?;
    let client = ChatClient::new(ChatEndpoint::from_settings(&settings))?;
    let normalizer =
        Normalizer::new(dictionary, ClassifierProvider::from_client(client), threshold);

    let results = if args.lexical_only {
        normalizer.normalize_lexical(&args.terms)
    } else {
        normalizer.normalize_batch(&args.terms, threshold).await?
    };
    emit_json(&results, None).await
}

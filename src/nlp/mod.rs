//! Natural language processing layer: extraction, matching, classification
//! and the report parsing pipeline that strings them together.

pub mod classifier;
pub mod extract;
pub mod lexical;
pub mod llm;
pub mod normalizer;

use anyhow::{Context, Result};
use tracing::{error, info, instrument};

use crate::{
    config::Settings,
    data::{
        dictionary::DictionaryHandle,
        report::{ParsedReport, ReportMetadata, ReportType},
    },
    nlp::{
        classifier::{ClassifierProvider, TermClassifier},
        extract::IndicatorExtractor,
        llm::{ChatClient, ChatEndpoint},
        normalizer::Normalizer,
    },
};

/// End-to-end report parser: text in, normalized indicators out.
#[derive(Debug, Clone)]
pub struct ReportParser<C = ClassifierProvider> {
    extractor: IndicatorExtractor,
    normalizer: Normalizer<C>,
}

impl ReportParser<ClassifierProvider> {
    /// Wire extractor and normalizer around one shared HTTP client.
    pub fn from_settings(settings: &Settings, dictionary: DictionaryHandle) -> Result<Self> {
        let client = ChatClient::new(ChatEndpoint::from_settings(settings))
            .context("building chat client")?;
        let extractor = IndicatorExtractor::new(settings.extraction_strategy, client.clone());
        let normalizer = Normalizer::new(
            dictionary,
            ClassifierProvider::from_client(client),
            settings.ai_normalization_threshold,
        );
        Ok(Self::new(extractor, normalizer))
    }
}

impl<C: TermClassifier> ReportParser<C> {
    pub fn new(extractor: IndicatorExtractor, normalizer: Normalizer<C>) -> Self {
        Self {
            extractor,
            normalizer,
        }
    }

    pub fn normalizer(&self) -> &Normalizer<C> {
        &self.normalizer
    }

    /// Parse one report. Normalization problems degrade to lexical results and
    /// never fail the report.
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    pub async fn parse(&self, text: &str, report_type: ReportType) -> ParsedReport {
        let extraction = self.extractor.extract(text, report_type).await;
        let metadata = ReportMetadata::from_text(text);

        let mut indicators = extraction.indicators;
        let names: Vec<String> = indicators.iter().map(|i| i.name.clone()).collect();
        let normalization_results = match self
            .normalizer
            .normalize_batch(&names, self.normalizer.threshold())
            .await
        {
            Ok(results) => results,
            Err(err) => {
                error!(error = %err, "normalization failed; falling back to lexical matches");
                self.normalizer.normalize_lexical(&names)
            }
        };
        for (indicator, result) in indicators.iter_mut().zip(&normalization_results) {
            indicator.normalized_name = Some(result.normalized.clone());
            indicator.normalization_confidence = Some(result.confidence);
        }

        let report_date = metadata
            .report_date
            .clone()
            .or(extraction.report_date)
            .unwrap_or_else(|| metadata.report_date_or_today());
        info!(
            %report_type,
            indicators = indicators.len(),
            abnormal = indicators.iter().filter(|i| i.is_abnormal).count(),
            %report_date,
            "parsed report"
        );

        ParsedReport {
            patient_id: metadata.patient_id.or(extraction.patient_id),
            report_date,
            hospital_name: metadata.hospital_name.unwrap_or_default(),
            report_type,
            indicators,
            normalization_results,
            original_text: text.to_string(),
        }
    }
}

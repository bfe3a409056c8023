//! Normalization cascade: lexical tiers first, one batched classifier call for
//! whatever stays below the threshold.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::{
    data::dictionary::DictionaryHandle,
    nlp::{
        classifier::{Classification, ClassifierProvider, TermClassifier},
        lexical::{LexicalMatch, LexicalMatcher, MatchTier},
    },
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("classifier returned {actual} results for {expected} terms")]
    ClassifierContract { expected: usize, actual: usize },
}

/// Stage that produced a normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "tier", rename_all = "snake_case")]
pub enum ResolvedBy {
    Lexical(MatchTier),
    Classifier,
}

/// Normalization outcome for one input term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub original: String,
    pub normalized: String,
    pub confidence: f64,
    pub resolved_by: ResolvedBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl NormalizationResult {
    fn from_lexical(term: &str, found: LexicalMatch) -> Self {
        Self {
            original: term.to_string(),
            normalized: found.normalized,
            confidence: found.confidence,
            resolved_by: ResolvedBy::Lexical(found.tier),
            category: None,
            explanation: None,
        }
    }

    fn from_classifier(term: &str, found: Classification) -> Self {
        Self {
            original: term.to_string(),
            normalized: found.normalized,
            confidence: found.confidence.clamp(0.0, 1.0),
            resolved_by: ResolvedBy::Classifier,
            category: Some(found.category),
            explanation: Some(found.explanation).filter(|e| !e.is_empty()),
        }
    }
}

/// Term normalizer bound to a dictionary handle and a classifier.
#[derive(Debug, Clone)]
pub struct Normalizer<C = ClassifierProvider> {
    dictionary: DictionaryHandle,
    matcher: LexicalMatcher,
    classifier: C,
    threshold: f64,
}

impl<C: TermClassifier> Normalizer<C> {
    pub fn new(dictionary: DictionaryHandle, classifier: C, threshold: f64) -> Self {
        Self {
            dictionary,
            matcher: LexicalMatcher,
            classifier,
            threshold,
        }
    }

    /// Configured default threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn dictionary(&self) -> &DictionaryHandle {
        &self.dictionary
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Lexical tiers only; never escalates.
    pub fn normalize_lexical(&self, terms: &[String]) -> Vec<NormalizationResult> {
        let dictionary = self.dictionary.snapshot();
        terms
            .iter()
            .map(|term| {
                NormalizationResult::from_lexical(term, self.matcher.match_term(&dictionary, term))
            })
            .collect()
    }

    pub async fn normalize(
        &self,
        term: &str,
        threshold: f64,
    ) -> Result<NormalizationResult, NormalizeError> {
        let mut results = self.normalize_batch(&[term.to_string()], threshold).await?;
        results.pop().ok_or(NormalizeError::ClassifierContract {
            expected: 1,
            actual: 0,
        })
    }

    /// Normalize `terms` in order, with at most one classifier call.
    pub async fn normalize_batch(
        &self,
        terms: &[String],
        threshold: f64,
    ) -> Result<Vec<NormalizationResult>, NormalizeError> {
        let dictionary = self.dictionary.snapshot();
        let mut results: Vec<NormalizationResult> = terms
            .iter()
            .map(|term| {
                NormalizationResult::from_lexical(term, self.matcher.match_term(&dictionary, term))
            })
            .collect();

        let unknown: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, result)| result.confidence < threshold)
            .map(|(idx, _)| idx)
            .collect();

        if !unknown.is_empty() {
            let unknown_terms: Vec<String> = unknown.iter().map(|&idx| terms[idx].clone()).collect();
            debug!(
                total = terms.len(),
                escalated = unknown_terms.len(),
                threshold,
                "escalating terms to classifier"
            );
            let classified = self
                .classifier
                .classify_batch(&unknown_terms, &dictionary)
                .await;
            if classified.len() != unknown_terms.len() {
                error!(
                    expected = unknown_terms.len(),
                    actual = classified.len(),
                    "classifier broke the one-result-per-term contract"
                );
                return Err(NormalizeError::ClassifierContract {
                    expected: unknown_terms.len(),
                    actual: classified.len(),
                });
            }
            for (idx, found) in unknown.into_iter().zip(classified) {
                results[idx] = NormalizationResult::from_classifier(&terms[idx], found);
            }
        }

        for result in results.iter_mut().filter(|r| r.confidence < threshold) {
            result.normalized = result.original.clone();
            result.explanation = Some(format!(
                "confidence below threshold ({threshold}), keeping original term"
            ));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;
    use crate::data::dictionary::TermDictionary;

    /// Classifier answering from a fixed table and counting calls.
    struct TableClassifier {
        answers: Vec<(&'static str, &'static str, f64)>,
        calls: Arc<AtomicUsize>,
    }

    impl TermClassifier for TableClassifier {
        async fn classify_batch(
            &self,
            terms: &[String],
            _dictionary: &TermDictionary,
        ) -> Vec<Classification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            terms
                .iter()
                .map(|term| {
                    let (normalized, confidence) = self
                        .answers
                        .iter()
                        .find(|(input, _, _)| *input == term.as_str())
                        .map(|(_, out, conf)| (out.to_string(), *conf))
                        .unwrap_or_else(|| (term.clone(), 0.3));
                    Classification {
                        normalized,
                        category: "血常规".into(),
                        confidence,
                        explanation: "table".into(),
                    }
                })
                .collect()
        }
    }

    struct ShortClassifier;

    impl TermClassifier for ShortClassifier {
        async fn classify_batch(
            &self,
            _terms: &[String],
            _dictionary: &TermDictionary,
        ) -> Vec<Classification> {
            Vec::new()
        }
    }

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn table_normalizer() -> (Normalizer<TableClassifier>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let classifier = TableClassifier {
            answers: vec![("血沉", "红细胞沉降率", 0.85), ("某指标", "C3", 0.2)],
            calls: calls.clone(),
        };
        let normalizer = Normalizer::new(
            DictionaryHandle::new(TermDictionary::standard()),
            classifier,
            0.6,
        );
        (normalizer, calls)
    }

    #[tokio::test]
    async fn unconfigured_classifier_scenario() {
        let normalizer = Normalizer::new(
            DictionaryHandle::new(TermDictionary::standard()),
            ClassifierProvider::unconfigured(),
            0.6,
        );
        let results = normalizer
            .normalize_batch(&terms(&["ANA", "白细胞", "完全未知术语"]), 0.6)
            .await
            .unwrap();
        assert_eq!(results[0].normalized, "抗核抗体");
        assert_eq!(results[0].confidence, 1.0);
        assert_eq!(results[1].normalized, "白细胞计数");
        assert_eq!(results[1].confidence, 1.0);
        assert_eq!(results[2].normalized, "完全未知术语");
        assert_eq!(results[2].confidence, 0.0);
        assert_eq!(results[2].resolved_by, ResolvedBy::Classifier);
    }

    #[tokio::test]
    async fn single_classifier_call_per_batch() {
        let (normalizer, calls) = table_normalizer();
        let results = normalizer
            .normalize_batch(&terms(&["血沉", "WBC", "某指标", "未知"]), 0.6)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results[0].normalized, "红细胞沉降率");
        assert_eq!(results[0].confidence, 0.85);
        assert_eq!(results[1].resolved_by, ResolvedBy::Lexical(MatchTier::Exact));
        // below threshold: original kept, classifier confidence kept
        assert_eq!(results[2].normalized, "某指标");
        assert_eq!(results[2].confidence, 0.2);
        assert!(results[2].explanation.as_deref().unwrap().contains("below threshold"));
    }

    #[tokio::test]
    async fn no_call_when_everything_resolves_lexically() {
        let (normalizer, calls) = table_normalizer();
        normalizer
            .normalize_batch(&terms(&["ANA", "补体C3"]), 0.6)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn contract_violation_is_surfaced() {
        let normalizer = Normalizer::new(
            DictionaryHandle::new(TermDictionary::standard()),
            ShortClassifier,
            0.6,
        );
        let err = normalizer
            .normalize_batch(&terms(&["未知一", "未知二"]), 0.6)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::ClassifierContract {
                expected: 2,
                actual: 0
            }
        );
    }

    #[tokio::test]
    async fn single_term_matches_batch_entry() {
        let (normalizer, _) = table_normalizer();
        let batch = normalizer
            .normalize_batch(&terms(&["血沉", "Hb"]), 0.6)
            .await
            .unwrap();
        let single = normalizer.normalize("Hb", 0.6).await.unwrap();
        assert_eq!(batch[1], single);
    }
}

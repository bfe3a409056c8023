//! Remote semantic classification of terms the lexical tiers could not place.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::AiProvider,
    data::dictionary::TermDictionary,
    nlp::llm::{strip_code_fence, ChatClient, LlmError},
};

pub const OTHER_CATEGORY: &str = "其他";

/// Confidence reported when the endpoint answered but the answer was unusable.
pub const MALFORMED_CONFIDENCE: f64 = 0.4;

/// Confidence reported when no answer was obtained at all.
pub const FAILED_CONFIDENCE: f64 = 0.0;

/// Classifier verdict for one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub normalized: String,
    pub category: String,
    pub confidence: f64,
    pub explanation: String,
}

impl Classification {
    fn declined(term: &str, confidence: f64, explanation: &str) -> Self {
        Self {
            normalized: term.to_string(),
            category: OTHER_CATEGORY.to_string(),
            confidence,
            explanation: explanation.to_string(),
        }
    }
}

/// Batch classification capability.
///
/// Implementations return exactly one result per input term, in input order,
/// and never fail: unavailability is expressed through low confidence.
pub trait TermClassifier: Send + Sync {
    fn classify_batch(
        &self,
        terms: &[String],
        dictionary: &TermDictionary,
    ) -> impl Future<Output = Vec<Classification>> + Send;
}

/// Configured classifier backend.
#[derive(Debug, Clone)]
pub enum ClassifierProvider {
    /// No provider or no credential; every term is declined.
    Unconfigured { provider: AiProvider },
    /// OpenAI-compatible chat endpoint (DashScope or Zhipu).
    Remote(ChatClient),
}

impl ClassifierProvider {
    pub fn from_client(client: ChatClient) -> Self {
        if client.is_configured() {
            info!(provider = %client.endpoint().provider, "remote classifier enabled");
            Self::Remote(client)
        } else {
            info!(provider = %client.endpoint().provider, "remote classifier not configured");
            Self::Unconfigured {
                provider: client.endpoint().provider,
            }
        }
    }

    pub fn unconfigured() -> Self {
        Self::Unconfigured {
            provider: AiProvider::None,
        }
    }
}

impl TermClassifier for ClassifierProvider {
    async fn classify_batch(
        &self,
        terms: &[String],
        dictionary: &TermDictionary,
    ) -> Vec<Classification> {
        if terms.is_empty() {
            return Vec::new();
        }
        match self {
            Self::Unconfigured { provider } => {
                let note = format!("no API key configured for {provider}");
                decline_all(terms, FAILED_CONFIDENCE, &note)
            }
            Self::Remote(client) => classify_remote(client, terms, dictionary).await,
        }
    }
}

async fn classify_remote(
    client: &ChatClient,
    terms: &[String],
    dictionary: &TermDictionary,
) -> Vec<Classification> {
    let prompt = build_batch_prompt(terms, dictionary);
    match client.complete(&prompt).await {
        Ok(content) => match parse_classifications(&content, terms) {
            Some(results) => {
                info!(terms = terms.len(), "remote classification succeeded");
                results
            }
            None => {
                warn!(terms = terms.len(), "remote classification result malformed");
                decline_all(terms, MALFORMED_CONFIDENCE, "classification result malformed")
            }
        },
        Err(LlmError::Malformed(reason)) => {
            warn!(%reason, "remote classification response malformed");
            decline_all(
                terms,
                MALFORMED_CONFIDENCE,
                &format!("classification result malformed: {reason}"),
            )
        }
        Err(err) => {
            warn!(error = %err, "remote classification failed");
            decline_all(terms, FAILED_CONFIDENCE, &format!("classification failed: {err}"))
        }
    }
}

fn decline_all(terms: &[String], confidence: f64, explanation: &str) -> Vec<Classification> {
    terms
        .iter()
        .map(|term| Classification::declined(term, confidence, explanation))
        .collect()
}

/// Prompt listing the standard terms and the numbered input terms.
pub fn build_batch_prompt(terms: &[String], dictionary: &TermDictionary) -> String {
    let mut prompt = String::from(
        "你是一个专业的医学术语分类助手。请将给定的医学术语分类到最接近的标准术语中。\n\n标准术语列表：\n",
    );
    for term in dictionary.terms() {
        match &term.category {
            Some(category) => prompt.push_str(&format!("- {} ({})\n", term.name, category)),
            None => prompt.push_str(&format!("- {}\n", term.name)),
        }
    }
    prompt.push_str("\n需要分类的术语：\n");
    for (idx, term) in terms.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", idx + 1, term));
    }
    prompt.push_str(
        "\n请按输入顺序为每个术语返回一条结果，只返回如下JSON：\n\
{\"results\": [{\"original\": \"原始术语\", \"normalized\": \"最匹配的标准术语\", \
\"category\": \"医学类别\", \"confidence\": 0到1之间的小数, \"explanation\": \"分类理由\"}]}\n\
如果术语与任何标准术语都不相关，normalized设为原术语，category设为\"其他\"，confidence设为0.3。",
    );
    prompt
}

#[derive(Deserialize)]
struct BatchPayload {
    results: Vec<RawClassification>,
}

#[derive(Deserialize)]
struct RawClassification {
    normalized: String,
    #[serde(default)]
    category: String,
    confidence: f64,
    #[serde(default)]
    explanation: String,
}

/// Parse a completion into one classification per term; `None` when the
/// shape does not match.
pub fn parse_classifications(content: &str, terms: &[String]) -> Option<Vec<Classification>> {
    let payload: BatchPayload = serde_json::from_str(strip_code_fence(content)).ok()?;
    if payload.results.len() != terms.len() {
        warn!(
            expected = terms.len(),
            actual = payload.results.len(),
            "classifier returned wrong number of results"
        );
        return None;
    }
    let results = payload
        .results
        .into_iter()
        .zip(terms)
        .map(|(raw, term)| {
            let normalized = raw.normalized.trim();
            Classification {
                normalized: if normalized.is_empty() {
                    term.clone()
                } else {
                    normalized.to_string()
                },
                category: if raw.category.trim().is_empty() {
                    OTHER_CATEGORY.to_string()
                } else {
                    raw.category
                },
                confidence: raw.confidence.clamp(0.0, 1.0),
                explanation: raw.explanation,
            }
        })
        .collect();
    Some(results)
}

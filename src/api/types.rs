//! Request and response bodies for the JSON API.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    data::{
        dictionary::CanonicalTerm,
        report::{ParsedReport, ReportType},
    },
    nlp::normalizer::NormalizationResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub terms: usize,
    pub classifier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeRequest {
    pub terms: Vec<String>,
    /// Overrides the configured threshold for this call.
    #[serde(default)]
    pub threshold: Option<f64>,
    /// Lexical tiers only when false.
    #[serde(default = "default_true")]
    pub use_ai: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeResponse {
    pub normalized_terms: Vec<NormalizationResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParseReportRequest {
    pub text: String,
    #[serde(default = "default_report_type")]
    pub report_type: ReportType,
}

fn default_report_type() -> ReportType {
    ReportType::Lab
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    pub reports: Vec<ParsedReport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendTermsRequest {
    pub terms: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsResponse {
    pub count: usize,
    pub terms: Vec<CanonicalTerm>,
}

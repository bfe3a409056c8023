//! Report-level data types and metadata pulled from raw report text.

use std::{fmt, str::FromStr};

use anyhow::bail;
use chrono::{Local, NaiveDate};
use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of report the text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    /// Laboratory panel (blood counts, antibodies, urine, immune function).
    Lab,
    /// Pathology report (biopsy findings and diagnosis).
    Pathology,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lab => "lab",
            Self::Pathology => "pathology",
        })
    }
}

impl FromStr for ReportType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lab" => Ok(Self::Lab),
            "pathology" => Ok(Self::Pathology),
            other => bail!("unsupported report type {other:?}"),
        }
    }
}

/// One named clinical measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub reference_range: String,
    #[serde(default)]
    pub is_abnormal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization_confidence: Option<f64>,
}

impl Indicator {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit: String::new(),
            reference_range: String::new(),
            is_abnormal: false,
            normalized_name: None,
            normalization_confidence: None,
        }
    }

    /// Key used to group measurements of the same indicator.
    pub fn canonical_name(&self) -> &str {
        self.normalized_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.name)
    }

    /// Numeric reading, when the value is a plain number.
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Outcome of parsing one report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReport {
    #[serde(default)]
    pub patient_id: Option<String>,
    pub report_date: String,
    #[serde(default)]
    pub hospital_name: String,
    pub report_type: ReportType,
    pub indicators: Vec<Indicator>,
    #[serde(default)]
    pub normalization_results: Vec<crate::nlp::normalizer::NormalizationResult>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_text: String,
}

/// Header fields found in raw report text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMetadata {
    pub report_date: Option<String>,
    pub patient_id: Option<String>,
    pub hospital_name: Option<String>,
}

static DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}[-/年]\d{1,2}[-/月]\d{1,2}日?)").expect("valid regex"));
static PATIENT_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:患者ID|就诊号|病历号|ID)[^:：\n]*[:：][ \t]*([\w-]+)").expect("valid regex")
});
static HOSPITAL_LABEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:医院名称|送检医院|就诊医院|医院)[ \t]*[:：][ \t]*([^\s:：,，]+)")
        .expect("valid regex")
});
static HOSPITAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\s:：,，]*(?:医院|医疗中心|诊所)").expect("valid regex"));

/// Hospital named after a label, else the first name-like token that is not
/// itself a field label.
fn hospital_name(text: &str) -> Option<String> {
    if let Some(caps) = HOSPITAL_LABEL_PATTERN.captures(text) {
        return Some(caps[1].to_string());
    }
    HOSPITAL_PATTERN
        .find_iter(text)
        .find(|m| {
            let rest = text[m.end()..].trim_start_matches([' ', '\t']);
            !rest.starts_with([':', '：'])
        })
        .map(|m| m.as_str().to_string())
}

impl ReportMetadata {
    pub fn from_text(text: &str) -> Self {
        Self {
            report_date: DATE_PATTERN
                .captures(text)
                .map(|caps| caps[1].to_string()),
            patient_id: PATIENT_ID_PATTERN
                .captures(text)
                .map(|caps| caps[1].to_string()),
            hospital_name: hospital_name(text),
        }
    }

    /// Report date, or today's date when the text carries none.
    pub fn report_date_or_today(&self) -> String {
        self.report_date
            .clone()
            .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string())
    }
}

/// Parse the date spellings seen on reports into a calendar date.
pub fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    static PARTS: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^\s*(\d{4})[-/年.](\d{1,2})[-/月.](\d{1,2})日?").expect("valid regex")
    });
    let caps = PARTS.captures(raw)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

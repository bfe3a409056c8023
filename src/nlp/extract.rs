//! Indicator extraction from raw report text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::ExtractionStrategy,
    data::report::{Indicator, ReportType},
    nlp::llm::{strip_code_fence, ChatClient},
};

/// Numeric reference interval with its display unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceRange {
    pub min: f64,
    pub max: f64,
    pub unit: &'static str,
}

impl ReferenceRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn display(&self) -> String {
        format!("{:?}-{:?} {}", self.min, self.max, self.unit)
    }
}

const REFERENCE_RANGES: &[(&str, ReferenceRange)] = &[
    ("白细胞计数", ReferenceRange { min: 4.0, max: 10.0, unit: "10^9/L" }),
    ("红细胞计数", ReferenceRange { min: 3.5, max: 5.5, unit: "10^12/L" }),
    ("血红蛋白", ReferenceRange { min: 110.0, max: 160.0, unit: "g/L" }),
    ("血小板计数", ReferenceRange { min: 100.0, max: 300.0, unit: "10^9/L" }),
    ("C3", ReferenceRange { min: 0.8, max: 1.6, unit: "g/L" }),
    ("C4", ReferenceRange { min: 0.1, max: 0.4, unit: "g/L" }),
    ("IgG", ReferenceRange { min: 7.0, max: 16.0, unit: "g/L" }),
    ("IgA", ReferenceRange { min: 0.7, max: 4.0, unit: "g/L" }),
    ("IgM", ReferenceRange { min: 0.4, max: 2.3, unit: "g/L" }),
];

/// Qualitative results that count as abnormal.
const POSITIVE_TOKENS: &[&str] = &[
    "阳性", "弱阳性", "+", "++", "+++", "++++", "1+", "2+", "3+", "4+", "positive",
];

const QUALITATIVE: &str = r"(\d\+|\d+:\d+|\d+(?:\.\d+)?|[+\-]+|弱阳性|阳性|阴性|positive|negative)";
const NUMERIC: &str = r"(\d+(?:\.\d+)?)";
const FREE_TEXT: &str = r"(.+)";

/// Qualitative titers at or above `1:80` count as abnormal.
const TITER_CUTOFF: u32 = 80;

/// Words allowed between a label and its colon, then an optional bracketed
/// method or abbreviation such as `(IFA)` or `（WBC）`.
const LABEL_SUFFIX: &str = r"(?:计数|数|测定|定量|浓度|检测|含量|滴度)?(?:[ \t]*[(（][^)）\n]*[)）])?";

/// (indicator name, label pattern, value pattern). A label only matches at the
/// start of a line or after a separator, so derived indices such as
/// 平均红细胞体积 or 平均血小板体积 never match a count.
const LAB_RULES: &[(&str, &str, &str)] = &[
    ("抗核抗体", r"(?:抗核抗体|ANA)", QUALITATIVE),
    ("抗双链DNA抗体", r"(?:抗双链DNA抗体|抗dsDNA抗体)", QUALITATIVE),
    ("Sm抗体", r"(?:抗)?Sm抗体", QUALITATIVE),
    ("RNP抗体", r"(?:抗)?RNP抗体", QUALITATIVE),
    ("SSA抗体", r"(?:抗)?SSA抗体", QUALITATIVE),
    ("SSB抗体", r"(?:抗)?SSB抗体", QUALITATIVE),
    ("白细胞计数", r"(?:白细胞|WBC)", NUMERIC),
    ("红细胞计数", r"(?:红细胞|RBC)", NUMERIC),
    ("血红蛋白", r"(?:血红蛋白|HGB|Hb)", NUMERIC),
    ("血小板计数", r"(?:血小板|PLT)", NUMERIC),
    ("尿蛋白", r"尿蛋白", QUALITATIVE),
    ("尿红细胞", r"尿红细胞", QUALITATIVE),
    ("尿白细胞", r"尿白细胞", QUALITATIVE),
    ("C3", r"(?:补体)?C3", NUMERIC),
    ("C4", r"(?:补体)?C4", NUMERIC),
    ("IgG", r"(?:IgG|免疫球蛋白G)", NUMERIC),
    ("IgA", r"(?:IgA|免疫球蛋白A)", NUMERIC),
    ("IgM", r"(?:IgM|免疫球蛋白M)", NUMERIC),
];

const PATHOLOGY_RULES: &[(&str, &str, &str)] = &[
    ("活组织检查", r"活组织检查", FREE_TEXT),
    ("病理发现", r"病理发现", FREE_TEXT),
    ("病理诊断", r"病理诊断", FREE_TEXT),
    ("备注", r"备注", FREE_TEXT),
];

struct Rule {
    name: &'static str,
    pattern: Regex,
}

fn compile(rules: &[(&'static str, &str, &str)]) -> Vec<Rule> {
    rules
        .iter()
        .map(|&(name, label, value)| Rule {
            name,
            pattern: Regex::new(&format!(
                r"(?im)(?:^|[\s,，;；|])[ \t]*{label}{LABEL_SUFFIX}[ \t]*[:：][ \t]*{value}"
            ))
            .expect("valid extraction rule"),
        })
        .collect()
}

static LAB: Lazy<Vec<Rule>> = Lazy::new(|| compile(LAB_RULES));
static PATHOLOGY: Lazy<Vec<Rule>> = Lazy::new(|| compile(PATHOLOGY_RULES));

pub fn reference_range(name: &str) -> Option<&'static ReferenceRange> {
    REFERENCE_RANGES
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, range)| range)
}

/// Denominator of a `1:N` titer.
pub fn titer_denominator(value: &str) -> Option<u32> {
    let (numerator, denominator) = value.trim().split_once(':')?;
    if numerator.trim() != "1" {
        return None;
    }
    denominator.trim().parse().ok()
}

pub fn is_positive_token(value: &str) -> bool {
    let value = value.trim();
    POSITIVE_TOKENS
        .iter()
        .any(|token| token.eq_ignore_ascii_case(value))
}

/// Apply the fixed rule table for `report_type`.
pub fn extract_with_rules(text: &str, report_type: ReportType) -> Vec<Indicator> {
    let rules = match report_type {
        ReportType::Lab => &*LAB,
        ReportType::Pathology => &*PATHOLOGY,
    };
    let mut indicators = Vec::new();
    for rule in rules {
        let Some(caps) = rule.pattern.captures(text) else {
            continue;
        };
        let value = caps[1].trim().to_string();
        if value.is_empty() {
            continue;
        }
        let mut indicator = Indicator::new(rule.name, value);
        if report_type == ReportType::Lab {
            flag_lab_value(&mut indicator);
        }
        indicators.push(indicator);
    }
    debug!(%report_type, count = indicators.len(), "rule extraction finished");
    indicators
}

fn flag_lab_value(indicator: &mut Indicator) {
    if let Some(range) = reference_range(&indicator.name) {
        indicator.unit = range.unit.to_string();
        indicator.reference_range = range.display();
        if let Some(value) = indicator.numeric_value() {
            indicator.is_abnormal = !range.contains(value);
            return;
        }
    }
    if let Some(denominator) = titer_denominator(&indicator.value) {
        if indicator.reference_range.is_empty() {
            indicator.reference_range = format!("<1:{TITER_CUTOFF}");
        }
        indicator.is_abnormal = denominator >= TITER_CUTOFF;
        return;
    }
    indicator.is_abnormal = is_positive_token(&indicator.value);
}

/// Complete delegated-extraction records into full indicators.
///
/// Records without an object shape are skipped; every kept record gets all
/// fields, with empty strings and `false` standing in for missing ones.
pub fn complete_indicators(records: Vec<Value>) -> Vec<Indicator> {
    records
        .into_iter()
        .filter_map(|record| match record {
            Value::Object(map) => Some(Indicator {
                name: text_field(map.get("name")),
                value: text_field(map.get("value")),
                unit: text_field(map.get("unit")),
                reference_range: text_field(map.get("reference_range")),
                is_abnormal: map
                    .get("is_abnormal")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                normalized_name: None,
                normalization_confidence: None,
            }),
            _ => None,
        })
        .collect()
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Structured payload returned by delegated extraction.
#[derive(Debug, Default, Deserialize)]
pub struct StructuredReport {
    #[serde(default)]
    pub indicators: Vec<Value>,
    #[serde(default)]
    pub patient_info: Option<Value>,
    #[serde(default)]
    pub report_info: Option<Value>,
}

impl StructuredReport {
    pub fn report_date(&self) -> Option<String> {
        self.report_info
            .as_ref()
            .and_then(|info| info.get("report_date"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    }

    pub fn patient_id(&self) -> Option<String> {
        self.patient_info
            .as_ref()
            .and_then(|info| info.get("patient_id"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    }
}

/// Indicators plus any header fields the extraction backend supplied.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub indicators: Vec<Indicator>,
    pub report_date: Option<String>,
    pub patient_id: Option<String>,
}

/// Strategy-selected extractor.
#[derive(Debug, Clone)]
pub struct IndicatorExtractor {
    strategy: ExtractionStrategy,
    client: ChatClient,
}

impl IndicatorExtractor {
    pub fn new(strategy: ExtractionStrategy, client: ChatClient) -> Self {
        Self { strategy, client }
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        self.strategy
    }

    pub async fn extract(&self, text: &str, report_type: ReportType) -> Extraction {
        match self.strategy {
            ExtractionStrategy::Rules => Extraction {
                indicators: extract_with_rules(text, report_type),
                ..Extraction::default()
            },
            ExtractionStrategy::Delegated => self.extract_delegated(text, report_type).await,
        }
    }

    async fn extract_delegated(&self, text: &str, report_type: ReportType) -> Extraction {
        if !self.client.is_configured() {
            warn!("delegated extraction selected but no provider configured");
            return Extraction::default();
        }
        let prompt = build_extraction_prompt(text, report_type);
        let content = match self.client.complete(&prompt).await {
            Ok(content) => content,
            Err(err) => {
                warn!(error = %err, "delegated extraction failed");
                return Extraction::default();
            }
        };
        let structured: StructuredReport = match serde_json::from_str(strip_code_fence(&content)) {
            Ok(structured) => structured,
            Err(err) => {
                warn!(error = %err, "delegated extraction returned unparseable JSON");
                return Extraction::default();
            }
        };
        let report_date = structured.report_date();
        let patient_id = structured.patient_id();
        let indicators = complete_indicators(structured.indicators);
        info!(%report_type, count = indicators.len(), "delegated extraction finished");
        Extraction {
            indicators,
            report_date,
            patient_id,
        }
    }
}

fn build_extraction_prompt(text: &str, report_type: ReportType) -> String {
    format!(
        "你是一个专业的医学检查单解析助手。请从以下检查单文本中提取所有检查指标及其对应值。\n\n\
检查单类型：{report_type}\n\n检查单文本：\n{text}\n\n\
只返回JSON，格式如下：\n\
{{\"indicators\": [{{\"name\": \"指标名称\", \"value\": \"指标值\", \"unit\": \"单位\", \
\"reference_range\": \"参考范围\", \"is_abnormal\": false}}], \
\"patient_info\": {{\"patient_id\": \"患者ID\"}}, \"report_info\": {{\"report_date\": \"检查日期\"}}}}\n\
化验报告请提取全部检查项目；病理报告请提取病理发现、病理诊断、标本类型。无法确定的字段请留空。"
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn low_white_cell_count_is_abnormal() {
        let indicators = extract_with_rules("白细胞计数: 3.8\n", ReportType::Lab);
        let wbc = indicators.iter().find(|i| i.name == "白细胞计数").unwrap();
        assert_eq!(wbc.value, "3.8");
        assert_eq!(wbc.unit, "10^9/L");
        assert_eq!(wbc.reference_range, "4.0-10.0 10^9/L");
        assert!(wbc.is_abnormal);
    }

    #[test]
    fn in_range_value_is_normal() {
        let indicators = extract_with_rules("补体C3：1.1 g/L", ReportType::Lab);
        let c3 = indicators.iter().find(|i| i.name == "C3").unwrap();
        assert_eq!(c3.value, "1.1");
        assert!(!c3.is_abnormal);
    }

    #[test]
    fn qualitative_positive_is_abnormal() {
        let text = "抗核抗体(IFA)：阳性\n尿蛋白: 2+\n尿白细胞：阴性";
        let indicators = extract_with_rules(text, ReportType::Lab);
        let ana = indicators.iter().find(|i| i.name == "抗核抗体").unwrap();
        assert_eq!(ana.value, "阳性");
        assert!(ana.is_abnormal);
        let pro = indicators.iter().find(|i| i.name == "尿蛋白").unwrap();
        assert_eq!(pro.value, "2+");
        assert!(pro.is_abnormal);
        let leu = indicators.iter().find(|i| i.name == "尿白细胞").unwrap();
        assert!(!leu.is_abnormal);
    }

    #[test]
    fn derived_indices_are_not_counts() {
        let text = "\
血红蛋白: 
平均红细胞体积(MCV): 92.1
平均红细胞血红蛋白含量(MCH): 30
红细胞分布宽度: 13.2
平均血小板体积(MPV): 10.4
";
        let indicators = extract_with_rules(text, ReportType::Lab);
        assert!(indicators.is_empty(), "{indicators:?}");
    }

    #[test]
    fn counts_with_bracketed_abbreviations() {
        let text = "红细胞计数(RBC): 4.6\n平均血小板体积: 10.4\n血小板计数（PLT）：85";
        let indicators = extract_with_rules(text, ReportType::Lab);
        let rbc = indicators.iter().find(|i| i.name == "红细胞计数").unwrap();
        assert_eq!(rbc.value, "4.6");
        assert!(!rbc.is_abnormal);
        let plt = indicators.iter().find(|i| i.name == "血小板计数").unwrap();
        assert_eq!(plt.value, "85");
        assert!(plt.is_abnormal);
    }

    #[test]
    fn titers_flag_from_one_in_eighty() {
        let high = extract_with_rules("ANA滴度: 1:320", ReportType::Lab);
        assert_eq!(high[0].value, "1:320");
        assert_eq!(high[0].reference_range, "<1:80");
        assert!(high[0].is_abnormal);

        let low = extract_with_rules("抗核抗体：1:40", ReportType::Lab);
        assert!(!low[0].is_abnormal);
        assert_eq!(titer_denominator("1:80"), Some(80));
        assert_eq!(titer_denominator("2+"), None);
    }

    #[test]
    fn urine_cells_do_not_shadow_blood_counts() {
        let text = "尿白细胞：12\n白细胞计数：5.1";
        let indicators = extract_with_rules(text, ReportType::Lab);
        let wbc = indicators.iter().find(|i| i.name == "白细胞计数").unwrap();
        assert_eq!(wbc.value, "5.1");
    }

    #[test]
    fn pathology_rules_capture_line() {
        let text = "病理诊断：狼疮性肾炎 IV型\n备注：建议复查";
        let indicators = extract_with_rules(text, ReportType::Pathology);
        assert_eq!(indicators.len(), 2);
        assert_eq!(indicators[0].name, "病理诊断");
        assert_eq!(indicators[0].value, "狼疮性肾炎 IV型");
        assert!(!indicators[0].is_abnormal);
    }

    #[test]
    fn empty_text_yields_no_indicators() {
        assert!(extract_with_rules("", ReportType::Lab).is_empty());
    }

    #[test]
    fn completes_partial_records() {
        let records = vec![
            json!({"name": "白细胞计数", "value": 3.8}),
            json!({"name": "C3", "value": "0.7", "unit": "g/L", "is_abnormal": true}),
            json!("not an object"),
        ];
        let indicators = complete_indicators(records);
        assert_eq!(indicators.len(), 2);
        assert_eq!(indicators[0].value, "3.8");
        assert_eq!(indicators[0].unit, "");
        assert_eq!(indicators[0].reference_range, "");
        assert!(!indicators[0].is_abnormal);
        assert!(indicators[1].is_abnormal);
    }

    #[test]
    fn structured_report_reads_header_fields() {
        let structured: StructuredReport = serde_json::from_value(json!({
            "indicators": [],
            "patient_info": {"patient_id": "P-7"},
            "report_info": {"report_date": "2026-01-15"}
        }))
        .unwrap();
        assert_eq!(structured.patient_id().as_deref(), Some("P-7"));
        assert_eq!(structured.report_date().as_deref(), Some("2026-01-15"));
    }
}

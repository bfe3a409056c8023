//! Merge indicator lists from several reports into per-indicator series.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    data::report::{parse_report_date, Indicator, ParsedReport},
    series::trend::{self, TrendSummary},
};

/// All measurements of one canonical indicator across reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedIndicatorSeries {
    pub name: String,
    pub latest: Indicator,
    /// Measurements in input order.
    pub history: Vec<Indicator>,
    pub occurrence_count: usize,
    /// Report date of each history entry.
    pub report_dates: Vec<String>,
    pub hospitals: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<TrendSummary>,
    #[serde(skip)]
    latest_date: String,
}

impl MergedIndicatorSeries {
    fn open(indicator: &Indicator, report: &ParsedReport) -> Self {
        let mut hospitals = BTreeSet::new();
        if !report.hospital_name.is_empty() {
            hospitals.insert(report.hospital_name.clone());
        }
        Self {
            name: indicator.canonical_name().to_string(),
            latest: indicator.clone(),
            history: vec![indicator.clone()],
            occurrence_count: 1,
            report_dates: vec![report.report_date.clone()],
            hospitals,
            trend: None,
            latest_date: report.report_date.clone(),
        }
    }

    fn record(&mut self, indicator: &Indicator, report: &ParsedReport) {
        self.history.push(indicator.clone());
        self.occurrence_count += 1;
        self.report_dates.push(report.report_date.clone());
        if !report.hospital_name.is_empty() {
            self.hospitals.insert(report.hospital_name.clone());
        }
        if is_newer(&report.report_date, &self.latest_date) {
            self.latest = indicator.clone();
            self.latest_date = report.report_date.clone();
        }
    }

    /// Date of the report `latest` came from.
    pub fn latest_date(&self) -> &str {
        &self.latest_date
    }

    fn compute_trend(&mut self) {
        let points: Vec<_> = self
            .history
            .iter()
            .zip(&self.report_dates)
            .filter_map(|(indicator, date)| {
                Some((parse_report_date(date)?, indicator.numeric_value()?))
            })
            .collect();
        self.trend = trend::summarize(&points);
    }
}

/// True when `candidate` is a strictly later calendar date than `current`.
/// Unparseable dates never displace the current latest.
fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_report_date(candidate), parse_report_date(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        _ => false,
    }
}

/// Merge reports into one series per canonical indicator, ordered by first
/// appearance.
pub fn merge(reports: &[ParsedReport]) -> Vec<MergedIndicatorSeries> {
    let mut series: IndexMap<String, MergedIndicatorSeries> = IndexMap::new();
    for report in reports {
        for indicator in &report.indicators {
            let key = indicator.canonical_name();
            match series.get_mut(key) {
                Some(existing) => existing.record(indicator, report),
                None => {
                    series.insert(key.to_string(), MergedIndicatorSeries::open(indicator, report));
                }
            }
        }
    }
    let mut merged: Vec<_> = series.into_values().collect();
    for entry in &mut merged {
        entry.compute_trend();
    }
    debug!(reports = reports.len(), series = merged.len(), "merged reports");
    merged
}

/// Merge plus report-level summary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedReport {
    pub report_count: usize,
    pub report_date: Option<String>,
    pub hospital_name: String,
    pub indicators: Vec<MergedIndicatorSeries>,
}

pub fn merge_reports(reports: &[ParsedReport]) -> MergedReport {
    let report_date = reports
        .iter()
        .filter_map(|r| parse_report_date(&r.report_date).map(|d| (d, &r.report_date)))
        .max_by_key(|(date, _)| *date)
        .map(|(_, raw)| raw.clone())
        .or_else(|| reports.first().map(|r| r.report_date.clone()));
    let hospitals: BTreeSet<&str> = reports
        .iter()
        .map(|r| r.hospital_name.as_str())
        .filter(|name| !name.is_empty())
        .collect();

    MergedReport {
        report_count: reports.len(),
        report_date,
        hospital_name: hospitals.into_iter().collect::<Vec<_>>().join(", "),
        indicators: merge(reports),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::report::ReportType;

    fn report(date: &str, hospital: &str, values: &[(&str, &str)]) -> ParsedReport {
        ParsedReport {
            patient_id: None,
            report_date: date.to_string(),
            hospital_name: hospital.to_string(),
            report_type: ReportType::Lab,
            indicators: values
                .iter()
                .map(|(name, value)| {
                    let mut indicator = Indicator::new(*name, *value);
                    indicator.normalized_name = Some((*name).to_string());
                    indicator
                })
                .collect(),
            normalization_results: Vec::new(),
            original_text: String::new(),
        }
    }

    #[test]
    fn newest_first_keeps_first_as_latest() {
        let reports = vec![
            report("2026-01-15", "甲医院", &[("白细胞计数", "3.8")]),
            report("2025-12-10", "乙医院", &[("白细胞计数", "4.2")]),
        ];
        let merged = merge(&reports);
        assert_eq!(merged.len(), 1);
        let wbc = &merged[0];
        assert_eq!(wbc.latest.value, "3.8");
        assert_eq!(wbc.occurrence_count, 2);
        let values: Vec<_> = wbc.history.iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["3.8", "4.2"]);
        assert_eq!(wbc.hospitals.len(), 2);
    }

    #[test]
    fn oldest_first_still_picks_newest() {
        let reports = vec![
            report("2025/12/10", "", &[("C3", "0.8")]),
            report("2026年1月15日", "", &[("C3", "0.7")]),
        ];
        let merged = merge(&reports);
        assert_eq!(merged[0].latest.value, "0.7");
        assert_eq!(merged[0].latest_date(), "2026年1月15日");
        assert_eq!(
            merged[0].trend.as_ref().map(|t| t.direction),
            Some(trend::TrendDirection::Falling)
        );
    }

    #[test]
    fn unparseable_date_does_not_replace_latest() {
        let reports = vec![
            report("2026-01-15", "", &[("C4", "0.1")]),
            report("unknown", "", &[("C4", "0.3")]),
        ];
        assert_eq!(merge(&reports)[0].latest.value, "0.1");
    }

    #[test]
    fn distinct_indicators_keep_first_appearance_order() {
        let reports = vec![
            report("2026-01-15", "", &[("C3", "0.7"), ("IgG", "12")]),
            report("2025-12-10", "", &[("白细胞计数", "4.2"), ("C3", "0.8")]),
        ];
        let names: Vec<_> = merge(&reports).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["C3", "IgG", "白细胞计数"]);
    }

    #[test]
    fn report_summary_collects_dates_and_hospitals() {
        let reports = vec![
            report("2025-12-10", "乙医院", &[]),
            report("2026-01-15", "甲医院", &[]),
            report("2026-01-02", "乙医院", &[]),
        ];
        let summary = merge_reports(&reports);
        assert_eq!(summary.report_count, 3);
        assert_eq!(summary.report_date.as_deref(), Some("2026-01-15"));
        assert_eq!(summary.hospital_name, "乙医院, 甲医院");
        assert!(summary.indicators.is_empty());
    }
}

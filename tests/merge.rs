use labnorm::{
    data::report::{Indicator, ParsedReport, ReportType},
    series::{merge, merge_reports},
};
use proptest::prelude::*;

fn report(date: &str, indicators: Vec<Indicator>) -> ParsedReport {
    ParsedReport {
        patient_id: Some("P-1".into()),
        report_date: date.into(),
        hospital_name: "某某医院".into(),
        report_type: ReportType::Lab,
        indicators,
        normalization_results: Vec::new(),
        original_text: String::new(),
    }
}

fn wbc(value: &str) -> Indicator {
    let mut indicator = Indicator::new("WBC", value);
    indicator.normalized_name = Some("白细胞计数".into());
    indicator
}

#[test]
fn newer_report_listed_first_wins_latest() {
    let reports = vec![
        report("2026-01-15", vec![wbc("3.8")]),
        report("2025-11-02", vec![wbc("4.2")]),
    ];
    let merged = merge(&reports);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].name, "白细胞计数");
    assert_eq!(merged[0].latest.value, "3.8");
    let history: Vec<_> = merged[0].history.iter().map(|i| i.value.as_str()).collect();
    assert_eq!(history, vec!["3.8", "4.2"]);
}

#[test]
fn summary_serializes_without_internal_fields() {
    let merged = merge_reports(&[report("2026-01-15", vec![wbc("3.8")])]);
    let json = serde_json::to_value(&merged).unwrap();
    assert_eq!(json["report_count"], 1);
    assert!(json["indicators"][0].get("latest_date").is_none());
}

proptest! {
    #[test]
    fn series_count_matches_occurrences(
        per_report in prop::collection::vec(prop::collection::vec(0usize..4, 0..5), 1..6)
    ) {
        let names = ["C3", "C4", "IgG", "IgM"];
        let reports: Vec<_> = per_report
            .iter()
            .enumerate()
            .map(|(day, picks)| {
                let indicators = picks
                    .iter()
                    .map(|&idx| Indicator::new(names[idx], "1.0"))
                    .collect();
                report(&format!("2026-01-{:02}", day + 1), indicators)
            })
            .collect();

        let merged = merge(&reports);
        let total: usize = per_report.iter().map(Vec::len).sum();
        prop_assert_eq!(merged.iter().map(|s| s.occurrence_count).sum::<usize>(), total);
        for series in &merged {
            prop_assert_eq!(series.history.len(), series.occurrence_count);
            prop_assert_eq!(series.report_dates.len(), series.occurrence_count);
        }
    }
}

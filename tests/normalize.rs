use labnorm::{
    data::dictionary::{DictionaryHandle, TermDictionary},
    nlp::{
        classifier::ClassifierProvider,
        lexical::MatchTier,
        normalizer::{Normalizer, ResolvedBy},
    },
};
use proptest::prelude::*;

const ALLOWED: &[f64] = &[1.0, 0.9, 0.8, 0.6, 0.5, 0.4, 0.0];

fn normalizer() -> Normalizer {
    Normalizer::new(
        DictionaryHandle::new(TermDictionary::standard()),
        ClassifierProvider::unconfigured(),
        0.6,
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn mixed_batch_without_classifier() {
    let results = normalizer()
        .normalize_batch(&owned(&["ANA", "白细胞", "完全未知术语"]), 0.6)
        .await
        .unwrap();

    let pairs: Vec<_> = results
        .iter()
        .map(|r| (r.normalized.as_str(), r.confidence))
        .collect();
    assert_eq!(
        pairs,
        vec![("抗核抗体", 1.0), ("白细胞计数", 1.0), ("完全未知术语", 0.0)]
    );
    assert!(results[2]
        .explanation
        .as_deref()
        .unwrap()
        .contains("keeping original term"));
}

#[test]
fn every_dictionary_surface_form_resolves_exactly() {
    let dictionary = TermDictionary::standard();
    let normalizer = normalizer();
    for term in dictionary.terms() {
        let forms: Vec<String> = term.surface_forms().map(str::to_string).collect();
        for result in normalizer.normalize_lexical(&forms) {
            assert_eq!(result.confidence, 1.0, "{}", result.original);
            assert_eq!(result.resolved_by, ResolvedBy::Lexical(MatchTier::Exact));
        }
    }
}

#[test]
fn canonical_names_are_fixed_points() {
    let dictionary = TermDictionary::standard();
    let names: Vec<String> = dictionary.terms().map(|t| t.name.clone()).collect();
    for result in normalizer().normalize_lexical(&names) {
        assert_eq!(result.normalized, result.original);
    }
}

#[test]
fn extension_is_visible_to_later_calls() {
    let normalizer = normalizer();
    let before = normalizer.normalize_lexical(&owned(&["ESR"]));
    assert!(before[0].confidence < 1.0);

    normalizer.dictionary().extend(
        [("红细胞沉降率".to_string(), vec!["ESR".to_string(), "血沉".to_string()])]
            .into_iter()
            .collect(),
    );
    let after = normalizer.normalize_lexical(&owned(&["ESR"]));
    assert_eq!(after[0].normalized, "红细胞沉降率");
    assert_eq!(after[0].confidence, 1.0);
}

fn term_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(vec![
            "ANA", "白细胞", "WBC", "补体C3", "IgG抗体", "尿蛋白", "姓名", "客户姓名备注",
            "血红蛋白浓度(静脉)", "免疫球蛋白", "C3 补体 测定",
        ])
        .prop_map(str::to_string),
        "[a-zA-Z0-9 ()（）\\-]{0,12}",
        "[\\u4e00-\\u9fa5]{1,6}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn confidences_stay_in_allowed_set(terms in prop::collection::vec(term_strategy(), 0..8)) {
        let results = runtime().block_on(normalizer().normalize_batch(&terms, 0.6)).unwrap();
        prop_assert_eq!(results.len(), terms.len());
        for (result, term) in results.iter().zip(&terms) {
            prop_assert_eq!(&result.original, term);
            prop_assert!(ALLOWED.contains(&result.confidence), "{}", result.confidence);
        }
    }

    #[test]
    fn lowering_threshold_never_adds_escalations(
        terms in prop::collection::vec(term_strategy(), 1..6),
        high in 0.0f64..=1.0,
        cut in 0.0f64..=1.0,
    ) {
        let low = high * cut;
        let rt = runtime();
        let escalated = |threshold: f64| {
            rt.block_on(normalizer().normalize_batch(&terms, threshold))
                .unwrap()
                .into_iter()
                .filter(|r| r.resolved_by == ResolvedBy::Classifier)
                .count()
        };
        prop_assert!(escalated(low) <= escalated(high));
    }

    #[test]
    fn batch_matches_single_calls(terms in prop::collection::vec(term_strategy(), 1..6)) {
        let rt = runtime();
        let normalizer = normalizer();
        let batch = rt.block_on(normalizer.normalize_batch(&terms, 0.6)).unwrap();
        for (term, expected) in terms.iter().zip(&batch) {
            let single = rt.block_on(normalizer.normalize(term, 0.6)).unwrap();
            prop_assert_eq!(&single, expected);
        }
    }
}

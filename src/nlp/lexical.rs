//! Tiered lexical matching of free-text indicator names against the dictionary.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::data::dictionary::{clean_term, TermDictionary};

/// Report header labels that are not medical terms but appear next to them.
const ADMIN_FIELDS: &[&str] = &[
    "名称",
    "手机号",
    "联系电话",
    "手机",
    "客户姓名",
    "姓名",
    "收货人姓名",
    "地址",
    "收货地址",
    "邮编",
    "身份证号",
    "出生日期",
    "性别",
    "年龄",
    "民族",
    "职业",
    "婚姻状况",
    "籍贯",
    "工作单位",
    "紧急联系人",
    "邮箱",
    "QQ",
    "微信",
    "备注",
];

const KEYWORD_OVERLAP_RATIO: f64 = 0.5;

static CLEANED_ADMIN_FIELDS: Lazy<Vec<String>> =
    Lazy::new(|| ADMIN_FIELDS.iter().map(|field| clean_term(field)).collect());

/// Lexical tier that produced a match, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Partial,
    Keyword,
    AdminExact,
    AdminPartial,
    Unresolved,
}

impl MatchTier {
    pub fn confidence(self) -> f64 {
        match self {
            Self::Exact => 1.0,
            Self::AdminExact => 0.9,
            Self::Partial | Self::AdminPartial => 0.8,
            Self::Keyword => 0.6,
            Self::Unresolved => 0.5,
        }
    }
}

/// Outcome of lexical matching for one term.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalMatch {
    pub normalized: String,
    pub confidence: f64,
    pub tier: MatchTier,
}

impl LexicalMatch {
    fn new(normalized: impl Into<String>, tier: MatchTier) -> Self {
        Self {
            normalized: normalized.into(),
            confidence: tier.confidence(),
            tier,
        }
    }
}

/// Stateless matcher evaluated against a dictionary snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalMatcher;

impl LexicalMatcher {
    /// Run the tiers in order and return the first hit.
    pub fn match_term(&self, dictionary: &TermDictionary, term: &str) -> LexicalMatch {
        if let Some(canonical) = dictionary.lookup_exact(term) {
            return LexicalMatch::new(canonical, MatchTier::Exact);
        }

        let cleaned = clean_term(term);
        if !cleaned.is_empty() {
            if let Some(canonical) = partial_match(dictionary, &cleaned) {
                return LexicalMatch::new(canonical, MatchTier::Partial);
            }
            if let Some(canonical) = keyword_match(dictionary, &cleaned) {
                return LexicalMatch::new(canonical, MatchTier::Keyword);
            }
        }

        if let Some(found) = admin_field_match(term, &cleaned) {
            return found;
        }

        LexicalMatch::new(term, MatchTier::Unresolved)
    }
}

fn partial_match<'a>(dictionary: &'a TermDictionary, cleaned: &str) -> Option<&'a str> {
    dictionary.cleaned_forms().find_map(|(name, forms)| {
        forms
            .iter()
            .any(|candidate| contains_either(candidate, cleaned))
            .then_some(name)
    })
}

fn keyword_match<'a>(dictionary: &'a TermDictionary, cleaned: &str) -> Option<&'a str> {
    let keywords: HashSet<&str> = cleaned.split_whitespace().collect();
    if keywords.is_empty() {
        return None;
    }
    dictionary.cleaned_forms().find_map(|(name, forms)| {
        forms
            .iter()
            .any(|form| keyword_overlap(&keywords, form))
            .then_some(name)
    })
}

fn keyword_overlap(keywords: &HashSet<&str>, candidate: &str) -> bool {
    let other: HashSet<&str> = candidate.split_whitespace().collect();
    if other.is_empty() {
        return false;
    }
    let common = keywords.intersection(&other).count();
    common as f64 / keywords.len().min(other.len()) as f64 >= KEYWORD_OVERLAP_RATIO
}

fn admin_field_match(term: &str, cleaned: &str) -> Option<LexicalMatch> {
    let trimmed = term.trim();
    let mut fields = ADMIN_FIELDS.iter().zip(CLEANED_ADMIN_FIELDS.iter());
    if let Some((field, _)) = fields
        .clone()
        .find(|(field, field_cleaned)| **field == trimmed || field_cleaned.as_str() == cleaned)
    {
        return Some(LexicalMatch::new(*field, MatchTier::AdminExact));
    }
    if cleaned.is_empty() {
        return None;
    }
    fields
        .find(|(_, field_cleaned)| contains_either(field_cleaned, cleaned))
        .map(|(field, _)| LexicalMatch::new(*field, MatchTier::AdminPartial))
}

fn contains_either(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

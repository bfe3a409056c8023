//! Canonical term dictionary and its variant index.

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Seed table: (canonical name, category, variants).
const STANDARD_TERMS: &[(&str, &str, &[&str])] = &[
    ("抗核抗体", "自身抗体", &["ANA", "抗核抗体测定", "抗核抗体检测", "ANA抗体"]),
    ("抗双链DNA抗体", "自身抗体", &["dsDNA", "抗dsDNA抗体", "双链DNA抗体", "ds-DNA"]),
    ("Sm抗体", "自身抗体", &["抗Sm抗体", "Sm蛋白抗体"]),
    ("RNP抗体", "自身抗体", &["抗RNP抗体", "核糖核蛋白抗体"]),
    ("SSA抗体", "自身抗体", &["抗SSA抗体", "Ro抗体", "抗Ro抗体"]),
    ("SSB抗体", "自身抗体", &["抗SSB抗体", "La抗体", "抗La抗体"]),
    ("白细胞计数", "血常规", &["白细胞", "WBC", "白血球计数", "白细胞数"]),
    ("红细胞计数", "血常规", &["红细胞", "RBC", "红血球计数", "红细胞数"]),
    ("血红蛋白", "血常规", &["Hb", "血色素", "血红蛋白浓度"]),
    ("血小板计数", "血常规", &["血小板", "PLT", "血小板数"]),
    ("尿蛋白", "尿常规", &["蛋白", "PRO", "尿液蛋白", "尿中蛋白"]),
    ("尿红细胞", "尿常规", &["红细胞", "ERY", "尿潜血", "隐血"]),
    ("尿白细胞", "尿常规", &["白细胞", "LEU", "尿中白细胞"]),
    ("C3", "免疫功能", &["补体C3", "C3补体", "补体成分3"]),
    ("C4", "免疫功能", &["补体C4", "C4补体", "补体成分4"]),
    ("IgG", "免疫功能", &["免疫球蛋白G", "IgG抗体", "免疫球蛋白G测定"]),
    ("IgA", "免疫功能", &["免疫球蛋白A", "IgA抗体", "免疫球蛋白A测定"]),
    ("IgM", "免疫功能", &["免疫球蛋白M", "IgM抗体", "免疫球蛋白M测定"]),
];

/// One canonical term with its known surface variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTerm {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub variants: Vec<String>,
}

impl CanonicalTerm {
    /// Canonical name followed by every variant, in insertion order.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.variants.iter().map(String::as_str))
    }
}

/// Clean a term for matching: collapse whitespace, drop bracketed content,
/// drop punctuation, lower-case.
pub fn clean_term(term: &str) -> String {
    static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
    static BRACKETED: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\([^)]*\)|（[^）]*）").expect("valid regex"));
    static PUNCTUATION: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

    let collapsed = WHITESPACE.replace_all(term, " ");
    let unbracketed = BRACKETED.replace_all(collapsed.trim(), "");
    let stripped = PUNCTUATION.replace_all(unbracketed.trim(), "");
    stripped.trim().to_lowercase()
}

/// Immutable dictionary snapshot with its derived variant index.
#[derive(Debug, Clone)]
pub struct TermDictionary {
    terms: IndexMap<String, CanonicalTerm>,
    index: IndexMap<String, String>,
    /// Non-empty cleaned surface forms per canonical name.
    cleaned: IndexMap<String, Vec<String>>,
}

impl TermDictionary {
    /// Build a dictionary from canonical entries; duplicate names are merged.
    pub fn new<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = CanonicalTerm>,
    {
        let mut map: IndexMap<String, CanonicalTerm> = IndexMap::new();
        for term in terms {
            match map.get_mut(&term.name) {
                Some(existing) => {
                    append_variants(existing, term.variants);
                    if existing.category.is_none() {
                        existing.category = term.category;
                    }
                }
                None => {
                    map.insert(term.name.clone(), term);
                }
            }
        }
        let index = build_index(&map);
        let cleaned = map
            .values()
            .map(|term| {
                let forms = term
                    .surface_forms()
                    .map(clean_term)
                    .filter(|form| !form.is_empty())
                    .collect();
                (term.name.clone(), forms)
            })
            .collect();
        debug!(terms = map.len(), keys = index.len(), "built variant index");
        Self {
            terms: map,
            index,
            cleaned,
        }
    }

    /// Dictionary seeded with the built-in standard terms.
    pub fn standard() -> Self {
        Self::new(STANDARD_TERMS.iter().map(|(name, category, variants)| CanonicalTerm {
            name: (*name).to_string(),
            category: Some((*category).to_string()),
            variants: variants.iter().map(|v| (*v).to_string()).collect(),
        }))
    }

    /// Resolve a term that is literally a key of the variant index, first as
    /// given and then in cleaned form.
    pub fn lookup_exact(&self, term: &str) -> Option<&str> {
        self.index
            .get(term)
            .or_else(|| self.index.get(&clean_term(term)))
            .map(String::as_str)
    }

    /// Return a new dictionary with `additions` appended and the index rebuilt.
    pub fn extended(&self, additions: IndexMap<String, Vec<String>>) -> Self {
        let mut terms = self.terms.clone();
        for (name, variants) in additions {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            let entry = terms.entry(name.clone()).or_insert_with(|| CanonicalTerm {
                name,
                category: None,
                variants: Vec::new(),
            });
            append_variants(entry, variants);
        }
        Self::new(terms.into_values())
    }

    /// Canonical names with their cleaned surface forms, in dictionary order.
    pub fn cleaned_forms(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.cleaned
            .iter()
            .map(|(name, forms)| (name.as_str(), forms.as_slice()))
    }

    pub fn terms(&self) -> impl Iterator<Item = &CanonicalTerm> {
        self.terms.values()
    }

    pub fn get(&self, name: &str) -> Option<&CanonicalTerm> {
        self.terms.get(name)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Default for TermDictionary {
    fn default() -> Self {
        Self::standard()
    }
}

fn append_variants(term: &mut CanonicalTerm, variants: Vec<String>) {
    for variant in variants {
        let variant = variant.trim().to_string();
        if !variant.is_empty() && !term.variants.contains(&variant) {
            term.variants.push(variant);
        }
    }
}

/// Canonical names are indexed before variants and the first claim on a key
/// wins, so canonical names always resolve to themselves.
fn build_index(terms: &IndexMap<String, CanonicalTerm>) -> IndexMap<String, String> {
    let mut index = IndexMap::new();
    for term in terms.values() {
        index.entry(term.name.clone()).or_insert_with(|| term.name.clone());
        index
            .entry(clean_term(&term.name))
            .or_insert_with(|| term.name.clone());
    }
    for term in terms.values() {
        for variant in &term.variants {
            index.entry(variant.clone()).or_insert_with(|| term.name.clone());
            index
                .entry(clean_term(variant))
                .or_insert_with(|| term.name.clone());
        }
    }
    index.shift_remove("");
    index
}

/// Shared handle over the current dictionary snapshot.
///
/// Readers clone an `Arc` and keep working against it; `extend` builds the
/// replacement off to the side and swaps it in under the write lock.
#[derive(Debug, Clone, Default)]
pub struct DictionaryHandle {
    current: Arc<RwLock<Arc<TermDictionary>>>,
}

impl DictionaryHandle {
    pub fn new(dictionary: TermDictionary) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(dictionary))),
        }
    }

    pub fn snapshot(&self) -> Arc<TermDictionary> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Append variants and publish the rebuilt dictionary. Returns the new snapshot.
    pub fn extend(&self, additions: IndexMap<String, Vec<String>>) -> Arc<TermDictionary> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let added = additions.len();
        let next = Arc::new(guard.extended(additions));
        *guard = next.clone();
        info!(added, terms = next.len(), "dictionary extended");
        next
    }
}

//! Dictionary and report data layer.

pub mod dictionary;
pub mod report;

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use tracing::info;

use crate::config::Settings;
use dictionary::{DictionaryHandle, TermDictionary};

/// Read a `{canonical: [variants]}` JSON file.
pub fn load_term_additions(path: &Path) -> Result<IndexMap<String, Vec<String>>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading extra terms from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing extra terms {}", path.display()))
}

/// Standard dictionary, extended with `EXTRA_TERMS_PATH` when configured.
pub fn load_dictionary(settings: &Settings) -> Result<DictionaryHandle> {
    let handle = DictionaryHandle::new(TermDictionary::standard());
    if let Some(path) = &settings.extra_terms_path {
        let additions = load_term_additions(path)?;
        info!(path = %path.display(), entries = additions.len(), "loading extra terms");
        handle.extend(additions);
    }
    Ok(handle)
}

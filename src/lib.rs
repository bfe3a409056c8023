//! Lab and pathology report indicator extraction, medical term normalisation
//! and multi-report trend merging.

pub mod api;
pub mod cli;
pub mod config;
pub mod data;
pub mod logging;
pub mod nlp;
pub mod series;

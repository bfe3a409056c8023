//! Cross-report indicator series and their trends.

pub mod merge;
pub mod trend;

pub use merge::{merge, merge_reports, MergedIndicatorSeries, MergedReport};

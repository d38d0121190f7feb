//! Outlier detection and quality scoring.

pub mod outliers;
pub mod scorer;
pub mod stats;

pub use outliers::{CohortStats, CohortVerdicts, OutlierDetector, OutlierVerdict};
pub use scorer::{ConversionFacts, QualityScorer};

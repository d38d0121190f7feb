//! Ensemble outlier detection within a cohort.
//!
//! A cohort is every record of one `(company type, canonical product)`, and
//! statistics are computed once per cohort on `volume_liters`. Three tests vote:
//!
//! | Test | Flags when |
//! |------|------------|
//! | IQR | value outside `[Q1 - k·IQR, Q3 + k·IQR]` |
//! | Robust z | `|0.6745 · (x - median) / MAD| > threshold` |
//! | Density | among the `ceil(contamination · n)` lowest Gaussian-KDE densities |
//!
//! A value is an outlier when at least `consensus_threshold` tests flag it.
//! Cohorts smaller than `min_cohort_size` skip the density test and need
//! `min(consensus_threshold, 2)` votes.
//!
//! Zero values are "no activity" observations: they are left out of the
//! statistics and never flagged.

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;

use super::stats::{gaussian_kde, silverman_bandwidth, Fences, RobustScale};

/// Votes behind one outlier decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierVerdict {
    pub is_outlier: bool,
    pub votes: u8,
    /// Tests that took part; 0 for exempt zero values.
    pub tests_run: u8,
    pub iqr: bool,
    pub robust_z: bool,
    /// `None` when the cohort was too small for the density test.
    pub density: Option<bool>,
    /// Value clamped to the IQR fences, set for flagged values when capping is on.
    pub capped_value: Option<f64>,
}

impl OutlierVerdict {
    /// Verdict for a value no test looked at (zeros).
    pub fn exempt() -> Self {
        Self {
            is_outlier: false,
            votes: 0,
            tests_run: 0,
            iqr: false,
            robust_z: false,
            density: None,
            capped_value: None,
        }
    }
}

/// Per-cohort statistics, kept for logging and reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CohortStats {
    /// Non-zero values the statistics were computed on.
    pub size: usize,
    pub q1: f64,
    pub q3: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
    pub median: f64,
    pub spread: f64,
    pub density_test: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortVerdicts {
    /// One verdict per input value, in input order.
    pub verdicts: Vec<OutlierVerdict>,
    /// `None` when the cohort had no non-zero values.
    pub stats: Option<CohortStats>,
}

impl CohortVerdicts {
    pub fn outlier_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_outlier).count()
    }
}

#[derive(Debug, Clone)]
pub struct OutlierDetector {
    pub iqr_multiplier: f64,
    pub robust_z_threshold: f64,
    pub contamination: f64,
    pub min_cohort_size: usize,
    pub consensus_threshold: usize,
    pub cap_outliers: bool,
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl OutlierDetector {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            iqr_multiplier: config.iqr_multiplier,
            robust_z_threshold: config.robust_z_threshold,
            contamination: config.contamination,
            min_cohort_size: config.min_cohort_size,
            consensus_threshold: config.consensus_threshold,
            cap_outliers: config.cap_outliers,
        }
    }

    /// Flag outliers among one cohort's values.
    pub fn detect(&self, values: &[f64]) -> CohortVerdicts {
        let active: Vec<(usize, f64)> = values
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| *v != 0.0)
            .collect();

        let mut verdicts = vec![OutlierVerdict::exempt(); values.len()];
        if active.is_empty() {
            return CohortVerdicts { verdicts, stats: None };
        }

        let sample: Vec<f64> = active.iter().map(|(_, v)| *v).collect();
        let fences = Fences::new(&sample, self.iqr_multiplier);
        let scale = RobustScale::new(&sample);
        let density_flags = if sample.len() >= self.min_cohort_size {
            Some(self.low_density_flags(&sample))
        } else {
            None
        };

        let tests_run: u8 = if density_flags.is_some() { 3 } else { 2 };
        let required = self.consensus_threshold.min(tests_run as usize);

        for (position, (index, value)) in active.iter().enumerate() {
            let iqr = !fences.contains(*value);
            let robust_z = scale.z_score(*value).abs() > self.robust_z_threshold;
            let density = density_flags.as_ref().map(|flags| flags[position]);
            let votes = [iqr, robust_z, density.unwrap_or(false)]
                .iter()
                .filter(|flag| **flag)
                .count();
            let is_outlier = votes >= required;

            verdicts[*index] = OutlierVerdict {
                is_outlier,
                votes: votes as u8,
                tests_run,
                iqr,
                robust_z,
                density,
                capped_value: (is_outlier && self.cap_outliers).then(|| fences.clamp(*value)),
            };
        }

        let stats = CohortStats {
            size: sample.len(),
            q1: fences.q1,
            q3: fences.q3,
            lower_fence: fences.lower,
            upper_fence: fences.upper,
            median: scale.median,
            spread: scale.spread,
            density_test: density_flags.is_some(),
        };
        CohortVerdicts { verdicts, stats: Some(stats) }
    }

    /// Flag the `ceil(contamination · n)` lowest-density points.
    fn low_density_flags(&self, sample: &[f64]) -> Vec<bool> {
        let density = gaussian_kde(sample, silverman_bandwidth(sample));
        let flag_count = ((self.contamination * sample.len() as f64).ceil() as usize).min(sample.len());

        let mut order: Vec<usize> = (0..sample.len()).collect();
        // Ties go to the earlier value.
        order.sort_by(|a, b| density[*a].total_cmp(&density[*b]).then(a.cmp(b)));

        let mut flags = vec![false; sample.len()];
        for index in order.into_iter().take(flag_count) {
            flags[index] = true;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> OutlierDetector {
        OutlierDetector::default()
    }

    #[test]
    fn test_extreme_value_flagged_by_all_tests() {
        let values = [100.0, 105.0, 98.0, 102.0, 101.0, 99.0, 103.0, 5000.0];
        let result = detector().detect(&values);

        let verdict = result.verdicts[7];
        assert!(verdict.is_outlier);
        assert_eq!(verdict.tests_run, 3);
        assert!(verdict.iqr && verdict.robust_z);
        assert_eq!(verdict.density, Some(true));
        assert_eq!(verdict.capped_value, Some(result.stats.unwrap().upper_fence));
        assert_eq!(result.outlier_count(), 1);
    }

    #[test]
    fn test_density_vote_alone_is_not_enough() {
        let values = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let result = detector().detect(&values);
        // The density test always flags one point, but nothing else agrees.
        assert_eq!(result.outlier_count(), 0);
        assert_eq!(result.verdicts.iter().filter(|v| v.density == Some(true)).count(), 1);
    }

    #[test]
    fn test_small_cohort_skips_density_test() {
        let values = [100.0, 101.0, 102.0, 10_000.0];
        let result = detector().detect(&values);
        assert!(!result.stats.unwrap().density_test);
        let verdict = result.verdicts[3];
        assert_eq!(verdict.tests_run, 2);
        assert_eq!(verdict.density, None);
        assert!(verdict.is_outlier);
    }

    #[test]
    fn test_zeros_are_exempt() {
        let values = [0.0, 500.0, 510.0, 495.0, 505.0, 0.0, 502.0];
        let result = detector().detect(&values);
        assert!(!result.verdicts[0].is_outlier);
        assert_eq!(result.verdicts[0].tests_run, 0);
        assert_eq!(result.stats.unwrap().size, 5);

        let all_zero = detector().detect(&[0.0, 0.0]);
        assert!(all_zero.stats.is_none());
        assert_eq!(all_zero.outlier_count(), 0);
    }

    #[test]
    fn test_capping_can_be_disabled() {
        let values = [100.0, 105.0, 98.0, 102.0, 101.0, 99.0, 103.0, 5000.0];
        let detector = OutlierDetector { cap_outliers: false, ..detector() };
        let result = detector.detect(&values);
        assert!(result.verdicts[7].is_outlier);
        assert_eq!(result.verdicts[7].capped_value, None);
    }

    #[test]
    fn test_consensus_threshold_is_configurable() {
        let values = [100.0, 105.0, 98.0, 102.0, 101.0, 99.0, 103.0, 5000.0];
        let strict = OutlierDetector { consensus_threshold: 3, ..detector() };
        assert!(strict.detect(&values).verdicts[7].is_outlier);

        let lenient = OutlierDetector { consensus_threshold: 1, ..detector() };
        // Every cohort of this size has one low-density point.
        assert!(lenient.detect(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]).outlier_count() >= 1);
    }
}

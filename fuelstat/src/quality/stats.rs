//! Descriptive statistics for cohort-level outlier tests.
//!
//! All functions take unsorted slices. Empty input yields 0.0, never NaN.

use std::f64::consts::PI;

/// Consistency constant relating mean absolute deviation to sigma for a
/// normal distribution (sqrt(pi / 2)).
pub const MEAN_AD_SCALE: f64 = 1.253314;

/// Constant relating MAD to sigma in the modified z-score.
pub const ROBUST_Z_SCALE: f64 = 0.6745;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

// ============================================================================
// Location and Spread
// ============================================================================

/// Quantile `q` in `[0, 1]` with linear interpolation between order statistics.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted(values), q)
}

/// [`quantile`] over data that is already sorted.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let position = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median absolute deviation around the median.
pub fn mad(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Mean absolute deviation around the median.
pub fn mean_abs_dev(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    mean(&deviations)
}

/// Sample standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

// ============================================================================
// Quartile Fences
// ============================================================================

/// Tukey fences `[Q1 - k·IQR, Q3 + k·IQR]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fences {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Fences {
    pub fn new(values: &[f64], multiplier: f64) -> Self {
        let sorted = sorted(values);
        let q1 = quantile_sorted(&sorted, 0.25);
        let q3 = quantile_sorted(&sorted, 0.75);
        let iqr = q3 - q1;
        Self {
            q1,
            q3,
            lower: q1 - multiplier * iqr,
            upper: q3 + multiplier * iqr,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Clamp to the fences, never below zero.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower.max(0.0), self.upper.max(0.0))
    }
}

// ============================================================================
// Robust Z-Score
// ============================================================================

/// Median and scale for the modified z-score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustScale {
    pub median: f64,
    /// MAD, or the scaled mean absolute deviation when MAD is zero.
    pub spread: f64,
    pub used_mean_ad: bool,
}

impl RobustScale {
    pub fn new(values: &[f64]) -> Self {
        let center = median(values);
        let m = mad(values);
        if m > 0.0 {
            Self { median: center, spread: m, used_mean_ad: false }
        } else {
            // Over half the cohort sits on the median: fall back to meanAD.
            Self {
                median: center,
                spread: mean_abs_dev(values) * MEAN_AD_SCALE,
                used_mean_ad: true,
            }
        }
    }

    /// `0.6745 · (x - median) / MAD`, or 0.0 when the cohort has no spread.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.spread <= f64::EPSILON {
            return 0.0;
        }
        if self.used_mean_ad {
            // meanAD scaled to sigma already; no further consistency constant.
            (value - self.median) / self.spread
        } else {
            ROBUST_Z_SCALE * (value - self.median) / self.spread
        }
    }
}

// ============================================================================
// Kernel Density
// ============================================================================

/// Silverman's rule-of-thumb bandwidth: `0.9 · min(σ, IQR/1.34) · n^(-1/5)`.
///
/// Falls back to whichever spread is non-zero, and to 1.0 for a constant cohort.
pub fn silverman_bandwidth(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 1.0;
    }
    let sigma = std_dev(values);
    let iqr = quantile(values, 0.75) - quantile(values, 0.25);
    let spread = match (sigma > 0.0, iqr > 0.0) {
        (true, true) => sigma.min(iqr / 1.34),
        (true, false) => sigma,
        (false, true) => iqr / 1.34,
        (false, false) => return 1.0,
    };
    0.9 * spread * (n as f64).powf(-0.2)
}

/// Gaussian kernel density estimate evaluated at every sample point.
pub fn gaussian_kde(values: &[f64], bandwidth: f64) -> Vec<f64> {
    let n = values.len() as f64;
    let norm = 1.0 / (n * bandwidth * (2.0 * PI).sqrt());
    values
        .iter()
        .map(|x| {
            let sum: f64 = values
                .iter()
                .map(|xi| {
                    let u = (x - xi) / bandwidth;
                    (-0.5 * u * u).exp()
                })
                .sum();
            sum * norm
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
        assert_eq!(quantile(&values, 0.5), 2.5);
        assert_eq!(quantile(&values, 0.25), 1.75);
        assert_eq!(quantile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_median_and_mad() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert_eq!(median(&values), 3.0);
        assert_eq!(mad(&values), 1.0);
    }

    #[test]
    fn test_fences() {
        let values = [10.0, 12.0, 11.0, 13.0, 12.0, 11.0, 95.0];
        let fences = Fences::new(&values, 1.5);
        assert!(fences.contains(12.0));
        assert!(!fences.contains(95.0));
        assert_eq!(fences.clamp(95.0), fences.upper);
        // Lower fence is floored at zero when clamping.
        let wide = Fences { q1: 1.0, q3: 2.0, lower: -0.5, upper: 3.5 };
        assert_eq!(wide.clamp(-10.0), 0.0);
    }

    #[test]
    fn test_zero_mad_falls_back_to_mean_abs_dev() {
        let values = [5.0, 5.0, 5.0, 5.0, 50.0];
        let scale = RobustScale::new(&values);
        assert!(scale.used_mean_ad);
        assert!((scale.spread - 9.0 * MEAN_AD_SCALE).abs() < 1e-9);
        assert!(scale.z_score(50.0) > 3.5);
        assert_eq!(scale.z_score(5.0), 0.0);

        let constant = RobustScale::new(&[7.0, 7.0, 7.0]);
        assert_eq!(constant.z_score(7.0), 0.0);
    }

    #[test]
    fn test_kde_is_lowest_at_isolated_point() {
        let values = [10.0, 10.5, 11.0, 11.5, 12.0, 40.0];
        let density = gaussian_kde(&values, silverman_bandwidth(&values));
        let lowest = density
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(lowest, 5);
    }

    #[test]
    fn test_bandwidth_of_constant_cohort() {
        assert_eq!(silverman_bandwidth(&[3.0, 3.0, 3.0]), 1.0);
        assert_eq!(silverman_bandwidth(&[3.0]), 1.0);
        assert!(silverman_bandwidth(&[1.0, 2.0, 3.0, 4.0]) > 0.0);
    }
}

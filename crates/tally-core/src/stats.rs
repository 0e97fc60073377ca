//! Shared numeric primitives
//!
//! Every function here is total over finite input: empty and single-element
//! slices produce 0 (or a degenerate but finite value) rather than NaN.
//! Non-finite inputs are treated as 0 via [`sanitize`].

/// Replace NaN/Infinity with 0
pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Clamp to [0, 1], mapping NaN to 0
pub fn unit(value: f64) -> f64 {
    sanitize(value).clamp(0.0, 1.0)
}

/// Arithmetic mean (0 for empty input)
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let direct = values.iter().copied().map(sanitize).sum::<f64>() / n;
    if direct.is_finite() {
        return direct;
    }
    // The running sum overflowed; dividing first keeps every term in range
    sanitize(values.iter().map(|v| sanitize(*v) / n).sum::<f64>())
}

/// Median; even counts average the two middle elements
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let sorted = sorted_copy(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        sorted[mid - 1] / 2.0 + sorted[mid] / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation around a precomputed mean
pub fn standard_deviation(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = sanitize(mean);
    let n = values.len() as f64;
    let variance = values
        .iter()
        .map(|v| (sanitize(*v) - mean).powi(2))
        .sum::<f64>()
        / n;
    if variance.is_finite() {
        return variance.sqrt();
    }

    // Squares overflowed; rescale by the largest magnitude and scale back
    let scale = values
        .iter()
        .map(|v| sanitize(*v).abs())
        .fold(mean.abs(), f64::max);
    let scaled_variance = values
        .iter()
        .map(|v| (sanitize(*v) / scale - mean / scale).powi(2))
        .sum::<f64>()
        / n;
    sanitize(scaled_variance.sqrt() * scale)
}

/// Standard deviation divided by the absolute mean (0 when the mean is 0)
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < f64::EPSILON {
        return 0.0;
    }
    sanitize(standard_deviation(values, m) / m.abs())
}

/// Q1, Q2, Q3 of an ascending slice using linear interpolation between ranks
pub fn quartiles(sorted_values: &[f64]) -> [f64; 3] {
    [
        percentile(sorted_values, 0.25),
        percentile(sorted_values, 0.50),
        percentile(sorted_values, 0.75),
    ]
}

/// Linear-interpolated percentile of an ascending slice (`p` in [0, 1])
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    match sorted_values.len() {
        0 => 0.0,
        1 => sanitize(sorted_values[0]),
        n => {
            let rank = unit(p) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            let (a, b) = (sanitize(sorted_values[lower]), sanitize(sorted_values[upper]));
            let value = a + (b - a) * weight;
            if value.is_finite() {
                value
            } else {
                sanitize(a * (1.0 - weight) + b * weight)
            }
        }
    }
}

/// Inclusive bounds outside of which a value counts as an outlier (IQR rule)
pub fn outlier_bounds(values: &[f64]) -> Option<(f64, f64)> {
    // Quartiles of fewer than 4 values are too coarse to call anything an outlier
    if values.len() < 4 {
        return None;
    }
    let sorted = sorted_copy(values);
    let [q1, _, q3] = quartiles(&sorted);
    let iqr = q3 - q1;
    Some((
        (q1 - 1.5 * iqr).max(f64::MIN),
        (q3 + 1.5 * iqr).min(f64::MAX),
    ))
}

/// Indices of values beyond `Q1 - 1.5·IQR` or `Q3 + 1.5·IQR`
pub fn outliers(values: &[f64]) -> Vec<usize> {
    let Some((low, high)) = outlier_bounds(values) else {
        return Vec::new();
    };
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| {
            let v = sanitize(**v);
            v < low || v > high
        })
        .map(|(i, _)| i)
        .collect()
}

/// Weighted mean where the last element weighs 1 and each older one `decay` times less
///
/// Only the newest `window` values are considered.
pub fn recency_weighted_mean(values: &[f64], decay: f64, window: usize) -> f64 {
    let decay = unit(decay);
    let mut weight = 1.0;
    let mut total = 0.0;
    let mut weights = 0.0;

    let recent: Vec<f64> = values
        .iter()
        .rev()
        .take(window.max(1))
        .map(|v| sanitize(*v))
        .collect();
    let mut weight_list = Vec::with_capacity(recent.len());
    for value in &recent {
        total += value * weight;
        weights += weight;
        weight_list.push(weight);
        weight *= decay;
    }

    if weights <= 0.0 {
        return 0.0;
    }
    let direct = total / weights;
    if direct.is_finite() {
        return direct;
    }
    sanitize(
        recent
            .iter()
            .zip(&weight_list)
            .map(|(v, w)| v * (w / weights))
            .sum::<f64>(),
    )
}

/// Saturating benefit: 0 at 0, 1 at `saturation` and beyond
pub fn saturate(value: f64, saturation: f64) -> f64 {
    if saturation <= 0.0 {
        return 1.0;
    }
    unit(value / saturation)
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().map(sanitize).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[4.0]), 4.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);

        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[15.99, 15.99, 15.99]), 15.99);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
    }

    #[test]
    fn test_standard_deviation_population() {
        assert_eq!(standard_deviation(&[], 0.0), 0.0);
        assert_eq!(standard_deviation(&[5.0], 5.0), 0.0);

        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let sd = standard_deviation(&values, mean(&values));
        assert!((sd - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_quartiles_interpolate() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        let [q1, q2, q3] = quartiles(&sorted);
        assert!((q1 - 1.75).abs() < 1e-9);
        assert!((q2 - 2.5).abs() < 1e-9);
        assert!((q3 - 3.25).abs() < 1e-9);

        assert_eq!(quartiles(&[]), [0.0, 0.0, 0.0]);
        assert_eq!(quartiles(&[7.0]), [7.0, 7.0, 7.0]);
    }

    #[test]
    fn test_outliers_iqr_rule() {
        let values = [10.0, 11.0, 10.5, 9.5, 10.2, 95.0];
        assert_eq!(outliers(&values), vec![5]);

        // Too few values to decide
        assert!(outliers(&[1.0, 100.0, 1000.0]).is_empty());
        // Identical values have zero IQR and no outliers
        assert!(outliers(&[5.0, 5.0, 5.0, 5.0]).is_empty());
    }

    #[test]
    fn test_non_finite_inputs_never_leak() {
        let values = [f64::NAN, 1.0, f64::INFINITY, 3.0];
        assert!(mean(&values).is_finite());
        assert!(median(&values).is_finite());
        assert!(standard_deviation(&values, f64::NAN).is_finite());
        assert!(coefficient_of_variation(&values).is_finite());
        assert!(quartiles(&values).iter().all(|q| q.is_finite()));
        assert!(recency_weighted_mean(&values, 0.8, 10).is_finite());
    }

    #[test]
    fn test_extreme_finite_inputs_stay_finite() {
        let huge = [f64::MAX, f64::MAX];
        assert_eq!(median(&huge), f64::MAX);
        assert_eq!(mean(&huge), f64::MAX);
        assert_eq!(standard_deviation(&huge, mean(&huge)), 0.0);
        assert_eq!(quartiles(&huge), [f64::MAX; 3]);

        let spread = [-f64::MAX, -1.0, 1.0, f64::MAX];
        assert!(median(&spread).is_finite());
        assert!(mean(&spread).abs() < 1.0);
        let sd = standard_deviation(&spread, mean(&spread));
        assert!(sd.is_finite() && sd > 1e300);
        assert!(quartiles(&spread).iter().all(|q| q.is_finite()));
        assert!(coefficient_of_variation(&spread).is_finite());
        assert!(recency_weighted_mean(&huge, 0.8, 10).is_finite());

        let (low, high) = outlier_bounds(&spread).unwrap();
        assert!(low.is_finite() && high.is_finite());
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation(&[]), 0.0);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
        assert_eq!(coefficient_of_variation(&[15.99, 15.99, 15.99]), 0.0);
        assert!(coefficient_of_variation(&[10.0, 30.0]) > 0.4);
    }

    #[test]
    fn test_recency_weighted_mean_favors_recent() {
        let values = [10.0, 10.0, 10.0, 20.0];
        let weighted = recency_weighted_mean(&values, 0.5, 12);
        assert!(weighted > mean(&values));
        assert_eq!(recency_weighted_mean(&[], 0.8, 12), 0.0);
        // Window of one returns the newest value
        assert_eq!(recency_weighted_mean(&values, 0.8, 1), 20.0);
    }

    #[test]
    fn test_saturate() {
        assert_eq!(saturate(0.0, 20.0), 0.0);
        assert_eq!(saturate(10.0, 20.0), 0.5);
        assert_eq!(saturate(40.0, 20.0), 1.0);
    }
}

use chrono::NaiveDateTime;
use std::cmp::Ordering;

/// Computes the arithmetic mean of a slice of values. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes the population standard deviation given a pre-computed mean.
/// Returns 0.0 for empty input.
pub fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Largest value, or `None` for empty input.
pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().max_by(f64::total_cmp)
}

/// Percentage of `part` in `total`; 0.0 when `total` is zero.
pub fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

/// Rounds to two decimals, the precision every reported figure uses.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value * 100.0).round() / 100.0
}

pub fn hours_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_seconds() as f64 / 3600.0
}

pub fn minutes_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_seconds() as f64 / 60.0
}

/// Passes through finite, non-negative measurements.
pub fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

/// Descending order on a float, falling back to `tie` for equal values so
/// rankings are stable across runs.
pub fn desc_then<T: Ord>(a: f64, b: f64, tie_a: T, tie_b: T) -> Ordering {
    b.total_cmp(&a).then_with(|| tie_a.cmp(&tie_b))
}

/// Ascending counterpart of [`desc_then`].
pub fn asc_then<T: Ord>(a: f64, b: f64, tie_a: T, tie_b: T) -> Ordering {
    a.total_cmp(&b).then_with(|| tie_a.cmp(&tie_b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(pct(50, 100), 50.0);
        assert_eq!(pct(1, 4), 25.0);
    }

    #[test]
    fn test_mean_and_stddev() {
        assert_eq!(mean(&[]), 0.0);
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values);
        assert_eq!(m, 5.0);
        assert_eq!(stddev(&values, m), 2.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(8.000000000000002), 8.0);
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(f64::NAN), 0.0);
        assert_eq!(round2(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_non_negative_filters_bad_values() {
        assert_eq!(non_negative(Some(3.5)), Some(3.5));
        assert_eq!(non_negative(Some(-1.0)), None);
        assert_eq!(non_negative(Some(f64::NAN)), None);
        assert_eq!(non_negative(None), None);
    }

    #[test]
    fn test_max() {
        assert_eq!(max(&[]), None);
        assert_eq!(max(&[1.0, 7.5, 3.0]), Some(7.5));
    }
}

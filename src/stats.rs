//! Median and MAD based robust statistics.

use ndarray::{ArrayView2, Axis};

use crate::error::{SortError, SortResult};

/// Scale that turns the raw MAD into a consistent estimate of the standard
/// deviation under Gaussian noise.
pub const MAD_SCALE: f64 = 1.4826;

/// Median of `values`; even lengths average the two middle values.
///
/// Returns `0.0` for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

/// Median and scaled median absolute deviation in one pass over the data.
pub fn median_mad(values: &[f64]) -> (f64, f64) {
    let center = median(values);
    let deviations = values
        .iter()
        .map(|value| (value - center).abs())
        .collect::<Vec<f64>>();
    (center, MAD_SCALE * median(&deviations))
}

/// Scaled median absolute deviation.
pub fn mad(values: &[f64]) -> f64 {
    median_mad(values).1
}

/// Robust z-score: `(x - median) / mad`.
///
/// Fails with [`SortError::DegenerateInput`] when the MAD is zero, which
/// happens for constant input.
pub fn robust_z(values: &[f64], context: &str) -> SortResult<Vec<f64>> {
    let (center, spread) = median_mad(values);
    if !(spread > 0.0) || !spread.is_finite() {
        return Err(SortError::DegenerateInput {
            context: context.to_string(),
        });
    }
    Ok(values.iter().map(|value| (value - center) / spread).collect())
}

/// Pointwise median and MAD of every column of an events matrix.
pub fn column_median_mad(events: ArrayView2<'_, f64>) -> (Vec<f64>, Vec<f64>) {
    let mut medians = Vec::with_capacity(events.ncols());
    let mut mads = Vec::with_capacity(events.ncols());
    for column in events.axis_iter(Axis(1)) {
        let values = column.to_vec();
        let (center, spread) = median_mad(&values);
        medians.push(center);
        mads.push(spread);
    }
    (medians, mads)
}

/// Pointwise median of every column of an events matrix.
pub fn column_median(events: ArrayView2<'_, f64>) -> Vec<f64> {
    events
        .axis_iter(Axis(1))
        .map(|column| median(&column.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn median_handles_odd_and_even_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn mad_of_constant_vector_is_zero() {
        assert_eq!(mad(&[7.5; 32]), 0.0);
    }

    #[test]
    fn mad_is_scaled_median_absolute_deviation() {
        // |x - 3| = [2, 1, 0, 1, 2] -> median 1
        let spread = mad(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((spread - MAD_SCALE).abs() < 1e-12);
    }

    #[test]
    fn robust_z_rejects_constant_input() {
        let err = robust_z(&[1.0; 10], "channel 0").unwrap_err();
        assert!(matches!(err, SortError::DegenerateInput { .. }));
    }

    #[test]
    fn robust_z_centers_and_scales() {
        let z = robust_z(&[1.0, 2.0, 3.0, 4.0, 5.0], "test").unwrap();
        assert!(z[2].abs() < 1e-12);
        assert!((z[4] - 2.0 / MAD_SCALE).abs() < 1e-12);
    }

    #[test]
    fn column_statistics_follow_columns() {
        let events = array![[1.0, -1.0], [2.0, -2.0], [3.0, -6.0]];
        let (medians, mads) = column_median_mad(events.view());
        assert_eq!(medians, vec![2.0, -2.0]);
        assert!((mads[0] - MAD_SCALE).abs() < 1e-12);
        assert!((mads[1] - MAD_SCALE).abs() < 1e-12);
        assert_eq!(column_median(events.view()), vec![2.0, -2.0]);
    }
}

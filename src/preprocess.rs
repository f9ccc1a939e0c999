//! Per-channel normalization, smoothing and the detection signal.

use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::{SortError, SortResult};
use crate::series::MultichannelSeries;
use crate::stats::robust_z;

/// Central-difference kernel used for first and second derivatives.
pub const DERIVATIVE_KERNEL: [f64; 3] = [0.5, 0.0, -0.5];

/// Which channels feed the peak detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionMode {
    /// Sum of every filtered channel.
    Aggregate,
    /// A single reference channel.
    Channel(usize),
}

/// Robust z-score of one channel.
pub fn normalize(channel: &[f64]) -> SortResult<Vec<f64>> {
    robust_z(channel, "channel")
}

/// Normalize every channel of a series by its own median and MAD.
pub fn normalize_series(series: &MultichannelSeries) -> SortResult<MultichannelSeries> {
    let rows = map_channels(series.view(), |idx, channel| {
        robust_z(channel, &format!("channel {idx}"))
    })?;
    Ok(series.derived(stack_rows(rows, series.sample_count())?))
}

/// Linear convolution returning a same-length output with zero-padded edges.
///
/// Matches the centered "same" mode: output `i` is full-convolution sample
/// `i + (kernel.len() - 1) / 2`.
pub fn convolve_same(values: &[f64], kernel: &[f64]) -> Vec<f64> {
    if values.is_empty() || kernel.is_empty() {
        return values.to_vec();
    }
    let len = values.len() as isize;
    let shift = ((kernel.len() - 1) / 2) as isize;
    (0..len)
        .map(|i| {
            let full = i + shift;
            kernel
                .iter()
                .enumerate()
                .filter_map(|(j, weight)| {
                    let src = full - j as isize;
                    (0..len)
                        .contains(&src)
                        .then(|| weight * values[src as usize])
                })
                .sum()
        })
        .collect()
}

/// Averaging kernel of odd `width`.
pub fn boxcar(width: usize) -> SortResult<Vec<f64>> {
    if width == 0 || width % 2 == 0 {
        return Err(SortError::invalid_config(format!(
            "boxcar width must be odd and positive, got {width}"
        )));
    }
    Ok(vec![1.0 / width as f64; width])
}

/// Boxcar smoothing with same-mode convolution.
pub fn smooth(values: &[f64], width: usize) -> SortResult<Vec<f64>> {
    Ok(convolve_same(values, &boxcar(width)?))
}

/// Central-difference first derivative.
pub fn derivative(values: &[f64]) -> Vec<f64> {
    convolve_same(values, &DERIVATIVE_KERNEL)
}

/// First and second finite-difference derivatives of every channel.
pub fn derivative_series(data: ArrayView2<'_, f64>) -> SortResult<(Array2<f64>, Array2<f64>)> {
    let samples = data.ncols();
    let pairs = channel_rows(data)
        .par_iter()
        .map(|channel| {
            let first = derivative(channel);
            let second = derivative(&first);
            (first, second)
        })
        .collect::<Vec<_>>();
    let (first, second): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
    Ok((stack_rows(first, samples)?, stack_rows(second, samples)?))
}

/// Build the 1-D signal handed to the peak detector.
///
/// Each channel is boxcar-smoothed, robust-z-scored, and every sample below
/// `threshold` is forced to zero. The surviving channels are then summed or a
/// single reference channel is kept.
pub fn detection_signal(
    data: ArrayView2<'_, f64>,
    smoothing_width: usize,
    threshold: f64,
    mode: DetectionMode,
) -> SortResult<Vec<f64>> {
    let kernel = boxcar(smoothing_width)?;
    let filter = |idx: usize, channel: &[f64]| -> SortResult<Vec<f64>> {
        let smoothed = convolve_same(channel, &kernel);
        let mut scored = robust_z(&smoothed, &format!("filtered channel {idx}"))?;
        for value in &mut scored {
            if *value < threshold {
                *value = 0.0;
            }
        }
        Ok(scored)
    };
    match mode {
        DetectionMode::Channel(idx) => {
            if idx >= data.nrows() {
                return Err(SortError::invalid_config(format!(
                    "reference channel {idx} out of range for {} channels",
                    data.nrows()
                )));
            }
            filter(idx, &data.index_axis(Axis(0), idx).to_vec())
        }
        DetectionMode::Aggregate => {
            let rows = map_channels(data, filter)?;
            let mut total = vec![0.0; data.ncols()];
            for row in rows {
                for (acc, value) in total.iter_mut().zip(row) {
                    *acc += value;
                }
            }
            Ok(total)
        }
    }
}

fn map_channels<F>(data: ArrayView2<'_, f64>, op: F) -> SortResult<Vec<Vec<f64>>>
where
    F: Fn(usize, &[f64]) -> SortResult<Vec<f64>> + Sync,
{
    channel_rows(data)
        .par_iter()
        .enumerate()
        .map(|(idx, channel)| op(idx, channel))
        .collect()
}

fn channel_rows(data: ArrayView2<'_, f64>) -> Vec<Vec<f64>> {
    data.axis_iter(Axis(0)).map(|channel| channel.to_vec()).collect()
}

fn stack_rows(rows: Vec<Vec<f64>>, samples: usize) -> SortResult<Array2<f64>> {
    let count = rows.len();
    let flat = rows.into_iter().flatten().collect::<Vec<f64>>();
    Array2::from_shape_vec((count, samples), flat)
        .map_err(|err| SortError::invalid_series(format!("shape error: {err}")))
}

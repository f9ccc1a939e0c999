use ndarray::{Array2, ArrayView2};

use crate::error::{SortError, SortResult};

/// Multichannel recording held as a `channels x samples` matrix.
///
/// The matrix is built once and never mutated; later rounds produce new
/// series instead.
#[derive(Clone, Debug, PartialEq)]
pub struct MultichannelSeries {
    data: Array2<f64>,
    sampling_rate: f64,
}

impl MultichannelSeries {
    /// Build a series from one sample vector per channel.
    ///
    /// Rejects empty input, channels of different lengths and non-finite samples.
    pub fn from_channels(channels: Vec<Vec<f64>>, sampling_rate: f64) -> SortResult<Self> {
        let Some(first) = channels.first() else {
            return Err(SortError::invalid_series("no channels"));
        };
        let samples = first.len();
        if let Some((idx, channel)) = channels
            .iter()
            .enumerate()
            .find(|(_, channel)| channel.len() != samples)
        {
            return Err(SortError::invalid_series(format!(
                "channel {idx} has {} samples, expected {samples}",
                channel.len()
            )));
        }
        let count = channels.len();
        let flat = channels.into_iter().flatten().collect::<Vec<f64>>();
        let data = Array2::from_shape_vec((count, samples), flat)
            .map_err(|err| SortError::invalid_series(format!("shape error: {err}")))?;
        Self::from_array(data, sampling_rate)
    }

    /// Wrap an existing `channels x samples` matrix.
    pub fn from_array(data: Array2<f64>, sampling_rate: f64) -> SortResult<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(SortError::invalid_series(format!(
                "empty series ({} channels x {} samples)",
                data.nrows(),
                data.ncols()
            )));
        }
        if !(sampling_rate > 0.0) || !sampling_rate.is_finite() {
            return Err(SortError::invalid_series(format!(
                "sampling rate must be positive, got {sampling_rate}"
            )));
        }
        if let Some(((channel, sample), value)) =
            data.indexed_iter().find(|(_, value)| !value.is_finite())
        {
            return Err(SortError::invalid_series(format!(
                "non-finite sample {value} at channel {channel}, index {sample}"
            )));
        }
        Ok(Self {
            data,
            sampling_rate,
        })
    }

    /// Replace the samples while keeping the sampling rate.
    ///
    /// Used for intermediate series derived from an already validated one.
    pub(crate) fn derived(&self, data: Array2<f64>) -> Self {
        debug_assert_eq!(data.dim(), self.data.dim());
        Self {
            data,
            sampling_rate: self.sampling_rate,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.data.nrows()
    }

    pub fn sample_count(&self) -> usize {
        self.data.ncols()
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    /// Duration of the recording in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.sample_count() as f64 / self.sampling_rate
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Sum of squared samples across all channels.
    pub fn energy(&self) -> f64 {
        self.data.iter().map(|value| value * value).sum()
    }
}

/// Decode a raw little-endian `f64` sample blob.
pub fn decode_f64_le(blob: &[u8]) -> SortResult<Vec<f64>> {
    if blob.len() % 8 != 0 {
        return Err(SortError::invalid_series(format!(
            "sample blob of {} bytes is not a multiple of 8",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            f64::from_le_bytes(bytes)
        })
        .collect())
}

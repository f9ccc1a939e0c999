//! Fixed-length event cuts.
//!
//! An event is the channel-major concatenation of one window per channel:
//! `[ch0[pos-before..=pos+after], ch1[...], ...]`. Every cut in a run shares
//! the same [`EventWindow`], so every event vector has the same length.

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Sample offsets `[-before, after]` around an event position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWindow {
    pub before: usize,
    pub after: usize,
}

impl EventWindow {
    pub fn new(before: usize, after: usize) -> Self {
        Self { before, after }
    }

    /// Samples per channel in one cut.
    pub fn cut_len(&self) -> usize {
        self.before + self.after + 1
    }

    /// Length of a full event vector for `channels` channels.
    pub fn feature_len(&self, channels: usize) -> usize {
        channels * self.cut_len()
    }

    /// Offsets relative to the event position, in cut order.
    pub fn offsets(&self) -> impl Iterator<Item = i64> + '_ {
        -(self.before as i64)..=(self.after as i64)
    }

    /// Whether `other` lies entirely inside this window.
    pub fn contains(&self, other: &EventWindow) -> bool {
        other.before <= self.before && other.after <= self.after
    }

    /// Positions within one channel's cut that also belong to `inner`.
    ///
    /// Returns `None` when `inner` is not contained in this window.
    pub fn inner_range(&self, inner: &EventWindow) -> Option<std::ops::Range<usize>> {
        if !self.contains(inner) {
            return None;
        }
        let start = self.before - inner.before;
        Some(start..start + inner.cut_len())
    }
}

/// Cut one event at `position`.
///
/// Offsets that fall outside `[0, samples)` stay zero, so the result always
/// has `window.feature_len(channels)` entries whatever `position` is.
pub fn cut_event(data: ArrayView2<'_, f64>, position: i64, window: EventWindow) -> Array1<f64> {
    let (channels, samples) = data.dim();
    let cut_len = window.cut_len();
    let mut cut = Array1::zeros(window.feature_len(channels));
    for (slot, offset) in window.offsets().enumerate() {
        let index = position + offset;
        if index < 0 || index >= samples as i64 {
            continue;
        }
        let index = index as usize;
        for channel in 0..channels {
            cut[channel * cut_len + slot] = data[(channel, index)];
        }
    }
    cut
}

/// Cut one event per position, one row per event.
pub fn make_events(data: ArrayView2<'_, f64>, positions: &[i64], window: EventWindow) -> Array2<f64> {
    let mut events = Array2::zeros((positions.len(), window.feature_len(data.nrows())));
    for (mut row, &position) in events.rows_mut().into_iter().zip(positions) {
        row.assign(&cut_event(data, position, window));
    }
    events
}

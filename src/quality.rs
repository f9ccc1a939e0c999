//! Tolerance-band outlier filter for extracted events.

use ndarray::{ArrayView2, Axis};
use tracing::debug;

use crate::stats::column_median_mad;

/// Default tolerance factor when selecting events for clustering.
pub const CLUSTERING_FACTOR: f64 = 8.0;
/// Stricter factor for shape checks on already sorted events.
pub const STRICT_FACTOR: f64 = 3.0;

/// Flag events that stay inside the pointwise `median ± factor * MAD` band.
///
/// Only the trough region is checked: columns whose median is positive are
/// ignored, as are columns whose MAD is zero. A single sample outside the
/// band rejects the whole event.
pub fn good_events(events: ArrayView2<'_, f64>, factor: f64) -> Vec<bool> {
    if events.nrows() == 0 {
        return Vec::new();
    }
    let (medians, mads) = column_median_mad(events);
    let checked = medians
        .iter()
        .zip(&mads)
        .enumerate()
        .filter(|(_, (median, mad))| **median <= 0.0 && **mad > 0.0)
        .map(|(column, (median, mad))| (column, *median, *mad))
        .collect::<Vec<_>>();
    let flags = events
        .axis_iter(Axis(0))
        .map(|event| {
            checked
                .iter()
                .all(|&(column, median, mad)| ((event[column] - median) / mad).abs() < factor)
        })
        .collect::<Vec<bool>>();
    debug!(
        "quality filter: {} of {} events good over {} checked columns (factor {factor})",
        flags.iter().filter(|good| **good).count(),
        flags.len(),
        checked.len()
    );
    flags
}

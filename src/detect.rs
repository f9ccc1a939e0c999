//! Peak picking on the thresholded detection signal.

use crate::preprocess::derivative;

/// Parameters for [`detect_peaks`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakParams {
    /// Minimum distance, in samples, between two retained peaks.
    pub minimal_distance: usize,
    /// Derivative magnitudes below this are treated as exactly zero.
    pub derivative_floor: f64,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            minimal_distance: 15,
            derivative_floor: 1.0e-3,
        }
    }
}

/// Find candidate event positions in a thresholded 1-D signal.
///
/// Local maxima are the places where the sign of the central-difference
/// derivative steps downward. Candidates are then thinned left to right: a
/// candidate closer than `minimal_distance` to the previously retained one is
/// dropped, and the trailing candidate is always dropped.
pub fn detect_peaks(signal: &[f64], params: PeakParams) -> Vec<usize> {
    let candidates = sign_change_candidates(signal, params.derivative_floor);
    suppress_close_peaks(&candidates, params.minimal_distance)
}

pub(crate) fn sign_change_candidates(signal: &[f64], derivative_floor: f64) -> Vec<usize> {
    let signs = derivative(signal)
        .into_iter()
        .map(|value| {
            if value == 0.0 || value.abs() < derivative_floor {
                0.0
            } else {
                value.signum()
            }
        })
        .collect::<Vec<f64>>();
    signs
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1] - pair[0] < 0.0)
        .map(|(idx, _)| idx)
        .collect()
}

pub(crate) fn suppress_close_peaks(candidates: &[usize], minimal_distance: usize) -> Vec<usize> {
    let Some((_, body)) = candidates.split_last() else {
        return Vec::new();
    };
    let mut kept: Vec<usize> = Vec::with_capacity(body.len());
    for &position in body {
        match kept.last() {
            Some(&previous) if position - previous < minimal_distance => continue,
            _ => kept.push(position),
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_signal(len: usize, peaks: &[(usize, f64)]) -> Vec<f64> {
        let mut signal = vec![0.0; len];
        for &(idx, value) in peaks {
            signal[idx] = value;
        }
        signal
    }

    #[test]
    fn close_peaks_keep_only_the_earlier() {
        let signal = delta_signal(200, &[(100, 9.0), (105, 12.0)]);
        let peaks = detect_peaks(&signal, PeakParams::default());
        assert_eq!(peaks.len(), 1);
        assert!(peaks[0] <= 100 && peaks[0] >= 99);
    }

    #[test]
    fn distant_peaks_are_all_reported_except_trailing() {
        let signal = delta_signal(300, &[(50, 5.0), (100, 5.0), (150, 5.0), (250, 5.0)]);
        let peaks = detect_peaks(&signal, PeakParams::default());
        assert_eq!(peaks, vec![49, 99, 149, 249]);
    }

    #[test]
    fn suppression_is_relative_to_retained_peak() {
        // 0 keeps, 10 drops (<15 from 0), 20 keeps (20 from 0), 30 trailing.
        assert_eq!(suppress_close_peaks(&[0, 10, 20, 30], 15), vec![0, 20]);
    }

    #[test]
    fn trailing_candidate_is_dropped() {
        assert_eq!(suppress_close_peaks(&[5], 15), Vec::<usize>::new());
        assert_eq!(suppress_close_peaks(&[], 15), Vec::<usize>::new());
    }

    #[test]
    fn zero_floor_still_treats_flat_stretches_as_flat() {
        let mut signal = delta_signal(100, &[(70, 5.0)]);
        for value in &mut signal[30..=34] {
            *value = 5.0;
        }
        let strict = PeakParams {
            derivative_floor: 0.0,
            ..PeakParams::default()
        };
        let peaks = detect_peaks(&signal, strict);
        assert!(peaks.contains(&69), "{peaks:?}");
        assert_eq!(peaks, detect_peaks(&signal, PeakParams::default()));
    }

    #[test]
    fn flat_signal_has_no_peaks() {
        assert!(detect_peaks(&[0.0; 64], PeakParams::default()).is_empty());
    }

    #[test]
    fn broad_peak_yields_a_single_position() {
        let signal = (0..80)
            .map(|i| {
                let t = i as f64 - 40.0;
                (10.0 - t.abs()).max(0.0)
            })
            .chain(std::iter::repeat(0.0).take(20))
            .chain([0.0, 6.0, 3.0, 0.0, 0.0])
            .collect::<Vec<f64>>();
        let peaks = detect_peaks(&signal, PeakParams::default());
        assert_eq!(peaks.len(), 1);
        assert!((39..=40).contains(&peaks[0]));
    }
}

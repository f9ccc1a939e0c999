//! Residual refinement rounds (greedy matching pursuit).
//!
//! Every round classifies a set of detections, reconstructs the matched
//! spikes from their templates and subtracts the reconstruction. Later
//! rounds detect on what is left, which uncovers spikes hidden under
//! overlapping ones.

use ndarray::Array2;
use tracing::{info, warn};

use crate::align::{ClassificationResult, classify_all};
use crate::detect::{PeakParams, detect_peaks};
use crate::error::{SortError, SortResult};
use crate::events::EventWindow;
use crate::preprocess::{DetectionMode, detection_signal};
use crate::series::MultichannelSeries;
use crate::templates::TemplateLibrary;

/// Settings for [`run_rounds`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefineSettings {
    pub rounds: usize,
    /// Classification window; templates are restricted to it.
    pub window: EventWindow,
    /// Boxcar width used when re-detecting on a residual.
    pub smoothing_width: usize,
    pub threshold: f64,
    pub reference_channel: usize,
    pub peaks: PeakParams,
}

/// Outcome of one refinement round.
#[derive(Clone, Debug)]
pub struct Round {
    pub index: usize,
    /// Detections fed to the classifier, before alignment.
    pub positions: Vec<i64>,
    pub results: Vec<ClassificationResult>,
    /// Round input minus the reconstruction of matched events.
    pub residual: MultichannelSeries,
}

impl Round {
    pub fn matched(&self) -> usize {
        self.results.iter().filter(|r| r.label.is_matched()).count()
    }

    pub fn unmatched(&self) -> usize {
        self.results.len() - self.matched()
    }
}

/// Sum the template predictions of every matched result into a
/// `channels x samples` buffer.
///
/// Predictions span the full template window around the aligned position.
/// Samples falling outside the recording are dropped and overlapping
/// predictions add.
pub fn reconstruct(
    results: &[ClassificationResult],
    library: &TemplateLibrary,
    channels: usize,
    samples: usize,
) -> SortResult<Array2<f64>> {
    let mut buffer = Array2::<f64>::zeros((channels, samples));
    for result in results {
        let Some(cluster) = result.label.cluster() else {
            continue;
        };
        let template = library.get(cluster).ok_or_else(|| {
            SortError::invalid_config(format!(
                "result refers to cluster {cluster}, library holds {}",
                library.len()
            ))
        })?;
        if template.channels() != channels {
            return Err(SortError::invalid_config(format!(
                "template {cluster} has {} channels, series has {channels}",
                template.channels()
            )));
        }
        let window = template.window();
        let cut_len = window.cut_len();
        let prediction = template.predict(result.jitter);
        for (slot, offset) in window.offsets().enumerate() {
            let index = result.position + offset;
            if index < 0 || index >= samples as i64 {
                continue;
            }
            for channel in 0..channels {
                buffer[(channel, index as usize)] += prediction[channel * cut_len + slot];
            }
        }
    }
    Ok(buffer)
}

/// Run `settings.rounds` classify / reconstruct / subtract rounds.
///
/// Round 0 classifies `initial_positions` on `normalized`. Each later round
/// filters the previous residual on the reference channel, re-detects and
/// classifies against the same library.
pub fn run_rounds(
    normalized: &MultichannelSeries,
    library: &TemplateLibrary,
    initial_positions: &[i64],
    settings: RefineSettings,
) -> SortResult<Vec<Round>> {
    let restricted = library.restrict(settings.window)?;
    let channels = normalized.channel_count();
    let samples = normalized.sample_count();
    let mut rounds: Vec<Round> = Vec::with_capacity(settings.rounds);
    let mut input = normalized.clone();
    for index in 0..settings.rounds {
        let positions = if index == 0 {
            initial_positions.to_vec()
        } else {
            redetect(&input, settings)?
        };
        let results = classify_all(input.view(), &positions, settings.window, &restricted);
        let prediction = reconstruct(&results, library, channels, samples)?;
        let residual = input.derived(&input.view() - &prediction);
        let round = Round {
            index,
            positions,
            results,
            residual,
        };
        info!(
            "round {index}: {} detections, {} matched, {} unmatched, residual energy {:.1}",
            round.positions.len(),
            round.matched(),
            round.unmatched(),
            round.residual.energy()
        );
        input = round.residual.clone();
        rounds.push(round);
    }
    Ok(rounds)
}

/// Detections on a residual from the reference channel.
///
/// A residual with no spread left has nothing to detect.
fn redetect(residual: &MultichannelSeries, settings: RefineSettings) -> SortResult<Vec<i64>> {
    let signal = match detection_signal(
        residual.view(),
        settings.smoothing_width,
        settings.threshold,
        DetectionMode::Channel(settings.reference_channel),
    ) {
        Ok(signal) => signal,
        Err(SortError::DegenerateInput { context }) => {
            warn!("{context} is flat, no detections this round");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };
    Ok(detect_peaks(&signal, settings.peaks)
        .into_iter()
        .map(|position| position as i64)
        .collect())
}

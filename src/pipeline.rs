//! End-to-end sorting of one recording.

use ndarray::Axis;
use tracing::{info, info_span};

use crate::cluster::{Clustering, cluster_events};
use crate::config::PipelineConfig;
use crate::detect::detect_peaks;
use crate::error::{SortError, SortResult};
use crate::events::make_events;
use crate::preprocess::{DetectionMode, detection_signal, normalize_series};
use crate::quality::good_events;
use crate::refine::{Round, run_rounds};
use crate::series::MultichannelSeries;
use crate::templates::TemplateLibrary;

/// Everything produced by [`SpikeSorter::run`].
#[derive(Clone, Debug)]
pub struct SortOutput {
    /// Input after per-channel robust normalization.
    pub normalized: MultichannelSeries,
    /// Initial aggregate detections over the whole recording.
    pub detections: Vec<i64>,
    /// Template-portion detections that passed the quality filter.
    pub good_events: Vec<i64>,
    pub clustering: Clustering,
    pub library: TemplateLibrary,
    pub rounds: Vec<Round>,
}

impl SortOutput {
    /// Residual left by the last round, or the normalized input when no
    /// round ran.
    pub fn final_residual(&self) -> &MultichannelSeries {
        self.rounds
            .last()
            .map(|round| &round.residual)
            .unwrap_or(&self.normalized)
    }
}

/// Runs the detection, clustering and template matching stages.
#[derive(Clone, Debug)]
pub struct SpikeSorter {
    config: PipelineConfig,
}

impl SpikeSorter {
    pub fn new(config: PipelineConfig) -> SortResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, raw: &MultichannelSeries) -> SortResult<SortOutput> {
        let span = info_span!(
            "sort",
            channels = raw.channel_count(),
            samples = raw.sample_count()
        );
        let _guard = span.enter();
        let config = &self.config;
        if config.refinement.reference_channel >= raw.channel_count() {
            return Err(SortError::invalid_config(format!(
                "reference channel {} out of range for {} channels",
                config.refinement.reference_channel,
                raw.channel_count()
            )));
        }
        info!(
            "sorting {:.2} s of {} channels",
            raw.duration_seconds(),
            raw.channel_count()
        );

        let normalized = normalize_series(raw)?;
        let signal = detection_signal(
            normalized.view(),
            config.detection.smoothing_width,
            config.detection.threshold,
            DetectionMode::Aggregate,
        )?;
        let detections = detect_peaks(&signal, config.peak_params())
            .into_iter()
            .map(|position| position as i64)
            .collect::<Vec<i64>>();
        info!("{} detections", detections.len());

        let limit = normalized.sample_count() as f64 * config.templates.fraction;
        let portion = detections
            .iter()
            .copied()
            .filter(|position| *position as f64 <= limit)
            .collect::<Vec<i64>>();
        let events = make_events(normalized.view(), &portion, config.event_window());
        let flags = good_events(events.view(), config.quality.factor);
        let (good_rows, good_positions) = select_good(&portion, &flags);
        info!(
            "{} of {} template-portion events kept for clustering",
            good_positions.len(),
            portion.len()
        );
        if good_positions.len() < 2 {
            return Err(SortError::NotEnoughEvents {
                stage: "clustering",
                needed: 2,
                found: good_positions.len(),
            });
        }
        let good = events.select(Axis(0), &good_rows);
        let clustering = cluster_events(good.view(), config.cluster_settings())?;

        let library = TemplateLibrary::build(
            normalized.view(),
            &good_positions,
            &clustering,
            config.template_window(),
        )?;
        let rounds = run_rounds(&normalized, &library, &detections, config.refine_settings())?;

        Ok(SortOutput {
            normalized,
            detections,
            good_events: good_positions,
            clustering,
            library,
            rounds,
        })
    }
}

fn select_good(positions: &[i64], flags: &[bool]) -> (Vec<usize>, Vec<i64>) {
    positions
        .iter()
        .zip(flags)
        .enumerate()
        .filter(|(_, (_, good))| **good)
        .map(|(row, (position, _))| (row, *position))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_good_keeps_rows_and_positions_in_step() {
        let (rows, positions) = select_good(&[10, 40, 90, 130], &[true, false, true, false]);
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(positions, vec![10, 90]);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = PipelineConfig::default();
        config.refinement.smoothing_width = 2;
        assert!(SpikeSorter::new(config).is_err());
    }

    #[test]
    fn out_of_range_reference_channel_fails_before_work() {
        let mut config = PipelineConfig::default();
        config.refinement.reference_channel = 3;
        let sorter = SpikeSorter::new(config).unwrap();
        let raw = MultichannelSeries::from_channels(vec![vec![0.0, 1.0, -1.0, 2.0]], 1.0e4).unwrap();
        assert!(matches!(
            sorter.run(&raw),
            Err(SortError::InvalidConfig { .. })
        ));
    }
}

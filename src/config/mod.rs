//! Pipeline configuration loaded from TOML.
//!
//! Every key is optional; missing keys take the defaults in `defaults.rs`.
//!
//! ```toml
//! sampling_rate = 15000.0
//!
//! [detection]
//! threshold = 4.0
//! smoothing_width = 5
//!
//! [refinement]
//! rounds = 3
//! ```

mod defaults;
mod load;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cluster::{ClusterSettings, KMeansSettings};
use crate::detect::PeakParams;
use crate::error::{SortError, SortResult};
use crate::events::EventWindow;
use crate::refine::RefineSettings;

use defaults::*;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// The file parsed but its values cannot drive the pipeline.
    #[error("Rejected config at {path}: {source}")]
    Invalid { path: PathBuf, source: SortError },
}

/// Full set of pipeline parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Samples per second, used for durations in logs and reports.
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    #[serde(default)]
    pub detection: DetectionSettings,
    #[serde(default)]
    pub events: EventSettings,
    #[serde(default)]
    pub quality: QualitySettings,
    #[serde(default)]
    pub clustering: ClusteringSettings,
    #[serde(default)]
    pub templates: TemplateSettings,
    #[serde(default)]
    pub refinement: RefinementSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sampling_rate: default_sampling_rate(),
            detection: DetectionSettings::default(),
            events: EventSettings::default(),
            quality: QualitySettings::default(),
            clustering: ClusteringSettings::default(),
            templates: TemplateSettings::default(),
            refinement: RefinementSettings::default(),
        }
    }
}

/// Initial aggregate detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Robust z-score below which the filtered signal is zeroed.
    #[serde(default = "default_detection_threshold")]
    pub threshold: f64,
    /// Boxcar width; must be odd.
    #[serde(default = "default_detection_smoothing_width")]
    pub smoothing_width: usize,
    #[serde(default = "default_minimal_distance")]
    pub minimal_distance: usize,
    #[serde(default = "default_derivative_floor")]
    pub derivative_floor: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            threshold: default_detection_threshold(),
            smoothing_width: default_detection_smoothing_width(),
            minimal_distance: default_minimal_distance(),
            derivative_floor: default_derivative_floor(),
        }
    }
}

/// Classification window around each detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default = "default_event_before")]
    pub before: usize,
    #[serde(default = "default_event_after")]
    pub after: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            before: default_event_before(),
            after: default_event_after(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySettings {
    /// Tolerance band width in MADs.
    #[serde(default = "default_quality_factor")]
    pub factor: f64,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            factor: default_quality_factor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringSettings {
    /// Principal components kept before k-means.
    #[serde(default = "default_components")]
    pub components: usize,
    #[serde(default = "default_clusters")]
    pub clusters: usize,
    /// K-means restarts; the lowest-inertia run wins.
    #[serde(default = "default_restarts")]
    pub restarts: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            components: default_components(),
            clusters: default_clusters(),
            restarts: default_restarts(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Template construction window and the share of the recording it uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSettings {
    #[serde(default = "default_template_before")]
    pub before: usize,
    #[serde(default = "default_template_after")]
    pub after: usize,
    /// Only detections in the first `fraction` of the samples build templates.
    #[serde(default = "default_template_fraction")]
    pub fraction: f64,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            before: default_template_before(),
            after: default_template_after(),
            fraction: default_template_fraction(),
        }
    }
}

/// Detection on residuals in rounds after the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementSettings {
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default = "default_refinement_smoothing_width")]
    pub smoothing_width: usize,
    #[serde(default = "default_refinement_threshold")]
    pub threshold: f64,
    #[serde(default = "default_reference_channel")]
    pub reference_channel: usize,
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            smoothing_width: default_refinement_smoothing_width(),
            threshold: default_refinement_threshold(),
            reference_channel: default_reference_channel(),
        }
    }
}

impl PipelineConfig {
    /// Reject values no stage can run with.
    pub fn validate(&self) -> SortResult<()> {
        if !(self.sampling_rate > 0.0) || !self.sampling_rate.is_finite() {
            return Err(SortError::invalid_config(format!(
                "sampling_rate must be positive, got {}",
                self.sampling_rate
            )));
        }
        check_width("detection.smoothing_width", self.detection.smoothing_width)?;
        check_width("refinement.smoothing_width", self.refinement.smoothing_width)?;
        check_finite("detection.threshold", self.detection.threshold)?;
        check_finite("refinement.threshold", self.refinement.threshold)?;
        if !(self.detection.derivative_floor >= 0.0) {
            return Err(SortError::invalid_config(
                "detection.derivative_floor must be non-negative",
            ));
        }
        if !(self.quality.factor > 0.0) {
            return Err(SortError::invalid_config(format!(
                "quality.factor must be positive, got {}",
                self.quality.factor
            )));
        }
        if self.clustering.components == 0 || self.clustering.clusters == 0 {
            return Err(SortError::invalid_config(
                "clustering needs at least one component and one cluster",
            ));
        }
        if !self.template_window().contains(&self.event_window()) {
            return Err(SortError::invalid_config(format!(
                "template window [-{}, {}] must cover event window [-{}, {}]",
                self.templates.before, self.templates.after, self.events.before, self.events.after
            )));
        }
        let fraction = self.templates.fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(SortError::invalid_config(format!(
                "templates.fraction must be in (0, 1], got {fraction}"
            )));
        }
        Ok(())
    }

    pub fn event_window(&self) -> EventWindow {
        EventWindow::new(self.events.before, self.events.after)
    }

    pub fn template_window(&self) -> EventWindow {
        EventWindow::new(self.templates.before, self.templates.after)
    }

    pub fn peak_params(&self) -> PeakParams {
        PeakParams {
            minimal_distance: self.detection.minimal_distance,
            derivative_floor: self.detection.derivative_floor,
        }
    }

    pub fn cluster_settings(&self) -> ClusterSettings {
        ClusterSettings {
            components: self.clustering.components,
            kmeans: KMeansSettings {
                clusters: self.clustering.clusters,
                restarts: self.clustering.restarts,
                max_iterations: self.clustering.max_iterations,
                tolerance: self.clustering.tolerance,
            },
        }
    }

    pub fn refine_settings(&self) -> RefineSettings {
        RefineSettings {
            rounds: self.refinement.rounds,
            window: self.event_window(),
            smoothing_width: self.refinement.smoothing_width,
            threshold: self.refinement.threshold,
            reference_channel: self.refinement.reference_channel,
            peaks: self.peak_params(),
        }
    }
}

fn check_width(name: &str, width: usize) -> SortResult<()> {
    if width == 0 || width % 2 == 0 {
        return Err(SortError::invalid_config(format!(
            "{name} must be odd and positive, got {width}"
        )));
    }
    Ok(())
}

fn check_finite(name: &str, value: f64) -> SortResult<()> {
    if !value.is_finite() {
        return Err(SortError::invalid_config(format!(
            "{name} must be finite, got {value}"
        )));
    }
    Ok(())
}

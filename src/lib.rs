//! Offline template-matching spike sorter for multichannel recordings.
//!
//! The pipeline normalizes each channel, detects events on a thresholded
//! aggregate signal, clusters clean events from the start of the recording
//! into waveform templates, then classifies every event against those
//! templates with sub-sample alignment. Matched spikes are subtracted and
//! detection is repeated on the residual for a fixed number of rounds.
//!
//! [`SpikeSorter`] runs every stage; the stage modules are public for callers
//! that need a single step.

/// Template matching and jitter estimation.
pub mod align;
/// PCA reduction and k-means clustering.
pub mod cluster;
/// TOML pipeline configuration.
pub mod config;
/// Peak detection on the detection signal.
pub mod detect;
/// Error type shared by every stage.
pub mod error;
/// Fixed-length event cuts.
pub mod events;
/// Tracing subscriber setup.
pub mod logging;
/// The end-to-end sorter.
pub mod pipeline;
/// Normalization, smoothing and derivatives.
pub mod preprocess;
/// Outlier screening before clustering.
pub mod quality;
/// Residual refinement rounds.
pub mod refine;
/// JSON run summaries.
pub mod report;
/// Validated multichannel input.
pub mod series;
/// Robust location and scale estimates.
pub mod stats;
/// Per-cluster waveform templates.
pub mod templates;

pub use align::{ClassificationResult, Label};
pub use config::PipelineConfig;
pub use error::{SortError, SortResult};
pub use pipeline::{SortOutput, SpikeSorter};
pub use series::MultichannelSeries;
pub use templates::TemplateLibrary;

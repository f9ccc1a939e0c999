//! JSON summary of a sorting run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::align::ClassificationResult;
use crate::pipeline::SortOutput;
use crate::templates::TemplateRecord;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Serialize report failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Write report to {path} failed: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
pub struct SortReport {
    pub channels: usize,
    pub samples: usize,
    pub sampling_rate: f64,
    pub detections: usize,
    pub good_events: usize,
    pub dropped_empty_clusters: usize,
    /// Good events per cluster, in cluster order.
    pub cluster_sizes: Vec<usize>,
    /// Variance captured by each retained principal component.
    pub pca_eigenvalues: Vec<f64>,
    pub kmeans_inertia: f64,
    pub templates: Vec<TemplateRecord>,
    pub rounds: Vec<RoundSummary>,
    pub final_residual_energy: f64,
}

#[derive(Debug, Serialize)]
pub struct RoundSummary {
    pub index: usize,
    pub detections: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub residual_energy: f64,
    /// Per-event outcomes, only when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<ClassificationResult>>,
}

impl SortReport {
    /// Summarize `output`; `with_events` also embeds every classification.
    pub fn from_output(output: &SortOutput, with_events: bool) -> Self {
        let normalized = &output.normalized;
        let rounds = output
            .rounds
            .iter()
            .map(|round| RoundSummary {
                index: round.index,
                detections: round.positions.len(),
                matched: round.matched(),
                unmatched: round.unmatched(),
                residual_energy: round.residual.energy(),
                events: with_events.then(|| round.results.clone()),
            })
            .collect();
        Self {
            channels: normalized.channel_count(),
            samples: normalized.sample_count(),
            sampling_rate: normalized.sampling_rate(),
            detections: output.detections.len(),
            good_events: output.good_events.len(),
            dropped_empty_clusters: output.clustering.dropped_empty,
            cluster_sizes: output.clustering.sizes(),
            pca_eigenvalues: output.clustering.eigenvalues.clone(),
            kmeans_inertia: output.clustering.inertia,
            templates: output.library.records(),
            rounds,
            final_residual_energy: output.final_residual().energy(),
        }
    }
}

pub fn write_report(path: &Path, report: &SortReport) -> Result<(), ReportError> {
    let data = serde_json::to_vec_pretty(report)?;
    std::fs::write(path, data).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

//! Dimension reduction and clustering of good events.
//!
//! Events are projected on the leading principal directions of their
//! covariance, partitioned with k-means, then relabeled so that cluster `0`
//! carries the most energetic median waveform.

mod kmeans;
mod pca;

use ndarray::{Array2, ArrayView2, Axis};
use tracing::{info, warn};

use crate::error::{SortError, SortResult};
use crate::stats::column_median;

pub use kmeans::{KMeansSettings, Partition, run_kmeans};
pub use pca::{covariance, principal_directions, project};

/// Settings for [`cluster_events`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterSettings {
    /// Number of principal components fed to k-means.
    pub components: usize,
    pub kmeans: KMeansSettings,
}

/// Relabeled partition of the good events.
#[derive(Clone, Debug)]
pub struct Clustering {
    /// Cluster id of every input event, after relabeling.
    pub labels: Vec<usize>,
    /// Number of non-empty clusters.
    pub cluster_count: usize,
    /// Sum of absolute median waveform values, indexed by cluster id.
    pub energies: Vec<f64>,
    /// Requested clusters that ended up empty and were dropped.
    pub dropped_empty: usize,
    /// Leading covariance eigenvalues, one per retained component.
    pub eigenvalues: Vec<f64>,
    /// Within-cluster sum of squares of the kept k-means run.
    pub inertia: f64,
}

impl Clustering {
    /// Indices of the events assigned to `cluster`.
    pub fn members(&self, cluster: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == cluster)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.cluster_count];
        for label in &self.labels {
            sizes[*label] += 1;
        }
        sizes
    }
}

/// Reduce and cluster an events matrix (one good event per row).
pub fn cluster_events(events: ArrayView2<'_, f64>, settings: ClusterSettings) -> SortResult<Clustering> {
    if settings.components == 0 || settings.kmeans.clusters == 0 {
        return Err(SortError::invalid_config(
            "clustering needs at least one component and one cluster",
        ));
    }
    let cov = covariance(events)?;
    let (eigenvalues, directions) = principal_directions(cov.view())?;
    let projected = project(events, directions.view(), settings.components);
    let partition = run_kmeans(&projected, settings.kmeans)?;
    let (labels, energies, dropped_empty) =
        relabel_by_energy(events, &partition.labels, partition.clusters);
    if dropped_empty > 0 {
        warn!("{dropped_empty} empty cluster(s) dropped after k-means");
    }
    info!(
        "clustered {} events into {} clusters (inertia {:.3})",
        events.nrows(),
        energies.len(),
        partition.inertia
    );
    Ok(Clustering {
        labels,
        cluster_count: energies.len(),
        energies,
        dropped_empty,
        eigenvalues: eigenvalues.into_iter().take(settings.components).collect(),
        inertia: partition.inertia,
    })
}

/// Renumber clusters by descending `sum(|median event|)` and drop empty ones.
///
/// Returns the new labels, the energy of each new cluster and the number of
/// dropped clusters.
pub fn relabel_by_energy(
    events: ArrayView2<'_, f64>,
    labels: &[usize],
    clusters: usize,
) -> (Vec<usize>, Vec<f64>, usize) {
    let mut ranked: Vec<(usize, f64)> = Vec::with_capacity(clusters);
    for cluster in 0..clusters {
        let rows = labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label == cluster)
            .map(|(idx, _)| idx)
            .collect::<Vec<usize>>();
        if rows.is_empty() {
            continue;
        }
        let members: Array2<f64> = events.select(Axis(0), &rows);
        let energy = column_median(members.view()).iter().map(|v| v.abs()).sum();
        ranked.push((cluster, energy));
    }
    // Stable sort keeps the lower raw id first on equal energy.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut mapping = vec![usize::MAX; clusters];
    for (new_id, (raw_id, _)) in ranked.iter().enumerate() {
        mapping[*raw_id] = new_id;
    }
    let relabeled = labels.iter().map(|label| mapping[*label]).collect();
    let energies = ranked.iter().map(|(_, energy)| *energy).collect();
    (relabeled, energies, clusters - ranked.len())
}

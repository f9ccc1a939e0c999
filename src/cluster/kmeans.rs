use linfa::DatasetBase;
use linfa::traits::{Fit, Predict};
use linfa_clustering::KMeans;
use ndarray::Array2;

use crate::error::{SortError, SortResult};

/// K-means settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KMeansSettings {
    pub clusters: usize,
    /// Independent restarts; the lowest-inertia run is kept.
    pub restarts: usize,
    pub max_iterations: u64,
    pub tolerance: f64,
}

/// Raw partition returned by the clustering collaborator.
#[derive(Clone, Debug)]
pub struct Partition {
    pub labels: Vec<usize>,
    pub clusters: usize,
    pub inertia: f64,
}

/// Partition the projected events with k-means++ seeded k-means.
///
/// `clusters` is lowered to the number of points when fewer points exist.
/// The collaborator uses a fixed internal seed, so equal input gives equal
/// labels.
pub fn run_kmeans(points: &Array2<f64>, settings: KMeansSettings) -> SortResult<Partition> {
    let count = points.nrows();
    if count == 0 {
        return Err(SortError::NotEnoughEvents {
            stage: "k-means",
            needed: 1,
            found: 0,
        });
    }
    let clusters = settings.clusters.min(count).max(1);
    let dataset = DatasetBase::from(points.clone());
    let model = KMeans::params(clusters)
        .n_runs(settings.restarts.max(1))
        .max_n_iterations(settings.max_iterations.max(1))
        .tolerance(settings.tolerance)
        .fit(&dataset)
        .map_err(|err| SortError::Clustering {
            message: err.to_string(),
        })?;
    let labels = model.predict(points).to_vec();
    if labels.len() != count {
        return Err(SortError::Clustering {
            message: format!("k-means returned {} labels for {count} points", labels.len()),
        });
    }
    Ok(Partition {
        labels,
        clusters,
        inertia: model.inertia(),
    })
}

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{SortError, SortResult};

/// Unbiased covariance matrix of the event features (columns are variables).
pub fn covariance(events: ArrayView2<'_, f64>) -> SortResult<Array2<f64>> {
    let rows = events.nrows();
    if rows < 2 {
        return Err(SortError::NotEnoughEvents {
            stage: "covariance",
            needed: 2,
            found: rows,
        });
    }
    let mean = events
        .mean_axis(Axis(0))
        .ok_or_else(|| SortError::Decomposition {
            message: "empty events matrix".to_string(),
        })?;
    let centered = &events - &mean;
    Ok(centered.t().dot(&centered) / (rows - 1) as f64)
}

/// Eigenvectors of a symmetric matrix, sorted by descending eigenvalue.
///
/// Returns the eigenvalues and a matrix holding one eigenvector per column.
pub fn principal_directions(covariance: ArrayView2<'_, f64>) -> SortResult<(Vec<f64>, Array2<f64>)> {
    let (rows, cols) = covariance.dim();
    if rows != cols || rows == 0 {
        return Err(SortError::Decomposition {
            message: format!("covariance must be square and non-empty, got {rows}x{cols}"),
        });
    }
    let matrix = DMatrix::from_fn(rows, cols, |r, c| covariance[(r, c)]);
    let eigen = SymmetricEigen::new(matrix);
    if eigen.eigenvalues.iter().any(|value| !value.is_finite()) {
        return Err(SortError::Decomposition {
            message: "non-finite eigenvalue".to_string(),
        });
    }
    let mut order = (0..rows).collect::<Vec<usize>>();
    order.sort_by(|a, b| eigen.eigenvalues[*b].total_cmp(&eigen.eigenvalues[*a]));
    let values = order.iter().map(|idx| eigen.eigenvalues[*idx]).collect();
    let vectors = Array2::from_shape_fn((rows, rows), |(r, c)| eigen.eigenvectors[(r, order[c])]);
    Ok((values, vectors))
}

/// Project events onto the `components` leading directions.
///
/// Events are projected as they are, without centering.
pub fn project(
    events: ArrayView2<'_, f64>,
    directions: ArrayView2<'_, f64>,
    components: usize,
) -> Array2<f64> {
    let keep = components.min(directions.ncols());
    events.dot(&directions.slice(ndarray::s![.., ..keep]))
}

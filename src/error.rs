use thiserror::Error;

/// Errors raised by the sorting pipeline.
///
/// Alignment singularities are absorbed inside the alignment engine and
/// unmatched events are a classification outcome, so neither appears here.
#[derive(Debug, Error)]
pub enum SortError {
    /// A channel or column has zero spread and cannot be robustly scaled.
    #[error("Degenerate input: {context} has zero median absolute deviation")]
    DegenerateInput {
        /// Which signal was being normalized.
        context: String,
    },
    /// Input series rejected before any stage runs.
    #[error("Invalid series: {message}")]
    InvalidSeries { message: String },
    /// Configuration values that cannot drive the pipeline.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
    /// A stage received fewer events than it needs.
    #[error("Not enough events for {stage}: needed {needed}, found {found}")]
    NotEnoughEvents {
        stage: &'static str,
        needed: usize,
        found: usize,
    },
    /// The eigendecomposition of the covariance matrix failed.
    #[error("Covariance decomposition failed: {message}")]
    Decomposition { message: String },
    /// K-means clustering failed.
    #[error("Clustering failed: {message}")]
    Clustering { message: String },
}

impl SortError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_series(message: impl Into<String>) -> Self {
        Self::InvalidSeries {
            message: message.into(),
        }
    }
}

pub type SortResult<T> = Result<T, SortError>;

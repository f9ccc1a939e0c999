pub(super) fn default_sampling_rate() -> f64 {
    15_000.0
}

pub(super) fn default_detection_threshold() -> f64 {
    4.0
}

pub(super) fn default_detection_smoothing_width() -> usize {
    5
}

pub(super) fn default_minimal_distance() -> usize {
    15
}

pub(super) fn default_derivative_floor() -> f64 {
    1.0e-3
}

pub(super) fn default_event_before() -> usize {
    14
}

pub(super) fn default_event_after() -> usize {
    30
}

pub(super) fn default_quality_factor() -> f64 {
    crate::quality::CLUSTERING_FACTOR
}

pub(super) fn default_components() -> usize {
    3
}

pub(super) fn default_clusters() -> usize {
    10
}

pub(super) fn default_restarts() -> usize {
    100
}

pub(super) fn default_max_iterations() -> u64 {
    100
}

pub(super) fn default_tolerance() -> f64 {
    1.0e-4
}

pub(super) fn default_template_before() -> usize {
    49
}

pub(super) fn default_template_after() -> usize {
    80
}

pub(super) fn default_template_fraction() -> f64 {
    0.5
}

pub(super) fn default_rounds() -> usize {
    2
}

pub(super) fn default_refinement_smoothing_width() -> usize {
    3
}

pub(super) fn default_refinement_threshold() -> f64 {
    4.0
}

pub(super) fn default_reference_channel() -> usize {
    0
}

//! Per-cluster waveform templates and their derivatives.
//!
//! A template is a local Taylor model of a cluster's waveform: the median
//! event plus the medians of the first and second finite-difference
//! derivative cuts. Shifting the template by `d` samples is approximated by
//! `center + d * center_d + d^2 / 2 * center_dd`.

use ndarray::{Array1, ArrayView2};
use serde::Serialize;
use tracing::{debug, info};

use crate::cluster::Clustering;
use crate::error::{SortError, SortResult};
use crate::events::{EventWindow, make_events};
use crate::preprocess::derivative_series;
use crate::stats::column_median;

/// Waveform model of one cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    id: usize,
    channels: usize,
    window: EventWindow,
    center: Array1<f64>,
    center_d: Array1<f64>,
    center_dd: Array1<f64>,
    center_d_norm2: f64,
    center_dd_norm2: f64,
    center_d_dot_center_dd: f64,
    event_count: usize,
}

impl Template {
    /// Assemble a template from precomputed median vectors.
    pub fn from_parts(
        id: usize,
        channels: usize,
        window: EventWindow,
        center: Array1<f64>,
        center_d: Array1<f64>,
        center_dd: Array1<f64>,
        event_count: usize,
    ) -> SortResult<Self> {
        let expected = window.feature_len(channels);
        if center.len() != expected || center_d.len() != expected || center_dd.len() != expected {
            return Err(SortError::invalid_config(format!(
                "template {id} vectors must have {expected} entries ({channels} channels x {})",
                window.cut_len()
            )));
        }
        Ok(Self {
            id,
            channels,
            window,
            center_d_norm2: center_d.dot(&center_d),
            center_dd_norm2: center_dd.dot(&center_dd),
            center_d_dot_center_dd: center_d.dot(&center_dd),
            center,
            center_d,
            center_dd,
            event_count,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn window(&self) -> EventWindow {
        self.window
    }

    /// Sum of absolute center values.
    pub fn energy(&self) -> f64 {
        self.center.iter().map(|value| value.abs()).sum()
    }

    /// Waveform predicted for a sub-sample shift of `jitter`.
    pub fn predict(&self, jitter: f64) -> Array1<f64> {
        &self.center + &(&self.center_d * jitter) + &(&self.center_dd * (jitter * jitter * 0.5))
    }

    /// Restrict the template to a narrower event window.
    ///
    /// The derivative norms are recomputed on the restricted vectors.
    pub fn restrict(&self, inner: EventWindow) -> SortResult<RestrictedTemplate> {
        let range = self.window.inner_range(&inner).ok_or_else(|| {
            SortError::invalid_config(format!(
                "template window [-{}, {}] does not cover event window [-{}, {}]",
                self.window.before, self.window.after, inner.before, inner.after
            ))
        })?;
        let wide = self.window.cut_len();
        let pick = |source: &Array1<f64>| -> Array1<f64> {
            (0..self.channels)
                .flat_map(|channel| range.clone().map(move |slot| channel * wide + slot))
                .map(|idx| source[idx])
                .collect()
        };
        let center_d = pick(&self.center_d);
        let center_dd = pick(&self.center_dd);
        Ok(RestrictedTemplate {
            cluster: self.id,
            center: pick(&self.center),
            center_d_norm2: center_d.dot(&center_d),
            center_dd_norm2: center_dd.dot(&center_dd),
            center_d_dot_center_dd: center_d.dot(&center_dd),
            center_d,
            center_dd,
        })
    }

    pub fn record(&self) -> TemplateRecord {
        TemplateRecord {
            id: self.id,
            channels: self.channels,
            index_range: [-(self.window.before as i64), self.window.after as i64],
            event_count: self.event_count,
            energy: self.energy(),
            center: self.center.to_vec(),
            center_d: self.center_d.to_vec(),
            center_dd: self.center_dd.to_vec(),
            center_d_norm2: self.center_d_norm2,
            center_dd_norm2: self.center_dd_norm2,
            center_d_dot_center_dd: self.center_d_dot_center_dd,
        }
    }
}

/// Template vectors cut down to the classification window.
#[derive(Clone, Debug, PartialEq)]
pub struct RestrictedTemplate {
    pub cluster: usize,
    pub center: Array1<f64>,
    pub center_d: Array1<f64>,
    pub center_dd: Array1<f64>,
    pub center_d_norm2: f64,
    pub center_dd_norm2: f64,
    pub center_d_dot_center_dd: f64,
}

/// Serializable view of a template for plotting and reports.
#[derive(Clone, Debug, Serialize)]
pub struct TemplateRecord {
    pub id: usize,
    pub channels: usize,
    pub index_range: [i64; 2],
    pub event_count: usize,
    pub energy: f64,
    pub center: Vec<f64>,
    pub center_d: Vec<f64>,
    pub center_dd: Vec<f64>,
    pub center_d_norm2: f64,
    pub center_dd_norm2: f64,
    pub center_d_dot_center_dd: f64,
}

/// Dense, read-only set of templates; a cluster id is its index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateLibrary {
    templates: Vec<Template>,
}

impl TemplateLibrary {
    /// Wrap templates whose ids must equal their positions.
    pub fn new(templates: Vec<Template>) -> SortResult<Self> {
        if let Some((idx, template)) = templates
            .iter()
            .enumerate()
            .find(|(idx, template)| template.id != *idx)
        {
            return Err(SortError::invalid_config(format!(
                "template at index {idx} carries id {}",
                template.id
            )));
        }
        if let Some(first) = templates.first()
            && templates.iter().any(|template| template.channels != first.channels)
        {
            return Err(SortError::invalid_config(
                "templates disagree on channel count",
            ));
        }
        Ok(Self { templates })
    }

    /// Build one template per cluster from the clustered event positions.
    ///
    /// `positions[i]` is the position of the event labeled `clustering.labels[i]`.
    /// Cuts use `window`, which may be wider than the detection window.
    pub fn build(
        data: ArrayView2<'_, f64>,
        positions: &[i64],
        clustering: &Clustering,
        window: EventWindow,
    ) -> SortResult<Self> {
        if positions.len() != clustering.labels.len() {
            return Err(SortError::invalid_config(format!(
                "{} positions for {} cluster labels",
                positions.len(),
                clustering.labels.len()
            )));
        }
        let (first, second) = derivative_series(data)?;
        let channels = data.nrows();
        let mut templates = Vec::with_capacity(clustering.cluster_count);
        for cluster in 0..clustering.cluster_count {
            let members = clustering
                .members(cluster)
                .into_iter()
                .map(|idx| positions[idx])
                .collect::<Vec<i64>>();
            if members.is_empty() {
                return Err(SortError::NotEnoughEvents {
                    stage: "template",
                    needed: 1,
                    found: 0,
                });
            }
            let median_of = |source: ArrayView2<'_, f64>| -> Array1<f64> {
                let events = make_events(source, &members, window);
                Array1::from(column_median(events.view()))
            };
            let template = Template::from_parts(
                cluster,
                channels,
                window,
                median_of(data),
                median_of(first.view()),
                median_of(second.view()),
                members.len(),
            )?;
            debug!(
                "template {cluster}: {} events, energy {:.2}, |D|^2 {:.3}",
                members.len(),
                template.energy(),
                template.center_d_norm2
            );
            templates.push(template);
        }
        info!(
            "built {} templates over window [-{}, {}]",
            templates.len(),
            window.before,
            window.after
        );
        Self::new(templates)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, id: usize) -> Option<&Template> {
        self.templates.get(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Template> {
        self.templates.iter()
    }

    /// Channel count shared by every template, if any exist.
    pub fn channels(&self) -> Option<usize> {
        self.templates.first().map(Template::channels)
    }

    /// Restrict every template to `window`, preserving cluster order.
    pub fn restrict(&self, window: EventWindow) -> SortResult<Vec<RestrictedTemplate>> {
        self.templates
            .iter()
            .map(|template| template.restrict(window))
            .collect()
    }

    pub fn records(&self) -> Vec<TemplateRecord> {
        self.templates.iter().map(Template::record).collect()
    }
}

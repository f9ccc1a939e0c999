//! Template matching with sub-sample jitter estimation.
//!
//! Each event is assigned to the nearest restricted template, then the shift
//! between event and template is estimated from the template's Taylor
//! expansion: a first-order projection on `center_d`, refined by one Newton
//! step on the second-order residual sum of squares. A jitter that rounds to
//! a non-zero integer moves the event position and the fit is redone once.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::events::{EventWindow, cut_event};
use crate::templates::RestrictedTemplate;

/// Magnitudes below this are treated as singular denominators.
const SINGULAR_EPS: f64 = 1.0e-12;

/// Classification outcome of one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Cluster(usize),
    /// No template explained the event better than silence.
    Unmatched,
}

impl Label {
    pub fn cluster(&self) -> Option<usize> {
        match self {
            Label::Cluster(id) => Some(*id),
            Label::Unmatched => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Label::Cluster(_))
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Cluster(id) => write!(f, "{id}"),
            Label::Unmatched => f.write_str("?"),
        }
    }
}

/// Label, aligned position and residual sub-sample jitter of one event.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    pub position: i64,
    pub jitter: f64,
}

/// Inner products between an event residual and one template.
///
/// Every residual sum of squares along the Taylor path follows from these,
/// without touching the vectors again.
#[derive(Clone, Copy, Debug)]
struct TaylorFit<'a> {
    template: &'a RestrictedTemplate,
    h_norm2: f64,
    h_dot_d: f64,
    h_dot_dd: f64,
}

impl<'a> TaylorFit<'a> {
    fn new(h: ArrayView1<'_, f64>, template: &'a RestrictedTemplate) -> Self {
        Self {
            template,
            h_norm2: h.dot(&h),
            h_dot_d: h.dot(&template.center_d),
            h_dot_dd: h.dot(&template.center_dd),
        }
    }

    /// `|h - j D|^2`
    fn rss_first_order(&self, jitter: f64) -> f64 {
        self.h_norm2 - 2.0 * jitter * self.h_dot_d
            + jitter * jitter * self.template.center_d_norm2
    }

    /// `|h - j D - j^2/2 DD|^2`
    fn rss(&self, jitter: f64) -> f64 {
        let t = self.template;
        let j2 = jitter * jitter;
        self.h_norm2 - 2.0 * jitter * self.h_dot_d - j2 * self.h_dot_dd
            + j2 * t.center_d_norm2
            + j2 * jitter * t.center_d_dot_center_dd
            + 0.25 * j2 * j2 * t.center_dd_norm2
    }

    /// Derivative of [`Self::rss`] with respect to the jitter.
    fn rss_d(&self, jitter: f64) -> f64 {
        let t = self.template;
        -2.0 * self.h_dot_d + 2.0 * jitter * (t.center_d_norm2 - self.h_dot_dd)
            + 3.0 * jitter * jitter * t.center_d_dot_center_dd
            + jitter.powi(3) * t.center_dd_norm2
    }

    /// Second derivative of [`Self::rss`] with respect to the jitter.
    fn rss_dd(&self, jitter: f64) -> f64 {
        let t = self.template;
        2.0 * (t.center_d_norm2 - self.h_dot_dd)
            + 6.0 * jitter * t.center_d_dot_center_dd
            + 3.0 * jitter * jitter * t.center_dd_norm2
    }

    /// First-order estimate refined by one Newton step.
    ///
    /// Returns zero when the first-order shift does not improve on the
    /// unshifted template, and keeps the first-order estimate when the Newton
    /// step is undefined or does not improve on it.
    fn estimate(&self) -> f64 {
        if self.template.center_d_norm2 <= SINGULAR_EPS {
            trace!(
                "template {}: flat derivative, jitter fixed at 0",
                self.template.cluster
            );
            return 0.0;
        }
        let jitter0 = self.h_dot_d / self.template.center_d_norm2;
        let order1 = self.rss_first_order(jitter0);
        if self.h_norm2 <= order1 {
            return 0.0;
        }
        let curvature = self.rss_dd(jitter0);
        if curvature.abs() <= SINGULAR_EPS {
            trace!(
                "template {}: vanishing curvature at jitter {jitter0:.4}",
                self.template.cluster
            );
            return jitter0;
        }
        let jitter1 = jitter0 - self.rss_d(jitter0) / curvature;
        if !jitter1.is_finite() {
            trace!("template {}: non-finite Newton step", self.template.cluster);
            return jitter0;
        }
        if order1 <= self.rss(jitter1) {
            jitter0
        } else {
            jitter1
        }
    }
}

/// Estimate the jitter of residual `h = event - center` against `template`.
pub fn fit_jitter(h: ArrayView1<'_, f64>, template: &RestrictedTemplate) -> f64 {
    TaylorFit::new(h, template).estimate()
}

/// Index of the template whose center is closest to `event` in squared
/// Euclidean distance. Ties go to the lowest index.
pub fn nearest_template(event: ArrayView1<'_, f64>, templates: &[RestrictedTemplate]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, template) in templates.iter().enumerate() {
        let distance = event
            .iter()
            .zip(template.center.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>();
        match best {
            Some((_, current)) if distance >= current => {}
            _ => best = Some((idx, distance)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Classify and align the event found at `position` in `data`.
///
/// `templates` must already be restricted to `window`. With no templates the
/// event comes back unmatched at its original position.
pub fn classify_event(
    data: ArrayView2<'_, f64>,
    position: i64,
    window: EventWindow,
    templates: &[RestrictedTemplate],
) -> ClassificationResult {
    let event = cut_event(data, position, window);
    let Some(best) = nearest_template(event.view(), templates) else {
        return ClassificationResult {
            label: Label::Unmatched,
            position,
            jitter: 0.0,
        };
    };
    let template = &templates[best];
    let (event, h, position, jitter) = align_to(data, event, position, window, template);
    let fit = TaylorFit::new(h.view(), template);
    let label = if event.dot(&event) > fit.rss(jitter) {
        Label::Cluster(template.cluster)
    } else {
        Label::Unmatched
    };
    ClassificationResult {
        label,
        position,
        jitter,
    }
}

/// Fit the jitter, recentering the cut once when it spans whole samples.
fn align_to(
    data: ArrayView2<'_, f64>,
    event: Array1<f64>,
    position: i64,
    window: EventWindow,
    template: &RestrictedTemplate,
) -> (Array1<f64>, Array1<f64>, i64, f64) {
    let h = &event - &template.center;
    let jitter = fit_jitter(h.view(), template);
    let shift = jitter.round();
    if shift.abs() == 0.0 {
        return (event, h, position, jitter);
    }
    let moved = position - shift as i64;
    let event = cut_event(data, moved, window);
    let h = &event - &template.center;
    let jitter = fit_jitter(h.view(), template);
    (event, h, moved, jitter)
}

/// Classify every position, in parallel, keeping input order.
pub fn classify_all(
    data: ArrayView2<'_, f64>,
    positions: &[i64],
    window: EventWindow,
    templates: &[RestrictedTemplate],
) -> Vec<ClassificationResult> {
    let results = positions
        .par_iter()
        .map(|&position| classify_event(data, position, window, templates))
        .collect::<Vec<_>>();
    debug!(
        "classified {} events, {} unmatched",
        results.len(),
        results.iter().filter(|r| !r.label.is_matched()).count()
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{Template, TemplateLibrary};
    use ndarray::{Array2, array};

    const CHANNELS: usize = 4;

    fn waveform(t: f64) -> f64 {
        (-(t / 1.5).powi(2)).exp() - 0.45 * (-((t - 5.0) / 3.0).powi(2)).exp()
    }

    /// Multichannel templates sampled from an analytic waveform, with
    /// finite-difference derivatives.
    fn analytic_library(count: usize, window: EventWindow) -> TemplateLibrary {
        let templates = (0..count)
            .map(|id| {
                let scale = 20.0 - id as f64;
                let gain = |channel: usize| 1.0 - 0.15 * ((channel + id) % CHANNELS) as f64;
                let sample = |f: &dyn Fn(f64) -> f64| -> Array1<f64> {
                    (0..CHANNELS)
                        .flat_map(|channel| {
                            window
                                .offsets()
                                .map(move |offset| scale * gain(channel) * f(offset as f64))
                                .collect::<Vec<f64>>()
                        })
                        .collect()
                };
                let center = sample(&waveform);
                let d = sample(&|t: f64| (waveform(t + 1.0) - waveform(t - 1.0)) / 2.0);
                let dd = sample(&|t: f64| {
                    (waveform(t + 2.0) - 2.0 * waveform(t) + waveform(t - 2.0)) / 4.0
                });
                Template::from_parts(id, CHANNELS, window, center, d, dd, 40).unwrap()
            })
            .collect();
        TemplateLibrary::new(templates).unwrap()
    }

    /// Single-channel template whose derivative vectors are orthogonal, so a
    /// pure first-order shift is recovered exactly.
    fn orthogonal_template(cluster: usize, scale: f64) -> RestrictedTemplate {
        let center = array![0.0, -2.0, -6.0, -2.0, 0.0] * scale;
        let center_d = array![-1.0, -2.0, 0.0, 2.0, 1.0] * scale;
        let center_dd = array![1.0, 0.0, -4.0, 0.0, 1.0] * scale;
        RestrictedTemplate {
            cluster,
            center_d_norm2: center_d.dot(&center_d),
            center_dd_norm2: center_dd.dot(&center_dd),
            center_d_dot_center_dd: center_d.dot(&center_dd),
            center,
            center_d,
            center_dd,
        }
    }

    #[test]
    fn closed_form_rss_matches_vectors() {
        let template = orthogonal_template(0, 1.0);
        let h = array![0.3, -0.1, 0.7, 0.2, -0.4];
        let fit = TaylorFit::new(h.view(), &template);
        let jitter = 0.37;
        let direct = &h - &(&template.center_d * jitter)
            - &(&template.center_dd * (jitter * jitter / 2.0));
        assert!((fit.rss(jitter) - direct.dot(&direct)).abs() < 1e-10);
    }

    #[test]
    fn recovers_small_shift() {
        let template = orthogonal_template(0, 1.0);
        let delta = 0.02;
        let h = &template.center_d * delta;
        let jitter = fit_jitter(h.view(), &template);
        assert!((jitter - delta).abs() < 1e-6, "jitter {jitter}");
    }

    #[test]
    fn classify_recovers_jitter_of_taylor_shifted_template() {
        let wide = EventWindow::new(14, 30);
        let window = EventWindow::new(4, 8);
        let library = analytic_library(2, wide);
        let restricted = library.restrict(window).unwrap();
        let inner = &restricted[0];
        assert!(inner.center_d_dot_center_dd.abs() > 1e-3 * inner.center_d_norm2);

        let position = 40i64;
        for delta in [-0.4, -0.25, -0.1, -0.03, 0.03, 0.1, 0.25, 0.4] {
            let template = library.get(0).unwrap();
            let prediction = template.predict(delta);
            let mut data = Array2::<f64>::zeros((CHANNELS, 100));
            for (slot, offset) in wide.offsets().enumerate() {
                let index = (position + offset) as usize;
                for channel in 0..CHANNELS {
                    data[(channel, index)] = prediction[channel * wide.cut_len() + slot];
                }
            }
            let result = classify_event(data.view(), position, window, &restricted);
            assert_eq!(result.label, Label::Cluster(0), "delta {delta}");
            assert_eq!(result.position, position);
            assert!(
                (result.jitter - delta).abs() < 1e-6,
                "delta {delta}: jitter {}",
                result.jitter
            );
        }
    }

    #[test]
    fn flat_derivative_gives_zero_jitter() {
        let mut template = orthogonal_template(0, 1.0);
        template.center_d.fill(0.0);
        template.center_d_norm2 = 0.0;
        template.center_d_dot_center_dd = 0.0;
        let h = array![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(fit_jitter(h.view(), &template), 0.0);
    }

    #[test]
    fn nearest_template_breaks_ties_low() {
        let templates = vec![orthogonal_template(0, 1.0), orthogonal_template(1, 1.0)];
        let event = array![0.0, -2.0, -6.0, -2.0, 0.0];
        assert_eq!(nearest_template(event.view(), &templates), Some(0));
        assert_eq!(nearest_template(event.view(), &[]), None);
    }

    #[test]
    fn matched_event_keeps_position() {
        let template = orthogonal_template(0, 1.0);
        let mut data = Array2::<f64>::zeros((1, 30));
        for (offset, value) in template.center.iter().enumerate() {
            data[(0, 8 + offset)] = *value;
        }
        let window = EventWindow::new(2, 2);
        let far = orthogonal_template(1, 5.0);
        let result = classify_event(data.view(), 10, window, &[far, template]);
        assert_eq!(result.label, Label::Cluster(0));
        assert_eq!(result.position, 10);
        assert!(result.jitter.abs() < 1e-9);
    }

    #[test]
    fn silence_is_unmatched() {
        let data = Array2::<f64>::zeros((1, 30));
        let window = EventWindow::new(2, 2);
        let result = classify_event(data.view(), 10, window, &[orthogonal_template(0, 1.0)]);
        assert_eq!(result.label, Label::Unmatched);
        assert_eq!(result.position, 10);
    }

    #[test]
    fn classify_all_preserves_order() {
        let template = orthogonal_template(0, 1.0);
        let mut data = Array2::<f64>::zeros((1, 40));
        for (offset, value) in template.center.iter().enumerate() {
            data[(0, 18 + offset)] = *value;
        }
        let window = EventWindow::new(2, 2);
        let results = classify_all(data.view(), &[5, 20, 33], window, &[template]);
        let labels = results.iter().map(|r| r.label).collect::<Vec<_>>();
        assert_eq!(labels, vec![Label::Unmatched, Label::Cluster(0), Label::Unmatched]);
        assert_eq!(results[1].position, 20);
    }

    #[test]
    fn label_display_uses_question_mark() {
        assert_eq!(Label::Unmatched.to_string(), "?");
        assert_eq!(Label::Cluster(3).to_string(), "3");
    }
}

mod support;

use spikesort::report::{SortReport, write_report};
use spikesort::{Label, MultichannelSeries, PipelineConfig, SortError, SortOutput, SpikeSorter};
use support::synthetic::{CHANNELS, SAMPLING_RATE, recording};

const SAMPLES: usize = 30_000;

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.clustering.restarts = 10;
    config
}

fn sort(seed: u64) -> SortOutput {
    let rec = recording(SAMPLES, seed);
    let series = MultichannelSeries::from_channels(rec.channels, SAMPLING_RATE).expect("series");
    SpikeSorter::new(test_config())
        .expect("valid config")
        .run(&series)
        .expect("sort")
}

#[test]
fn finds_most_inserted_spikes() {
    let rec = recording(SAMPLES, 7);
    let output = sort(7);
    let near = rec
        .spikes
        .iter()
        .filter(|(position, _)| {
            output
                .detections
                .iter()
                .any(|detected| (detected - *position as i64).abs() <= 5)
        })
        .count();
    assert!(
        near * 10 >= rec.spikes.len() * 8,
        "{near} of {} spikes detected",
        rec.spikes.len()
    );
}

#[test]
fn output_is_deterministic() {
    let first = sort(11);
    let second = sort(11);
    assert_eq!(first.detections, second.detections);
    assert_eq!(first.clustering.labels, second.clustering.labels);
    assert_eq!(first.library, second.library);
    assert_eq!(first.rounds.len(), second.rounds.len());
    for (a, b) in first.rounds.iter().zip(&second.rounds) {
        assert_eq!(a.results, b.results);
        assert_eq!(a.residual, b.residual);
    }
}

#[test]
fn cluster_zero_carries_most_energy() {
    let output = sort(3);
    let energies = &output.clustering.energies;
    assert!(!energies.is_empty());
    assert!(energies.iter().all(|energy| *energy <= energies[0]));
    assert_eq!(output.library.len(), output.clustering.cluster_count);
}

#[test]
fn templates_come_from_early_portion() {
    let output = sort(5);
    let limit = output.normalized.sample_count() as f64 * 0.5;
    assert!(output.good_events.iter().all(|position| *position as f64 <= limit));
    assert!(output.good_events.len() >= 2);
}

#[test]
fn residual_energy_does_not_grow() {
    let output = sort(13);
    assert_eq!(output.rounds.len(), 2);
    let input = output.normalized.energy();
    let first = output.rounds[0].residual.energy();
    let second = output.rounds[1].residual.energy();
    assert!(first < input, "round 0: {first} vs input {input}");
    assert!(output.rounds[1].matched() >= 1);
    assert!(second <= first, "round 1: {second} vs round 0 {first}");
}

#[test]
fn second_round_recovers_overlapping_spikes() {
    let rec = recording(SAMPLES, 13);
    assert!(!rec.overlaps.is_empty());
    let output = sort(13);
    let recovered = rec
        .overlaps
        .iter()
        .filter(|partner| {
            output.rounds[1].results.iter().any(|result| {
                result.label.is_matched() && (result.position - **partner as i64).abs() <= 5
            })
        })
        .count();
    assert!(recovered >= 1, "0 of {} overlapping spikes recovered", rec.overlaps.len());
}

#[test]
fn labels_refer_to_library_templates() {
    let output = sort(17);
    for round in &output.rounds {
        for result in &round.results {
            if let Label::Cluster(id) = result.label {
                assert!(id < output.library.len());
            }
            assert!(result.jitter.is_finite());
        }
        assert_eq!(round.results.len(), round.positions.len());
        assert_eq!(round.residual.channel_count(), CHANNELS);
    }
    assert!(output.rounds[0].matched() > output.rounds[0].unmatched());
}

#[test]
fn constant_channel_is_degenerate() {
    let mut rec = recording(2_000, 1);
    rec.channels[2] = vec![0.25; 2_000];
    let series = MultichannelSeries::from_channels(rec.channels, SAMPLING_RATE).expect("series");
    let err = SpikeSorter::new(test_config())
        .expect("valid config")
        .run(&series)
        .unwrap_err();
    assert!(matches!(err, SortError::DegenerateInput { .. }), "{err}");
}

#[test]
fn report_round_trips_through_json() {
    let output = sort(19);
    let report = SortReport::from_output(&output, true);
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("report.json");
    write_report(&path, &report).expect("write report");
    let text = std::fs::read_to_string(&path).expect("read report");
    let value: serde_json::Value = serde_json::from_str(&text).expect("parse report");
    assert_eq!(value["channels"], CHANNELS);
    assert_eq!(value["samples"], SAMPLES);
    assert_eq!(
        value["rounds"].as_array().map(Vec::len),
        Some(output.rounds.len())
    );
    assert_eq!(
        value["templates"].as_array().map(Vec::len),
        Some(output.library.len())
    );
    assert!(value["rounds"][0]["events"].is_array());
    let template = &value["templates"][0];
    let width = template["center"].as_array().map(Vec::len);
    assert_eq!(width, Some(CHANNELS * (49 + 80 + 1)));
    assert_eq!(template["center_d"].as_array().map(Vec::len), width);
    assert_eq!(template["center_dd"].as_array().map(Vec::len), width);
    assert_eq!(template["index_range"], serde_json::json!([-49, 80]));
    assert_eq!(
        value["cluster_sizes"]
            .as_array()
            .map(|sizes| sizes.iter().filter_map(|size| size.as_u64()).sum::<u64>()),
        Some(output.good_events.len() as u64)
    );
    assert_eq!(value["pca_eigenvalues"].as_array().map(Vec::len), Some(3));
    let final_energy = value["final_residual_energy"].as_f64().expect("final energy");
    let expected = output.rounds[1].residual.energy();
    assert!((final_energy - expected).abs() <= 1e-9 * expected);
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const CHANNELS: usize = 4;
pub const SAMPLING_RATE: f64 = 15_000.0;

/// A simulated neuron: peak amplitude and per-channel gain.
#[derive(Clone, Copy, Debug)]
pub struct Unit {
    pub amplitude: f64,
    pub gains: [f64; CHANNELS],
}

pub const UNITS: [Unit; 2] = [
    Unit {
        amplitude: 18.0,
        gains: [1.0, 0.8, 0.5, 0.3],
    },
    Unit {
        amplitude: 12.0,
        gains: [0.3, 0.6, 1.0, 0.7],
    },
];

pub struct Recording {
    pub channels: Vec<Vec<f64>>,
    /// `(position, unit index)` of every isolated or leading spike.
    pub spikes: Vec<(usize, usize)>,
    /// Unit 0 spikes placed 10 to 13 samples after a leading spike in the
    /// second half, closer than the detector's minimal distance.
    pub overlaps: Vec<usize>,
}

/// Positive peak at `t = 0` followed by a slower negative lobe.
pub fn waveform(t: f64) -> f64 {
    (-(t / 1.5).powi(2)).exp() - 0.45 * (-((t - 5.0) / 3.0).powi(2)).exp()
}

fn gaussian(rng: &mut StdRng) -> f64 {
    let u1 = rng.random::<f64>().max(1e-12);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn insert(channels: &mut [Vec<f64>], position: usize, unit: Unit, offset: f64) {
    for (channel, gain) in channels.iter_mut().zip(unit.gains) {
        for t in -10i64..=30 {
            let index = (position as i64 + t) as usize;
            channel[index] += unit.amplitude * gain * waveform(t as f64 + offset);
        }
    }
}

/// Unit-variance Gaussian noise with spikes from [`UNITS`] every 120 to 180
/// samples, each shifted by a random sub-sample offset.
///
/// The first half only holds isolated spikes. In the second half every other
/// spike is followed by an overlapping unit 0 spike.
pub fn recording(samples: usize, seed: u64) -> Recording {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut channels = (0..CHANNELS)
        .map(|_| (0..samples).map(|_| gaussian(&mut rng)).collect::<Vec<f64>>())
        .collect::<Vec<_>>();
    let mut spikes = Vec::new();
    let mut overlaps = Vec::new();
    let mut position = 200usize;
    while position + 200 < samples {
        let unit_idx = rng.random_range(0..UNITS.len());
        let offset = rng.random::<f64>() - 0.5;
        insert(&mut channels, position, UNITS[unit_idx], offset);
        spikes.push((position, unit_idx));
        if position > samples / 2 + 200 && spikes.len() % 2 == 0 {
            let partner = position + rng.random_range(10..=13);
            let offset = rng.random::<f64>() - 0.5;
            insert(&mut channels, partner, UNITS[0], offset);
            overlaps.push(partner);
        }
        position += 120 + rng.random_range(0..60);
    }
    Recording {
        channels,
        spikes,
        overlaps,
    }
}

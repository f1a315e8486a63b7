// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Dwell-Time Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, Criterion};
use etch_core::beam::BeamProfile;
use etch_core::dwell::{solve_dwell_time, WienerConfig};
use etch_core::pipeline::Pipeline;
use etch_core::validate::forward_simulate;
use etch_types::config::SimulationConfig;
use etch_types::state::ScatteredSample;
use ndarray::Array2;
use std::hint::black_box;

fn gaussian(n: usize, peak: f64, width: f64) -> Array2<f64> {
    let c = (n / 2) as f64;
    Array2::from_shape_fn((n, n), |(i, j)| {
        let d2 = (i as f64 - c).powi(2) + (j as f64 - c).powi(2);
        peak * (-d2 / (2.0 * width * width)).exp()
    })
}

fn wafer_samples(count_per_ring: usize) -> Vec<ScatteredSample> {
    let mut out = vec![ScatteredSample::new(0.0, 0.0, 1850.0)];
    for ring in 1..=6 {
        let r = ring as f64 * 12.0;
        let count = count_per_ring * ring;
        for k in 0..count {
            let a = 2.0 * std::f64::consts::PI * k as f64 / count as f64;
            let (x, y) = (r * a.cos(), r * a.sin());
            out.push(ScatteredSample::new(x, y, 1850.0 + 0.4 * x - 0.2 * y + 0.01 * r * r));
        }
    }
    out
}

fn bench_wiener(c: &mut Criterion) {
    let mut group = c.benchmark_group("wiener_deconvolution");
    group.sample_size(10);

    for n in [85usize, 171usize] {
        let depth = gaussian(n, 150.0, n as f64 / 4.0);
        let beam = gaussian(n, 30.0, 3.0);
        let cfg = WienerConfig::default();
        group.bench_function(format!("grid_{}x{}", n, n), |b| {
            b.iter(|| {
                let d = solve_dwell_time(&depth, &beam, &cfg)
                    .expect("dwell benchmark solve should succeed");
                black_box(d[[n / 2, n / 2]]);
            })
        });
    }

    group.finish();
}

fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_convolution");
    group.sample_size(10);

    let dwell = Array2::from_elem((171, 171), 0.5);
    for w in [11usize, 31usize] {
        let beam = gaussian(w, 30.0, w as f64 / 6.0);
        group.bench_function(format!("beam_{}x{}", w, w), |b| {
            b.iter(|| {
                let sim = forward_simulate(&dwell, &beam)
                    .expect("forward benchmark convolution should succeed");
                black_box(sim[[85, 85]]);
            })
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");
    group.sample_size(10);

    let samples = wafer_samples(8);
    let beam = BeamProfile::new(gaussian(21, 30.0, 3.0))
        .expect("benchmark beam should be valid");
    for extend in [false, true] {
        let pipeline = Pipeline::new(SimulationConfig {
            resolution: 2.0,
            extend_interpolation: extend,
            ..SimulationConfig::default()
        })
        .expect("benchmark config should be valid");
        let label = if extend { "thin_plate" } else { "cubic" };
        group.bench_function(label, |b| {
            b.iter(|| {
                let ctx = pipeline
                    .run(&samples, &beam)
                    .expect("benchmark pipeline should succeed");
                black_box(ctx.validation.mse);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_wiener, bench_forward, bench_pipeline);
criterion_main!(benches);

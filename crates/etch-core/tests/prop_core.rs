// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Property-Based Tests (proptest) for etch-core
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for etch-core using proptest.
//!
//! Covers: etch-depth sign, dwell floor, velocity bounds and edge
//! continuity, trajectory ordering, stage-map decimation, scan planning.

use etch_core::depth::target_etch_depth;
use etch_core::dwell::{solve_dwell_time, WienerConfig};
use etch_core::recipe::{plan_scans, stage_speed_map, ScanPlan, StageLayout};
use etch_core::report::wafer_number;
use etch_core::trajectory::build_trajectory;
use etch_core::velocity::{dwell_to_velocity, SpeedLimits};
use etch_types::state::WaferGrid;
use ndarray::Array2;
use proptest::prelude::*;

fn limits(tw: f64) -> SpeedLimits {
    SpeedLimits {
        min_speed: 0.01,
        max_speed: 500.0,
        transition_width: tw,
    }
}

// ── Depth Properties ─────────────────────────────────────────────────

proptest! {
    /// Etch depth is never negative, whatever the target.
    #[test]
    fn depth_non_negative(
        base in 500.0f64..3000.0,
        tilt in -5.0f64..5.0,
        target in 0.0f64..4000.0,
    ) {
        let grid = WaferGrid::new(40.0, 2.0, 30.0).unwrap();
        let thickness = Array2::from_shape_fn(grid.shape(), |(i, j)| {
            base + tilt * grid.axis[j] + 0.5 * grid.axis[i]
        });
        let depth = target_etch_depth(&thickness, &grid, target).unwrap();
        for &d in depth.iter() {
            prop_assert!(d >= 0.0, "negative depth {} for target {}", d, target);
        }
    }
}

// ── Dwell Properties ─────────────────────────────────────────────────

proptest! {
    /// Dwell is finite and never below 0.1 / max_speed.
    #[test]
    fn dwell_respects_floor(
        n in 5usize..24,
        peak in 0.0f64..100.0,
        level in 0.0f64..500.0,
        max_speed in 10.0f64..1000.0,
    ) {
        let c = (n / 2) as f64;
        let beam = Array2::from_shape_fn((n, n), |(i, j)| {
            let d2 = (i as f64 - c).powi(2) + (j as f64 - c).powi(2);
            peak * (-d2 / 4.0).exp()
        });
        let depth = Array2::from_shape_fn((n, n), |(i, j)| level * ((i + j) % 3) as f64);
        let cfg = WienerConfig { regularization: 1e-3, max_speed };
        let dwell = solve_dwell_time(&depth, &beam, &cfg).unwrap();
        let floor = 0.1 / max_speed;
        for &d in dwell.iter() {
            prop_assert!(d.is_finite(), "non-finite dwell");
            prop_assert!(d >= floor, "dwell {} below floor {}", d, floor);
        }
    }
}

// ── Velocity Properties ──────────────────────────────────────────────

proptest! {
    /// Velocity stays in [min_speed, max_speed] for any positive dwell.
    #[test]
    fn velocity_bounded(scale in 1e-8f64..1e3, tw in 0.0f64..60.0) {
        let grid = WaferGrid::new(80.0, 4.0, 50.0).unwrap();
        let dwell = Array2::from_shape_fn(grid.shape(), |(i, j)| scale * (1 + i * j) as f64);
        let v = dwell_to_velocity(&dwell, &grid, &limits(tw)).unwrap();
        for &s in v.iter() {
            prop_assert!((0.01..=500.0).contains(&s), "speed {} out of range", s);
        }
    }

    /// Bounds hold on any grid, wafer size and transition width, including
    /// cells where the blend lands within rounding of max_speed.
    #[test]
    fn velocity_bounded_any_geometry(
        resolution in prop::sample::select(vec![0.5f64, 1.0, 2.0]),
        diameter in 40.0f64..150.0,
        tw in 0.0f64..80.0,
        min_speed in 0.001f64..1.0,
        max_speed in 10.0f64..800.0,
        seed in 1u64..10_000,
    ) {
        let grid = WaferGrid::new(170.0, resolution, diameter).unwrap();
        let dwell = Array2::from_shape_fn(grid.shape(), |(i, j)| {
            let h = (i as u64 * 7919 + j as u64 * 104_729 + seed * 31) % 1000;
            1e-4 + h as f64 * 1e-3
        });
        let l = SpeedLimits { min_speed, max_speed, transition_width: tw };
        let v = dwell_to_velocity(&dwell, &grid, &l).unwrap();
        for &s in v.iter() {
            prop_assert!(s >= min_speed && s <= max_speed, "speed {} outside [{}, {}]", s, min_speed, max_speed);
        }
    }

    /// Velocity is at max_speed beyond the transition annulus.
    #[test]
    fn velocity_max_outside_annulus(dwell in 0.01f64..100.0, tw in 0.0f64..10.0) {
        let grid = WaferGrid::new(100.0, 2.0, 40.0).unwrap();
        let field = Array2::from_elem(grid.shape(), dwell);
        let v = dwell_to_velocity(&field, &grid, &limits(tw)).unwrap();
        let outer = grid.wafer_radius + tw;
        for (idx, &s) in v.indexed_iter() {
            if grid.radial[idx] > outer {
                prop_assert_eq!(s, 500.0);
            }
        }
    }
}

// ── Trajectory Properties ────────────────────────────────────────────

proptest! {
    /// Trajectory is sorted by descending y, then ascending x.
    #[test]
    fn trajectory_raster_order(res in prop::sample::select(vec![1.0f64, 2.0, 5.0])) {
        let grid = WaferGrid::new(20.0, res, 10.0).unwrap();
        let v = Array2::from_shape_fn(grid.shape(), |(i, j)| (i + j) as f64 + 1.0);
        let t = build_trajectory(&v, &grid, &limits(0.0)).unwrap();
        prop_assert_eq!(t.len(), grid.n * grid.n);
        for w in t.windows(2) {
            let ordered = w[0].y > w[1].y || (w[0].y == w[1].y && w[0].x < w[1].x);
            prop_assert!(ordered, "({}, {}) before ({}, {})", w[0].x, w[0].y, w[1].x, w[1].y);
        }
    }
}

// ── Recipe Properties ────────────────────────────────────────────────

proptest! {
    /// Decimation keeps rows 0, y_step, 2·y_step, … of the crop.
    #[test]
    fn stage_map_decimation(y_step in 1usize..6, range in 4.0f64..40.0) {
        let grid = WaferGrid::new(40.0, 1.0, 30.0).unwrap();
        let v = Array2::from_shape_fn(grid.shape(), |(i, _)| i as f64);
        let layout = StageLayout { center_x: 0.0, center_y: 0.0, recipe_range: range, y_step };
        let map = stage_speed_map(&v, &grid, &layout).unwrap();
        let cropped = grid.axis.iter().filter(|&&a| a.abs() <= range / 2.0 + 1e-9).count();
        prop_assert_eq!(map.y.len(), cropped.div_ceil(y_step));
        let first = map.speeds[[0, 0]];
        for (k, &val) in map.speeds.column(0).iter().enumerate() {
            prop_assert_eq!(val, first + (k * y_step) as f64);
        }
    }

    /// Scan count is non-decreasing in the etch amount.
    #[test]
    fn scan_plan_monotone(a in 0.0f64..1000.0, b in 0.0f64..1000.0, t in 1.0f64..300.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(plan_scans(lo, t).count() <= plan_scans(hi, t).count());
        prop_assert_eq!(plan_scans(0.0, t), ScanPlan::Single);
    }
}

// ── Report Properties ────────────────────────────────────────────────

proptest! {
    /// The wafer number is the first digit run of the name.
    #[test]
    fn wafer_number_first_digits(prefix in "[a-zA-Z_]{0,8}", num in 0u32..100000, suffix in "[a-z_.]{0,8}") {
        let name = format!("{prefix}{num}{suffix}");
        prop_assert_eq!(wafer_number(&name), num.to_string());
    }
}

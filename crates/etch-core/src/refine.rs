// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — Outlier Refinement Loop
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Iterative sample pruning until the simulated post-etch uniformity meets
//! the threshold.
//!
//! State machine:
//!
//! ```text
//! InitialSim ──met──▶ Done
//!     │
//!     ▼
//! IqrOutlierRemoval(1..=max_iqr_rounds) ──met──▶ Done
//!     │ no outliers / rounds exhausted
//!     ▼
//! MinValueRemoval(0..max_min_removals) ──met──▶ Done
//! ```
//!
//! Every removal is checked against the retention floor first and then
//! offered to a [`RefinementPolicy`]. The working sample count never drops
//! below `retain_fraction × original_count`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::beam::BeamProfile;
use crate::pipeline::{Pipeline, SimulationContext};
use etch_math::stats::{argmin, iqr_outlier_indices};
use etch_types::config::RefinementConfig;
use etch_types::constants::{IQR_FENCE, MIN_SAMPLES};
use etch_types::error::EtchResult;
use etch_types::state::{dedup_samples, ScatteredSample};
use log::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementPhase {
    InitialSim,
    IqrOutlierRemoval { iteration: usize },
    MinValueRemoval { count: usize },
    Done,
}

impl fmt::Display for RefinementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefinementPhase::InitialSim => write!(f, "initial simulation"),
            RefinementPhase::IqrOutlierRemoval { iteration } => {
                write!(f, "IQR outlier removal round {iteration}")
            }
            RefinementPhase::MinValueRemoval { count } => {
                write!(f, "minimum-value removal #{}", count + 1)
            }
            RefinementPhase::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

/// Snapshot handed to the policy before each removal, and the final
/// counters of a finished loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementState {
    pub phase: RefinementPhase,
    /// Sample count of the first-ever dataset.
    pub original_count: usize,
    pub current_count: usize,
    /// Points the pending removal would drop.
    pub pending_removal: usize,
    /// Post-etch uniformity (%) of the latest run.
    pub uniformity: f64,
    /// Starts at 1 for the initial run.
    pub simulation_count: usize,
    pub outlier_removal_count: usize,
    pub min_value_removal_count: usize,
    pub total_removed_points: usize,
}

/// Decides whether a proposed removal goes ahead.
pub trait RefinementPolicy {
    fn should_continue(&mut self, state: &RefinementState) -> Decision;
}

impl<F> RefinementPolicy for F
where
    F: FnMut(&RefinementState) -> Decision,
{
    fn should_continue(&mut self, state: &RefinementState) -> Decision {
        self(state)
    }
}

/// Accept every proposed removal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysContinue;

impl RefinementPolicy for AlwaysContinue {
    fn should_continue(&mut self, _state: &RefinementState) -> Decision {
        Decision::Continue
    }
}

/// Accept at most `n` removals of either kind.
#[derive(Debug, Clone, Copy)]
pub struct MaxRounds(pub usize);

impl RefinementPolicy for MaxRounds {
    fn should_continue(&mut self, state: &RefinementState) -> Decision {
        if state.outlier_removal_count + state.min_value_removal_count < self.0 {
            Decision::Continue
        } else {
            Decision::Stop
        }
    }
}

/// Shared stop flag, checked before each iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One accepted removal and the dataset it produced.
#[derive(Debug, Clone)]
pub struct RemovalRecord {
    pub phase: RefinementPhase,
    /// Derived from the original base name, never from an earlier derivative.
    pub dataset_name: String,
    pub removed: Vec<ScatteredSample>,
    pub remaining: Vec<ScatteredSample>,
    /// Uniformity (%) of the re-run on `remaining`.
    pub uniformity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementOutcome {
    MetTarget,
    /// The next removal would breach the retention floor.
    FloorReached,
    /// Round caps hit without meeting the target.
    BudgetExhausted,
    /// The policy declined a removal.
    Declined,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RefinementReport {
    pub outcome: RefinementOutcome,
    /// Result accepted at the end: the latest successful run.
    pub context: SimulationContext,
    pub samples: Vec<ScatteredSample>,
    pub history: Vec<RemovalRecord>,
    pub state: RefinementState,
}

/// Name of the dataset after IQR round `iteration`.
pub fn iqr_dataset_name(base: &str, iteration: usize) -> String {
    format!("{base}_error_deleted_{iteration}_time")
}

/// Name of the dataset after the `count`-th minimum removal, following
/// `iqr_rounds` completed IQR rounds.
pub fn min_removal_dataset_name(base: &str, iqr_rounds: usize, count: usize) -> String {
    if iqr_rounds > 0 {
        format!("{base}_error_deleted_{iqr_rounds}_time_min_removed_{count}")
    } else {
        format!("{base}_min_removed_{count}")
    }
}

/// Drives the pipeline through the refinement state machine.
pub struct OutlierRefinementLoop<'a> {
    pipeline: &'a Pipeline,
    beam: &'a BeamProfile,
    base_name: String,
    config: RefinementConfig,
    uniformity_threshold: f64,
    cancel: CancellationToken,
}

impl<'a> OutlierRefinementLoop<'a> {
    pub fn new(pipeline: &'a Pipeline, beam: &'a BeamProfile, base_name: &str) -> Self {
        let cfg = pipeline.config();
        OutlierRefinementLoop {
            pipeline,
            beam,
            base_name: base_name.to_string(),
            config: cfg.refinement.clone(),
            uniformity_threshold: cfg.uniformity_threshold,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the initial simulation, then refine. Pipeline errors on any re-run
    /// abort the loop and propagate.
    pub fn run(
        &self,
        samples: &[ScatteredSample],
        policy: &mut dyn RefinementPolicy,
    ) -> EtchResult<RefinementReport> {
        let ctx = self.pipeline.run(samples, self.beam)?;
        self.refine(ctx, policy)
    }

    /// Refine starting from an already computed initial run.
    pub fn refine(
        &self,
        initial: SimulationContext,
        policy: &mut dyn RefinementPolicy,
    ) -> EtchResult<RefinementReport> {
        let mut current = dedup_samples(&initial.samples);
        let original_count = current.len();
        let floor = (self.config.retain_fraction * original_count as f64).max(MIN_SAMPLES as f64);
        let mut ctx = initial;
        let mut history = Vec::new();
        let mut state = RefinementState {
            phase: RefinementPhase::InitialSim,
            original_count,
            current_count: original_count,
            pending_removal: 0,
            uniformity: ctx.uniformity(),
            simulation_count: 1,
            outlier_removal_count: 0,
            min_value_removal_count: 0,
            total_removed_points: 0,
        };

        let outcome = if ctx.meets_target(self.uniformity_threshold) {
            info!(
                "initial uniformity {:.3}% meets {:.3}%",
                state.uniformity, self.uniformity_threshold
            );
            RefinementOutcome::MetTarget
        } else {
            state.phase = RefinementPhase::IqrOutlierRemoval { iteration: 1 };
            loop {
                if self.cancel.is_cancelled() {
                    warn!("refinement cancelled during {}", state.phase);
                    break RefinementOutcome::Cancelled;
                }
                let values: Vec<f64> = current.iter().map(|s| s.thickness).collect();

                let (remove, dataset_name) = match state.phase {
                    RefinementPhase::IqrOutlierRemoval { iteration } => {
                        if iteration > self.config.max_iqr_rounds {
                            info!(
                                "{} IQR rounds without meeting target, switching to minimum removal",
                                self.config.max_iqr_rounds
                            );
                            state.phase = RefinementPhase::MinValueRemoval { count: 0 };
                            continue;
                        }
                        let outliers = iqr_outlier_indices(&values, IQR_FENCE);
                        if outliers.is_empty() {
                            info!("no IQR outliers left, switching to minimum removal");
                            state.phase = RefinementPhase::MinValueRemoval { count: 0 };
                            continue;
                        }
                        (outliers, iqr_dataset_name(&self.base_name, iteration))
                    }
                    RefinementPhase::MinValueRemoval { count } => {
                        if count >= self.config.max_min_removals {
                            info!("{count} minimum removals without meeting target");
                            break RefinementOutcome::BudgetExhausted;
                        }
                        let Some(idx) = argmin(&values) else {
                            break RefinementOutcome::FloorReached;
                        };
                        (
                            vec![idx],
                            min_removal_dataset_name(
                                &self.base_name,
                                state.outlier_removal_count,
                                count + 1,
                            ),
                        )
                    }
                    RefinementPhase::InitialSim | RefinementPhase::Done => {
                        break RefinementOutcome::MetTarget;
                    }
                };

                let remaining_count = current.len() - remove.len();
                if (remaining_count as f64) < floor {
                    info!(
                        "removing {} points would leave {remaining_count} < {floor:.1}, keeping current result",
                        remove.len()
                    );
                    break RefinementOutcome::FloorReached;
                }

                state.pending_removal = remove.len();
                if policy.should_continue(&state) == Decision::Stop {
                    info!("policy declined {}", state.phase);
                    break RefinementOutcome::Declined;
                }

                let (removed, kept): (Vec<_>, Vec<_>) = current
                    .iter()
                    .enumerate()
                    .partition(|(i, _)| remove.contains(i));
                let removed: Vec<ScatteredSample> = removed.into_iter().map(|(_, s)| *s).collect();
                current = kept.into_iter().map(|(_, s)| *s).collect();

                debug!("{}: removing {} points → {dataset_name}", state.phase, removed.len());
                ctx = self.pipeline.run(&current, self.beam)?;

                state.simulation_count += 1;
                state.total_removed_points += removed.len();
                state.current_count = current.len();
                state.pending_removal = 0;
                state.uniformity = ctx.uniformity();
                history.push(RemovalRecord {
                    phase: state.phase,
                    dataset_name,
                    removed,
                    remaining: current.clone(),
                    uniformity: state.uniformity,
                });

                state.phase = match state.phase {
                    RefinementPhase::IqrOutlierRemoval { iteration } => {
                        state.outlier_removal_count += 1;
                        RefinementPhase::IqrOutlierRemoval {
                            iteration: iteration + 1,
                        }
                    }
                    RefinementPhase::MinValueRemoval { count } => {
                        state.min_value_removal_count += 1;
                        RefinementPhase::MinValueRemoval { count: count + 1 }
                    }
                    other => other,
                };

                if ctx.meets_target(self.uniformity_threshold) {
                    info!(
                        "uniformity {:.3}% meets {:.3}% after {} removals",
                        state.uniformity,
                        self.uniformity_threshold,
                        history.len()
                    );
                    break RefinementOutcome::MetTarget;
                }
            }
        };

        state.phase = RefinementPhase::Done;
        state.pending_removal = 0;
        Ok(RefinementReport {
            outcome,
            context: ctx,
            samples: current,
            history,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etch_types::config::SimulationConfig;
    use ndarray::Array2;

    fn ring_samples(f: impl Fn(f64, f64) -> f64) -> Vec<ScatteredSample> {
        let mut out = vec![ScatteredSample::new(0.0, 0.0, f(0.0, 0.0))];
        for ring in 1..4 {
            let r = ring as f64 * 8.0;
            let count = 6 * ring;
            for k in 0..count {
                let a = 2.0 * std::f64::consts::PI * k as f64 / count as f64;
                let (x, y) = (r * a.cos(), r * a.sin());
                out.push(ScatteredSample::new(x, y, f(x, y)));
            }
        }
        out
    }

    fn pipeline(threshold: f64, refinement: RefinementConfig) -> Pipeline {
        Pipeline::new(SimulationConfig {
            grid_size: 60.0,
            resolution: 2.0,
            wafer_diameter: 50.0,
            transition_width: 5.0,
            recipe_range: 40.0,
            uniformity_threshold: threshold,
            extend_interpolation: false,
            refinement,
            ..SimulationConfig::default()
        })
        .unwrap()
    }

    fn beam() -> BeamProfile {
        let raw = Array2::from_shape_fn((5, 5), |(i, j)| {
            let d2 = (i as f64 - 2.0).powi(2) + (j as f64 - 2.0).powi(2);
            10.0 * (-d2 / 2.0).exp()
        });
        BeamProfile::new(raw).unwrap()
    }

    fn plane(x: f64, _y: f64) -> f64 {
        1900.0 + 2.0 * x
    }

    #[test]
    fn test_met_on_initial_run() {
        let p = pipeline(100.0, RefinementConfig::default());
        let b = beam();
        let lp = OutlierRefinementLoop::new(&p, &b, "wafer");
        let r = lp.run(&ring_samples(plane), &mut AlwaysContinue).unwrap();
        assert_eq!(r.outcome, RefinementOutcome::MetTarget);
        assert_eq!(r.state.simulation_count, 1);
        assert!(r.history.is_empty());
        assert_eq!(r.state.phase, RefinementPhase::Done);
    }

    #[test]
    fn test_single_outlier_removed_then_met() {
        let p = pipeline(0.01, RefinementConfig::default());
        let b = beam();
        let mut samples = ring_samples(|_, _| 1800.0);
        samples[5].thickness = 5000.0;
        let lp = OutlierRefinementLoop::new(&p, &b, "wafer_01");
        let r = lp.run(&samples, &mut AlwaysContinue).unwrap();
        assert_eq!(r.outcome, RefinementOutcome::MetTarget);
        assert_eq!(r.state.simulation_count, 2);
        assert_eq!(r.state.outlier_removal_count, 1);
        assert_eq!(r.state.total_removed_points, 1);
        assert_eq!(r.history[0].dataset_name, "wafer_01_error_deleted_1_time");
        assert_eq!(r.history[0].removed[0].thickness, 5000.0);
        assert_eq!(r.samples.len(), samples.len() - 1);
    }

    #[test]
    fn test_min_removal_names_and_order() {
        let p = pipeline(0.0, RefinementConfig::default());
        let b = beam();
        let samples = ring_samples(plane);
        let lp = OutlierRefinementLoop::new(&p, &b, "w");
        let r = lp.run(&samples, &mut MaxRounds(2)).unwrap();
        assert_eq!(r.outcome, RefinementOutcome::Declined);
        assert_eq!(r.state.outlier_removal_count, 0);
        assert_eq!(r.state.min_value_removal_count, 2);
        assert_eq!(r.state.simulation_count, 3);
        let names: Vec<&str> = r.history.iter().map(|h| h.dataset_name.as_str()).collect();
        assert_eq!(names, vec!["w_min_removed_1", "w_min_removed_2"]);
        let mut sorted: Vec<f64> = samples.iter().map(|s| s.thickness).collect();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(r.history[0].removed[0].thickness, sorted[0]);
        assert_eq!(r.history[1].removed[0].thickness, sorted[1]);
    }

    #[test]
    fn test_floor_blocks_any_removal() {
        let cfg = RefinementConfig {
            retain_fraction: 1.0,
            ..RefinementConfig::default()
        };
        let p = pipeline(0.0, cfg);
        let b = beam();
        let lp = OutlierRefinementLoop::new(&p, &b, "w");
        let r = lp.run(&ring_samples(plane), &mut AlwaysContinue).unwrap();
        assert_eq!(r.outcome, RefinementOutcome::FloorReached);
        assert_eq!(r.state.simulation_count, 1);
        assert_eq!(r.samples.len(), 37);
    }

    #[test]
    fn test_floor_never_breached() {
        let cfg = RefinementConfig {
            retain_fraction: 0.9,
            ..RefinementConfig::default()
        };
        let p = pipeline(0.0, cfg);
        let b = beam();
        let lp = OutlierRefinementLoop::new(&p, &b, "w");
        let r = lp.run(&ring_samples(plane), &mut AlwaysContinue).unwrap();
        assert_eq!(r.outcome, RefinementOutcome::FloorReached);
        // 0.9 × 37 = 33.3, so 34 is the last admissible count
        assert_eq!(r.samples.len(), 34);
        assert_eq!(r.state.total_removed_points, 3);
        assert_eq!(r.state.simulation_count, 4);
    }

    #[test]
    fn test_budget_exhausted() {
        let cfg = RefinementConfig {
            max_iqr_rounds: 0,
            max_min_removals: 1,
            ..RefinementConfig::default()
        };
        let p = pipeline(0.0, cfg);
        let b = beam();
        let lp = OutlierRefinementLoop::new(&p, &b, "w");
        let r = lp.run(&ring_samples(plane), &mut AlwaysContinue).unwrap();
        assert_eq!(r.outcome, RefinementOutcome::BudgetExhausted);
        assert_eq!(r.state.min_value_removal_count, 1);
        assert_eq!(r.state.simulation_count, 2);
    }

    #[test]
    fn test_cancelled_before_first_iteration() {
        let p = pipeline(0.0, RefinementConfig::default());
        let b = beam();
        let token = CancellationToken::new();
        token.cancel();
        let lp = OutlierRefinementLoop::new(&p, &b, "w").with_cancellation(token);
        let r = lp.run(&ring_samples(plane), &mut AlwaysContinue).unwrap();
        assert_eq!(r.outcome, RefinementOutcome::Cancelled);
        assert_eq!(r.state.simulation_count, 1);
    }

    #[test]
    fn test_closure_policy_sees_pending_removal() {
        let p = pipeline(0.01, RefinementConfig::default());
        let b = beam();
        let mut samples = ring_samples(|_, _| 1800.0);
        samples[3].thickness = 4000.0;
        samples[9].thickness = 100.0;
        let mut seen = Vec::new();
        let mut policy = |s: &RefinementState| {
            seen.push((s.phase, s.pending_removal));
            Decision::Stop
        };
        let lp = OutlierRefinementLoop::new(&p, &b, "w");
        let r = lp.run(&samples, &mut policy).unwrap();
        assert_eq!(r.outcome, RefinementOutcome::Declined);
        assert_eq!(
            seen,
            vec![(RefinementPhase::IqrOutlierRemoval { iteration: 1 }, 2)]
        );
    }

    #[test]
    fn test_dataset_names() {
        assert_eq!(iqr_dataset_name("a", 3), "a_error_deleted_3_time");
        assert_eq!(
            min_removal_dataset_name("a", 2, 4),
            "a_error_deleted_2_time_min_removed_4"
        );
        assert_eq!(min_removal_dataset_name("a", 0, 1), "a_min_removed_1");
    }
}

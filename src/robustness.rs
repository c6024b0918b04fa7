//! Seeded robustness sweep.
//!
//! Perturbs a protocol's quantities with bounded noise, dry-runs every
//! perturbed copy and tallies which constraint families fail. Whether the
//! resulting pass rate is acceptable is a policy decision, made by an
//! [`AcceptancePolicy`] the caller chooses; none of this feeds back into the
//! invariant checks themselves.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{ErrorReport, LabResult};
use crate::graph::ProtocolGraph;
use crate::profile::CapabilityProfile;
use crate::units::Temperature;

/// Temperature noise scale: a noise level of 1.0 shifts targets by up to 100 °C.
const TEMPERATURE_NOISE_SCALE_C: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    pub trials: usize,
    /// Relative perturbation bound, e.g. 0.05 for ±5 %.
    pub noise_level: f64,
    pub seed: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            trials: 100,
            noise_level: 0.05,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessReport {
    pub trials: usize,
    pub passed: usize,
    pub pass_rate: f64,
    /// Failed trials by `constraint_type`.
    pub failure_modes: BTreeMap<String, usize>,
    /// Report of the lowest-numbered failing trial.
    pub first_failure: Option<ErrorReport>,
}

impl RobustnessReport {
    pub fn accepted_by(&self, policy: &dyn AcceptancePolicy) -> bool {
        policy.accept(self)
    }
}

/// Decides whether a sweep result is good enough.
pub trait AcceptancePolicy: Send + Sync {
    fn accept(&self, report: &RobustnessReport) -> bool;
}

/// Accept when at least `min_pass_rate` of trials pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassRatePolicy {
    pub min_pass_rate: f64,
}

impl Default for PassRatePolicy {
    fn default() -> Self {
        Self {
            min_pass_rate: 0.95,
        }
    }
}

impl AcceptancePolicy for PassRatePolicy {
    fn accept(&self, report: &RobustnessReport) -> bool {
        report.trials > 0 && report.pass_rate >= self.min_pass_rate
    }
}

fn perturb(action: &Action, rng: &mut StdRng, noise: f64) -> Action {
    let u = rng.gen_range(-1.0..=1.0) * noise;
    match action {
        Action::Move {
            source,
            destination,
            amount,
        } => Action::Move {
            source: source.clone(),
            destination: destination.clone(),
            amount: *amount * (1.0 + u),
        },
        Action::Transform {
            target,
            parameter,
            target_value,
            duration,
        } => Action::Transform {
            target: target.clone(),
            parameter: *parameter,
            target_value: Temperature::celsius(
                target_value.as_celsius() + u * TEMPERATURE_NOISE_SCALE_C,
            )
            .to(target_value.unit()),
            duration: *duration,
        },
        other => other.clone(),
    }
}

fn run_trial(
    graph: &ProtocolGraph,
    profile: Option<&CapabilityProfile>,
    config: &SweepConfig,
    trial: usize,
) -> LabResult<()> {
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(trial as u64));
    let perturbed = graph.map_actions(|a| perturb(a, &mut rng, config.noise_level))?;
    perturbed.dry_run(profile).map(|_| ())
}

/// Dry-run `config.trials` perturbed copies of `graph`. Deterministic for a
/// fixed seed regardless of thread count.
pub fn robustness_sweep(
    graph: &ProtocolGraph,
    profile: Option<&CapabilityProfile>,
    config: &SweepConfig,
) -> RobustnessReport {
    let outcomes: Vec<LabResult<()>> = (0..config.trials)
        .into_par_iter()
        .map(|trial| run_trial(graph, profile, config, trial))
        .collect();

    let mut failure_modes = BTreeMap::new();
    let mut first_failure = None;
    let mut passed = 0;
    for outcome in outcomes {
        match outcome {
            Ok(()) => passed += 1,
            Err(err) => {
                *failure_modes.entry(err.constraint_type().to_string()).or_insert(0) += 1;
                first_failure.get_or_insert_with(|| err.to_report());
            }
        }
    }

    let pass_rate = if config.trials == 0 { 0.0 } else { passed as f64 / config.trials as f64 };
    tracing::info!(
        protocol = %graph.name(),
        trials = config.trials,
        passed,
        "robustness sweep finished"
    );
    RobustnessReport {
        trials: config.trials,
        passed,
        pass_rate,
        failure_modes,
        first_failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Container, Matter};
    use crate::units::{Mass, Volume};

    fn graph(amount: f64) -> ProtocolGraph {
        let mut g = ProtocolGraph::new("sweep");
        let tube = |id: &str| {
            Container::new(
                id,
                Volume::microliters(500.0),
                Temperature::celsius(4.0),
                Temperature::celsius(100.0),
            )
        };
        g.add_container(tube("A").with_matter(Matter::liquid(
            "water",
            Mass::milligrams(150.0),
            Volume::microliters(150.0),
        )))
        .unwrap();
        g.add_container(tube("B")).unwrap();
        g.add_step(Action::transfer("A", "B", Volume::microliters(amount))).unwrap();
        g
    }

    #[test]
    fn comfortable_margin_always_passes() {
        let cfg = SweepConfig { trials: 32, noise_level: 0.1, seed: 7 };
        let report = robustness_sweep(&graph(50.0), None, &cfg);
        assert_eq!(report.passed, 32);
        assert!(report.accepted_by(&PassRatePolicy::default()));
    }

    #[test]
    fn marginal_plan_fails_on_volume() {
        let cfg = SweepConfig { trials: 64, noise_level: 0.2, seed: 7 };
        let report = robustness_sweep(&graph(149.0), None, &cfg);
        assert!(report.passed < 64);
        assert!(report.failure_modes["volume"] > 0);
        assert_eq!(report.first_failure.as_ref().unwrap().error_code, "VOL_001");
        assert!(!report.accepted_by(&PassRatePolicy::default()));
    }

    #[test]
    fn sweep_is_deterministic() {
        let cfg = SweepConfig { trials: 40, noise_level: 0.05, seed: 42 };
        let g = graph(145.0);
        assert_eq!(robustness_sweep(&g, None, &cfg), robustness_sweep(&g, None, &cfg));
    }

    #[test]
    fn zero_noise_matches_the_plain_dry_run() {
        let cfg = SweepConfig { trials: 5, noise_level: 0.0, seed: 1 };
        assert_eq!(robustness_sweep(&graph(100.0), None, &cfg).passed, 5);
        assert_eq!(robustness_sweep(&graph(200.0), None, &cfg).passed, 0);
    }

    #[test]
    fn custom_policy() {
        struct Strict;
        impl AcceptancePolicy for Strict {
            fn accept(&self, report: &RobustnessReport) -> bool {
                report.passed == report.trials
            }
        }
        let cfg = SweepConfig { trials: 8, noise_level: 0.0, seed: 0 };
        assert!(robustness_sweep(&graph(10.0), None, &cfg).accepted_by(&Strict));
    }
}

//! Agent self-correction loop.
//!
//! A [`PlanReviser`] sees the rejected plan and the [`ErrorReport`] and
//! proposes a revised plan. The loop compiles, reports and revises until a
//! plan compiles, the reviser gives up, or the attempt budget runs out.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::compiler::Compiler;
use crate::error::ErrorReport;
use crate::ir::{ContentHash, IrPayload};
use crate::plan::ProtocolPlan;
use crate::profile::CapabilityProfile;
use crate::units::{Temperature, TemperatureUnit, Unit, Volume, VolumeUnit};

/// Proposes a revised plan from a rejection. `None` means give up.
pub trait PlanReviser {
    fn revise(&mut self, plan: &ProtocolPlan, report: &ErrorReport) -> Option<ProtocolPlan>;
}

impl<F> PlanReviser for F
where
    F: FnMut(&ProtocolPlan, &ErrorReport) -> Option<ProtocolPlan>,
{
    fn revise(&mut self, plan: &ProtocolPlan, report: &ErrorReport) -> Option<ProtocolPlan> {
        self(plan, report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    Accepted,
    ReviserGaveUp,
    AttemptsExhausted,
}

/// One compile of one plan revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based.
    pub attempt: usize,
    pub report: Option<ErrorReport>,
    pub content_hash: Option<ContentHash>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub status: CorrectionStatus,
    pub attempts: Vec<Attempt>,
    pub final_plan: ProtocolPlan,
    pub ir: Option<IrPayload>,
}

impl CorrectionOutcome {
    pub fn is_accepted(&self) -> bool {
        self.status == CorrectionStatus::Accepted
    }

    pub fn last_report(&self) -> Option<&ErrorReport> {
        self.attempts.iter().rev().find_map(|a| a.report.as_ref())
    }
}

pub(crate) fn run<R: PlanReviser + ?Sized>(
    compiler: &Compiler,
    plan: ProtocolPlan,
    reviser: &mut R,
    max_attempts: usize,
    profile: Option<&CapabilityProfile>,
) -> CorrectionOutcome {
    let budget = max_attempts.max(1);
    let mut attempts = Vec::with_capacity(budget);
    let mut plan = plan;

    for attempt in 1..=budget {
        match compiler.compile(&plan, profile) {
            Ok(ir) => {
                attempts.push(Attempt {
                    attempt,
                    report: None,
                    content_hash: Some(ir.content_hash),
                });
                tracing::info!(attempt, hash = %ir.content_hash, "plan accepted");
                return CorrectionOutcome {
                    status: CorrectionStatus::Accepted,
                    attempts,
                    final_plan: plan,
                    ir: Some(ir),
                };
            }
            Err(report) => {
                tracing::info!(
                    attempt,
                    code = %report.error_code,
                    step = report.step_id.as_deref().unwrap_or("-"),
                    "plan rejected"
                );
                let revised = if attempt < budget { reviser.revise(&plan, &report) } else { None };
                attempts.push(Attempt {
                    attempt,
                    report: Some(report),
                    content_hash: None,
                });
                match revised {
                    Some(next) => plan = next,
                    None if attempt < budget => {
                        return CorrectionOutcome {
                            status: CorrectionStatus::ReviserGaveUp,
                            attempts,
                            final_plan: plan,
                            ir: None,
                        };
                    }
                    None => {}
                }
            }
        }
    }

    CorrectionOutcome {
        status: CorrectionStatus::AttemptsExhausted,
        attempts,
        final_plan: plan,
        ir: None,
    }
}

// ---------------------------------------------------------------------------
// Hint-driven reviser
// ---------------------------------------------------------------------------

/// Parse the quantity at the end of a `"... to <= <magnitude> <unit>"` hint.
pub fn parse_bound<U: Unit>(hint: &str) -> Option<(f64, U)> {
    let (_, bound) = hint.rsplit_once("<= ")?;
    let mut parts = bound.split_whitespace();
    let magnitude: f64 = parts.next()?.parse().ok()?;
    let unit: U = serde_json::from_value(serde_json::Value::from(parts.next()?)).ok()?;
    Some((magnitude, unit))
}

/// Applies the numeric bound in a remediation hint to the offending step.
///
/// Handles `"reduce requested volume to <= X"` on `Move` steps and
/// `"reduce target temperature to <= X"` on `Transform` steps. Anything
/// else makes it give up.
#[derive(Debug, Clone, Copy, Default)]
pub struct HintReviser;

impl PlanReviser for HintReviser {
    fn revise(&mut self, plan: &ProtocolPlan, report: &ErrorReport) -> Option<ProtocolPlan> {
        let step_id = report.step_id.as_deref()?;
        let position = step_position(plan, step_id)?;
        let hint = report.remediation_hint.as_str();

        let mut revised = plan.clone();
        let action = &mut revised.steps[position].action;
        match action {
            Action::Move { amount, .. } if hint.starts_with("reduce requested volume") => {
                let (magnitude, unit) = parse_bound::<VolumeUnit>(hint)?;
                if !(magnitude > 0.0) {
                    return None;
                }
                *amount = Volume::new(magnitude, unit);
            }
            Action::Transform { target_value, .. }
                if hint.starts_with("reduce target temperature") =>
            {
                let (magnitude, unit) = parse_bound::<TemperatureUnit>(hint)?;
                *target_value = Temperature::new(magnitude, unit);
            }
            _ => return None,
        }
        Some(revised)
    }
}

/// Index of `step_id` in `plan.steps`, resolving generated `sN` ids.
fn step_position(plan: &ProtocolPlan, step_id: &str) -> Option<usize> {
    plan.steps
        .iter()
        .enumerate()
        .position(|(i, s)| match &s.id {
            Some(id) => id == step_id,
            None => format!("s{}", i + 1) == step_id,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Container, Matter};
    use crate::units::Mass;

    fn plan(amount: f64) -> ProtocolPlan {
        let tube = |id: &str| {
            Container::new(
                id,
                Volume::microliters(500.0),
                Temperature::celsius(4.0),
                Temperature::celsius(100.0),
            )
        };
        ProtocolPlan::new("correction")
            .with_container(tube("A").with_matter(Matter::liquid(
                "water",
                Mass::milligrams(150.0),
                Volume::microliters(150.0),
            )))
            .with_container(tube("B"))
            .with_step(Action::transfer("A", "B", Volume::microliters(amount)))
            .with_step(Action::heat("B", Temperature::celsius(150.0)))
    }

    #[test]
    fn hint_reviser_converges() {
        let compiler = Compiler::default();
        let outcome = compiler.correct(plan(200.0), &mut HintReviser, 5, None);
        assert!(outcome.is_accepted());
        assert_eq!(outcome.attempts.len(), 3);
        let codes: Vec<_> = outcome
            .attempts
            .iter()
            .filter_map(|a| a.report.as_ref().map(|r| r.error_code.as_str()))
            .collect();
        assert_eq!(codes, vec!["VOL_001", "THM_001"]);
        assert_eq!(
            outcome.final_plan.steps[0].action,
            Action::transfer("A", "B", Volume::microliters(150.0))
        );
        assert!(outcome.ir.is_some());
    }

    #[test]
    fn budget_is_respected() {
        let compiler = Compiler::default();
        let outcome = compiler.correct(plan(200.0), &mut HintReviser, 1, None);
        assert_eq!(outcome.status, CorrectionStatus::AttemptsExhausted);
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.last_report().unwrap().error_code, "VOL_001");
    }

    #[test]
    fn closure_reviser_can_give_up() {
        let compiler = Compiler::default();
        let mut never = |_: &ProtocolPlan, _: &ErrorReport| -> Option<ProtocolPlan> { None };
        let outcome = compiler.correct(plan(200.0), &mut never, 5, None);
        assert_eq!(outcome.status, CorrectionStatus::ReviserGaveUp);
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[test]
    fn bounds_parse_from_hints() {
        assert_eq!(
            parse_bound::<VolumeUnit>("reduce requested volume to <= 150 uL"),
            Some((150.0, VolumeUnit::Microliter))
        );
        assert_eq!(
            parse_bound::<TemperatureUnit>("reduce target temperature to <= 100 C"),
            Some((100.0, TemperatureUnit::Celsius))
        );
        assert_eq!(parse_bound::<VolumeUnit>("add material first"), None);
    }
}

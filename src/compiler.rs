//! High-level entry point: plan in, IR or error report out.

use rayon::prelude::*;

use crate::config::CompilerConfig;
use crate::correction::{self, CorrectionOutcome, PlanReviser};
use crate::error::{ErrorReport, LabResult};
use crate::graph::{ProtocolGraph, ValidatedGraph};
use crate::ir::IrPayload;
use crate::plan::ProtocolPlan;
use crate::profile::CapabilityProfile;

/// Compiles protocol plans with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn build(&self, plan: &ProtocolPlan) -> LabResult<ProtocolGraph> {
        plan.build(&self.config)
    }

    /// Build and dry-run a plan.
    pub fn validate(
        &self,
        plan: &ProtocolPlan,
        profile: Option<&CapabilityProfile>,
    ) -> LabResult<ValidatedGraph> {
        self.build(plan)?.dry_run(profile)
    }

    /// Build, dry-run and export a plan. Failures come back in wire form.
    pub fn compile(
        &self,
        plan: &ProtocolPlan,
        profile: Option<&CapabilityProfile>,
    ) -> Result<IrPayload, ErrorReport> {
        self.validate(plan, profile)
            .map(|validated| validated.export_json())
            .map_err(|err| err.to_report())
    }

    /// Compile competing proposals in parallel. Results keep input order.
    ///
    /// Each proposal is built into its own graph and evaluated on its own
    /// snapshot; only `profile` is shared, read-only.
    pub fn evaluate_proposals(
        &self,
        plans: &[ProtocolPlan],
        profile: Option<&CapabilityProfile>,
    ) -> Vec<Result<IrPayload, ErrorReport>> {
        plans.par_iter().map(|plan| self.compile(plan, profile)).collect()
    }

    /// Run the self-correction loop. See [`crate::correction`].
    pub fn correct<R: PlanReviser + ?Sized>(
        &self,
        plan: ProtocolPlan,
        reviser: &mut R,
        max_attempts: usize,
        profile: Option<&CapabilityProfile>,
    ) -> CorrectionOutcome {
        correction::run(self, plan, reviser, max_attempts, profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::entity::{Container, Matter};
    use crate::units::{Mass, Temperature, Volume};

    fn plan(amount: f64) -> ProtocolPlan {
        let tube = |id: &str| {
            Container::new(
                id,
                Volume::microliters(500.0),
                Temperature::celsius(4.0),
                Temperature::celsius(100.0),
            )
        };
        ProtocolPlan::new(format!("move {amount}"))
            .with_container(tube("A").with_matter(Matter::liquid(
                "water",
                Mass::milligrams(150.0),
                Volume::microliters(150.0),
            )))
            .with_container(tube("B"))
            .with_step(Action::transfer("A", "B", Volume::microliters(amount)))
    }

    #[test]
    fn compile_returns_report_on_failure() {
        let report = Compiler::default().compile(&plan(200.0), None).unwrap_err();
        assert_eq!(report.error_code, "VOL_001");
        assert_eq!(report.step_id.as_deref(), Some("s1"));
    }

    #[test]
    fn proposals_keep_input_order() {
        let plans: Vec<_> = [50.0, 200.0, 100.0, -1.0].into_iter().map(plan).collect();
        let profile = CapabilityProfile::bundled("liquid-handler").unwrap();
        let results = Compiler::default().evaluate_proposals(&plans, Some(&profile));
        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().error_code, "VOL_001");
        assert!(results[2].is_ok());
        assert_eq!(results[3].as_ref().unwrap_err().error_code, "ORD_001");
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let plans: Vec<_> = (1..=16).map(|i| plan(i as f64 * 10.0)).collect();
        let compiler = Compiler::default();
        let parallel = compiler.evaluate_proposals(&plans, None);
        let sequential: Vec<_> = plans.iter().map(|p| compiler.compile(p, None)).collect();
        assert_eq!(parallel, sequential);
    }
}

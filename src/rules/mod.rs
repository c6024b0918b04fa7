//! Validation rule engine.
//!
//! [`evaluate`] is a pure function of an action, the working state and a
//! [`RuleContext`]. It either returns the [`Effect`] the action would have or
//! the first violated rule. Rules for each action variant run in a fixed
//! order; the first failure wins and nothing is aggregated.
//!
//! Rule families, in evaluation order:
//!
//! 1. physical: volume, thermal and mass accounting ([`physical`])
//! 2. ordering: well-formed, strictly positive parameters ([`ordering`])
//! 3. compatibility: hazard tag pairings ([`ordering`])
//! 4. capability: declared device bounds ([`capability`])
//!
//! `Transform` checks its thermal bounds before thermal expansion, since the
//! expanded volume at an unreachable temperature says nothing useful.

pub mod capability;
pub mod ordering;
pub mod physical;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind, SensorKind, TransformParameter};
use crate::config::CompilerConfig;
use crate::entity::Container;
use crate::error::{DiagnosticValue, LabResult};
use crate::profile::CapabilityProfile;
use crate::state::Snapshot;
use crate::units::{Temperature, Time, Volume};

/// Read-only inputs shared by every rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub config: &'a CompilerConfig,
    pub profile: Option<&'a CapabilityProfile>,
}

/// Predicted sensor value recorded by a `Measure` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub container: String,
    pub sensor: SensorKind,
    pub value: DiagnosticValue,
}

/// Accepted outcome of one action: replacement containers plus an optional
/// reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effect {
    pub updates: Vec<Container>,
    pub reading: Option<Reading>,
}

impl Effect {
    /// Swap the updated containers into `state`.
    pub fn apply(self, state: &mut Snapshot) -> Option<Reading> {
        for container in self.updates {
            state.put(container);
        }
        self.reading
    }
}

/// Evaluate `action` against `state`.
pub fn evaluate(action: &Action, state: &Snapshot, ctx: &RuleContext<'_>) -> LabResult<Effect> {
    match action {
        Action::Move {
            source,
            destination,
            amount,
        } => evaluate_move(source, destination, *amount, state, ctx),
        Action::Transform {
            target,
            parameter,
            target_value,
            duration,
        } => match parameter {
            TransformParameter::Temperature => {
                evaluate_heat(target, *target_value, *duration, state, ctx)
            }
        },
        Action::Combine {
            target,
            method,
            duration,
        } => evaluate_combine(target, method, *duration, state, ctx),
        Action::Measure { target, sensor } => evaluate_measure(target, *sensor, state, ctx),
    }
}

fn evaluate_move(
    source_id: &str,
    destination_id: &str,
    amount: Volume,
    state: &Snapshot,
    ctx: &RuleContext<'_>,
) -> LabResult<Effect> {
    let cfg = ctx.config;
    let source = state.container(source_id)?;
    let destination = state.container(destination_id)?;
    let same = source_id == destination_id;

    let transfer = physical::plan_transfer(source, amount, cfg.residual_volume_epsilon);
    let incoming_ul = transfer.pulled_microliters();
    let mixed = physical::mixed_temperature(destination, incoming_ul, source.current_temp);

    physical::check_source_holds(source, amount)?;
    if !same {
        let alpha = physical::expansion_coefficient(
            destination.contents.iter().chain(&transfer.pulled),
            cfg,
        );
        let incoming = Volume::microliters(incoming_ul).to(amount.unit());
        physical::check_destination_capacity(destination, incoming, alpha, mixed, cfg)?;
        physical::check_temperature_bounds(destination, mixed, "source temperature")?;
    }

    let updates = if same {
        Vec::new()
    } else {
        let mut drained = source.clone();
        drained.contents = transfer.kept.clone();
        vec![drained, physical::receive(destination, transfer.pulled.clone(), mixed)]
    };
    physical::check_fully_resolved(source, &transfer)?;
    physical::check_mass_conservation(state, &updates, cfg)?;

    ordering::check_positive_volume(amount)?;
    ordering::check_distinct(source_id, destination_id)?;

    ordering::check_transfer_compatibility(&transfer.pulled, &destination.contents)?;

    if let Some(profile) = ctx.profile {
        capability::check_supported(profile, ActionKind::Move)?;
        capability::check_transfer_volume(profile, amount)?;
        capability::check_vessel(profile, source)?;
        capability::check_vessel(profile, destination)?;
        capability::check_temperature(profile, destination, mixed)?;
        capability::check_hazards(profile, transfer.pulled.iter().chain(&destination.contents))?;
    }

    Ok(Effect {
        updates,
        reading: None,
    })
}

fn evaluate_heat(
    target_id: &str,
    target_value: Temperature,
    duration: Option<Time>,
    state: &Snapshot,
    ctx: &RuleContext<'_>,
) -> LabResult<Effect> {
    let cfg = ctx.config;
    let target = state.container(target_id)?;

    physical::check_temperature_bounds(target, target_value, "target temperature")?;
    physical::check_flash_points(target, target_value)?;
    if let Some(duration) = duration {
        physical::check_ramp_rate(target, target_value, duration, cfg)?;
    }
    physical::check_expansion_capacity(target, target_value, cfg)?;

    let updates = vec![physical::set_temperature(target, target_value)];
    physical::check_mass_conservation(state, &updates, cfg)?;

    ordering::check_absolute_temperature(target_value)?;
    if let Some(duration) = duration {
        ordering::check_positive_duration(duration, ActionKind::Transform)?;
    }

    if let Some(profile) = ctx.profile {
        capability::check_supported(profile, ActionKind::Transform)?;
        capability::check_vessel(profile, target)?;
        capability::check_temperature(profile, target, target_value)?;
        capability::check_hazards(profile, target.contents.iter())?;
    }

    Ok(Effect {
        updates,
        reading: None,
    })
}

fn evaluate_combine(
    target_id: &str,
    method: &str,
    duration: Time,
    state: &Snapshot,
    ctx: &RuleContext<'_>,
) -> LabResult<Effect> {
    let cfg = ctx.config;
    let target = state.container(target_id)?;

    let updates = vec![physical::homogenize(target)];
    physical::check_mass_conservation(state, &updates, cfg)?;

    ordering::check_non_empty(target)?;
    ordering::check_method(method)?;
    ordering::check_positive_duration(duration, ActionKind::Combine)?;

    ordering::check_mutual_compatibility(&target.contents)?;

    if let Some(profile) = ctx.profile {
        capability::check_supported(profile, ActionKind::Combine)?;
        capability::check_vessel(profile, target)?;
        capability::check_hazards(profile, target.contents.iter())?;
    }

    Ok(Effect {
        updates,
        reading: None,
    })
}

fn evaluate_measure(
    target_id: &str,
    sensor: SensorKind,
    state: &Snapshot,
    ctx: &RuleContext<'_>,
) -> LabResult<Effect> {
    let target = state.container(target_id)?;

    if let Some(profile) = ctx.profile {
        capability::check_supported(profile, ActionKind::Measure)?;
        capability::check_vessel(profile, target)?;
    }

    let value = match sensor {
        SensorKind::Volume => target.current_volume().into(),
        SensorKind::Temperature => target.current_temp.into(),
        SensorKind::Mass => target.total_mass().into(),
    };
    Ok(Effect {
        updates: Vec::new(),
        reading: Some(Reading {
            container: target.id.clone(),
            sensor,
            value,
        }),
    })
}

//! Volume, thermal and mass rules, plus the material bookkeeping they check.

use std::collections::BTreeMap;

use crate::config::CompilerConfig;
use crate::entity::{Container, Matter, microliters};
use crate::error::{ErrorKind, LabResult, PhysicsError};
use crate::state::Snapshot;
use crate::units::{Mass, MassUnit, Temperature, Time, TimeUnit, Volume};

/// Flash points of common solvents by CAS number, °C.
const FLASH_POINTS_C: &[(&str, f64)] = &[
    ("67-56-1", 11.0),  // methanol
    ("64-17-5", 13.0),  // ethanol
    ("67-64-1", -20.0), // acetone
];

/// Round down to six decimals so hints never suggest an amount that still fails.
pub(crate) fn floor_micro(x: f64) -> f64 {
    let floored = (x * 1e6).floor() / 1e6;
    if floored <= 0.0 { 0.0 } else { floored }
}

fn ceil_micro(x: f64) -> f64 {
    (x * 1e6).ceil() / 1e6
}

// ---------------------------------------------------------------------------
// Transfer bookkeeping
// ---------------------------------------------------------------------------

/// Result of pulling a volume out of a source container.
#[derive(Debug, Clone)]
pub(crate) struct Transfer {
    /// Source contents left behind.
    pub kept: Vec<Matter>,
    /// Portions leaving the source, at the source temperature.
    pub pulled: Vec<Matter>,
    /// Requested volume that could not be drawn, in the requested unit.
    pub unresolved: Volume,
}

impl Transfer {
    pub fn pulled_microliters(&self) -> f64 {
        self.pulled.iter().map(|m| microliters(m.volume)).sum()
    }
}

/// Pull `amount` front to back from `source`. Mass leaves in proportion to
/// volume; an entry left with at most `epsilon` of volume is drained entirely.
/// A non-positive or non-finite amount pulls nothing.
pub(crate) fn plan_transfer(source: &Container, amount: Volume, epsilon: f64) -> Transfer {
    let mut wanted = if amount.is_positive() { amount } else { Volume::zero(amount.unit()) };
    let mut kept = Vec::with_capacity(source.contents.len());
    let mut pulled = Vec::new();

    for matter in &source.contents {
        let available = matter.volume;
        if wanted.magnitude() <= 0.0 || available.magnitude() <= 0.0 {
            kept.push(matter.clone());
            continue;
        }
        let take = wanted.value_in(available.unit());
        let mut portion = matter.clone();
        portion.temperature = source.current_temp;

        if available.magnitude() - take <= epsilon {
            pulled.push(portion);
            wanted = wanted - available;
            if wanted.magnitude() <= epsilon {
                wanted = Volume::zero(amount.unit());
            }
            continue;
        }

        portion.volume = Volume::new(take, available.unit());
        portion.mass = Mass::new(
            matter.mass.magnitude() * take / available.magnitude(),
            matter.mass.unit(),
        );
        let mut rest = matter.clone();
        rest.volume = available - portion.volume;
        rest.mass = matter.mass - portion.mass;
        kept.push(rest);
        pulled.push(portion);
        wanted = Volume::zero(amount.unit());
    }

    Transfer {
        kept,
        pulled,
        unresolved: wanted,
    }
}

/// Destination after receiving `incoming`, equilibrated at `temperature`.
pub(crate) fn receive(
    destination: &Container,
    incoming: Vec<Matter>,
    temperature: Temperature,
) -> Container {
    let mut next = destination.clone();
    for portion in incoming {
        merge_into(&mut next.contents, portion);
    }
    equilibrate(&mut next, temperature);
    next
}

/// Container with duplicate materials merged and contents at one temperature.
pub(crate) fn homogenize(container: &Container) -> Container {
    let mut next = container.clone();
    next.contents = Vec::with_capacity(container.contents.len());
    for matter in container.contents.iter().cloned() {
        merge_into(&mut next.contents, matter);
    }
    equilibrate(&mut next, container.current_temp);
    next
}

pub(crate) fn set_temperature(container: &Container, temperature: Temperature) -> Container {
    let mut next = container.clone();
    equilibrate(&mut next, temperature);
    next
}

fn equilibrate(container: &mut Container, temperature: Temperature) {
    container.current_temp = temperature;
    for matter in &mut container.contents {
        matter.temperature = temperature;
    }
}

fn merge_into(contents: &mut Vec<Matter>, portion: Matter) {
    let Some(existing) = contents.iter_mut().find(|m| m.same_material(&portion)) else {
        contents.push(portion);
        return;
    };
    existing.composition = merge_composition(existing, &portion);
    existing.volume = existing.volume + portion.volume;
    existing.mass = existing.mass + portion.mass;
    existing.flash_point = match (existing.flash_point, portion.flash_point) {
        (Some(a), Some(b)) => Some(if b < a { b } else { a }),
        (a, b) => a.or(b),
    };
    if existing.cas_number.is_none() {
        existing.cas_number = portion.cas_number;
    }
    existing.thermal_expansion_coefficient = existing
        .thermal_expansion_coefficient
        .max(portion.thermal_expansion_coefficient);
    existing.hazard_tags.extend(portion.hazard_tags);
    existing.incompatible_with.extend(portion.incompatible_with);
}

/// Mass-weighted blend of two composition maps.
fn merge_composition(a: &Matter, b: &Matter) -> Option<BTreeMap<String, f64>> {
    if a.composition == b.composition {
        return a.composition.clone();
    }
    let (ma, mb) = (a.mass.value_in(MassUnit::Milligram), b.mass.value_in(MassUnit::Milligram));
    let total = ma + mb;
    if total <= 0.0 {
        return a.composition.clone().or_else(|| b.composition.clone());
    }
    let mut blended = BTreeMap::new();
    for (matter, weight) in [(a, ma / total), (b, mb / total)] {
        match &matter.composition {
            Some(parts) => {
                for (component, fraction) in parts {
                    *blended.entry(component.clone()).or_insert(0.0) += fraction * weight;
                }
            }
            None => *blended.entry(matter.name.to_lowercase()).or_insert(0.0) += weight,
        }
    }
    Some(blended)
}

// ---------------------------------------------------------------------------
// Thermal model
// ---------------------------------------------------------------------------

/// Volume-weighted temperature of `destination` after `incoming_ul` arrives
/// at `incoming_temp`.
pub(crate) fn mixed_temperature(
    destination: &Container,
    incoming_ul: f64,
    incoming_temp: Temperature,
) -> Temperature {
    let unit = destination.current_temp.unit();
    if incoming_ul <= 0.0 || incoming_temp == destination.current_temp {
        return destination.current_temp;
    }
    let resident_ul = microliters(destination.current_volume());
    if resident_ul <= 0.0 {
        return incoming_temp.to(unit);
    }
    let mixed = (resident_ul * destination.current_temp.as_celsius()
        + incoming_ul * incoming_temp.as_celsius())
        / (resident_ul + incoming_ul);
    Temperature::celsius(mixed).to(unit)
}

/// Largest declared expansion coefficient, or the configured default.
pub(crate) fn expansion_coefficient<'a>(
    matters: impl Iterator<Item = &'a Matter>,
    cfg: &CompilerConfig,
) -> f64 {
    matters
        .map(|m| m.thermal_expansion_coefficient)
        .reduce(f64::max)
        .unwrap_or(cfg.default_expansion_coefficient)
}

fn expansion_factor(alpha: f64, temperature: Temperature, cfg: &CompilerConfig) -> f64 {
    let over = temperature.as_celsius() - cfg.reference_temp_c;
    if over > 0.0 { 1.0 + alpha * over } else { 1.0 }
}

fn flash_point(matter: &Matter) -> Option<Temperature> {
    matter.flash_point.or_else(|| {
        let cas = matter.cas_number.as_deref()?.trim();
        FLASH_POINTS_C
            .iter()
            .find(|(known, _)| *known == cas)
            .map(|(_, c)| Temperature::celsius(*c))
    })
}

// ---------------------------------------------------------------------------
// Volume rules
// ---------------------------------------------------------------------------

pub(crate) fn check_source_holds(source: &Container, amount: Volume) -> LabResult<()> {
    let held = source.current_volume().to(amount.unit());
    if amount.is_positive() && held < amount {
        return Err(PhysicsError::new(
            ErrorKind::VolumeOverflow,
            format!("Source '{}' holds {held} but {amount} was requested.", source.id),
            held,
            amount,
            format!(
                "reduce requested volume to <= {}",
                Volume::new(floor_micro(held.magnitude()), amount.unit())
            ),
        ));
    }
    Ok(())
}

pub(crate) fn check_destination_capacity(
    destination: &Container,
    amount: Volume,
    alpha: f64,
    temperature: Temperature,
    cfg: &CompilerConfig,
) -> LabResult<()> {
    let current = destination.current_volume();
    let factor = expansion_factor(alpha, temperature, cfg);
    let projected = (current + amount) * factor;
    if projected > destination.max_volume {
        let safe = (destination.max_volume * (1.0 / factor) - current).to(amount.unit());
        return Err(PhysicsError::new(
            ErrorKind::VolumeOverflow,
            format!(
                "Destination '{}' would hold {projected}, above its capacity of {}.",
                destination.id, destination.max_volume
            ),
            projected,
            destination.max_volume,
            format!(
                "reduce requested volume to <= {}",
                Volume::new(floor_micro(safe.magnitude()), amount.unit())
            ),
        ));
    }
    Ok(())
}

/// Heating expands the contents in place.
pub(crate) fn check_expansion_capacity(
    container: &Container,
    temperature: Temperature,
    cfg: &CompilerConfig,
) -> LabResult<()> {
    let alpha = expansion_coefficient(container.contents.iter(), cfg);
    let factor = expansion_factor(alpha, temperature, cfg);
    let projected = container.current_volume() * factor;
    if projected > container.max_volume {
        let safe = container.max_volume * (1.0 / factor);
        return Err(PhysicsError::new(
            ErrorKind::VolumeOverflow,
            format!(
                "Contents of '{}' expand to {projected} at {temperature}, above its capacity of {}.",
                container.id, container.max_volume
            ),
            projected,
            container.max_volume,
            format!(
                "reduce contents of '{}' to <= {} before heating",
                container.id,
                Volume::new(floor_micro(safe.magnitude()), safe.unit())
            ),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Thermal rules
// ---------------------------------------------------------------------------

/// `subject` names the quantity the caller controls, e.g. "target temperature".
pub(crate) fn check_temperature_bounds(
    container: &Container,
    temperature: Temperature,
    subject: &str,
) -> LabResult<()> {
    if temperature > container.max_temp {
        return Err(PhysicsError::new(
            ErrorKind::ThermalLimitExceeded,
            format!(
                "Container '{}' would reach {temperature}, above its maximum of {}.",
                container.id, container.max_temp
            ),
            temperature,
            container.max_temp,
            format!("reduce {subject} to <= {}", container.max_temp),
        ));
    }
    if temperature < container.min_temp {
        return Err(PhysicsError::new(
            ErrorKind::ThermalLimitExceeded,
            format!(
                "Container '{}' would reach {temperature}, below its minimum of {}.",
                container.id, container.min_temp
            ),
            temperature,
            container.min_temp,
            format!("raise {subject} to >= {}", container.min_temp),
        ));
    }
    Ok(())
}

/// Heating to or past a content's flash point is rejected. Cooling never is.
pub(crate) fn check_flash_points(container: &Container, target: Temperature) -> LabResult<()> {
    if !(target > container.current_temp) {
        return Ok(());
    }
    for matter in &container.contents {
        let Some(limit) = flash_point(matter) else {
            continue;
        };
        if target >= limit {
            return Err(PhysicsError::new(
                ErrorKind::ThermalLimitExceeded,
                format!(
                    "Heating '{}' to {target} reaches the flash point of {} ({limit}).",
                    container.id, matter.name
                ),
                target,
                limit,
                format!(
                    "keep target temperature below {limit} or remove {} from '{}'",
                    matter.name, container.id
                ),
            ));
        }
    }
    Ok(())
}

pub(crate) fn check_ramp_rate(
    container: &Container,
    target: Temperature,
    duration: Time,
    cfg: &CompilerConfig,
) -> LabResult<()> {
    let seconds = duration.value_in(TimeUnit::Second);
    if !(seconds > 0.0) {
        return Ok(());
    }
    let delta = (target.as_celsius() - container.current_temp.as_celsius()).abs();
    let rate = delta / seconds;
    if rate > cfg.max_ramp_rate_c_per_s {
        let needed = Time::seconds(ceil_micro(delta / cfg.max_ramp_rate_c_per_s));
        return Err(PhysicsError::new(
            ErrorKind::ThermalLimitExceeded,
            format!(
                "Ramping '{}' to {target} over {duration} needs {rate} C/s.",
                container.id
            ),
            rate,
            cfg.max_ramp_rate_c_per_s,
            format!("extend duration to >= {needed}"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Mass rules
// ---------------------------------------------------------------------------

pub(crate) fn check_fully_resolved(source: &Container, transfer: &Transfer) -> LabResult<()> {
    if transfer.unresolved.magnitude() > 0.0 {
        return Err(PhysicsError::new(
            ErrorKind::MassConservationViolation,
            format!(
                "Transfer from '{}' left {} unaccounted for.",
                source.id, transfer.unresolved
            ),
            transfer.unresolved,
            Volume::zero(transfer.unresolved.unit()),
            format!(
                "reduce requested volume by {} or top up '{}' first",
                transfer.unresolved, source.id
            ),
        ));
    }
    Ok(())
}

/// Total mass of the replaced containers must equal the mass of their
/// replacements.
pub(crate) fn check_mass_conservation(
    state: &Snapshot,
    updates: &[Container],
    cfg: &CompilerConfig,
) -> LabResult<()> {
    let zero = Mass::zero(MassUnit::Milligram);
    let before = updates
        .iter()
        .filter_map(|c| state.get(&c.id))
        .fold(zero, |acc, c| acc + c.total_mass());
    let after = updates.iter().fold(zero, |acc, c| acc + c.total_mass());

    let delta = (after.magnitude() - before.magnitude()).abs();
    let scale = before.magnitude().abs().max(after.magnitude().abs());
    if !(delta <= cfg.mass_rel_tolerance * scale) {
        let ids: Vec<&str> = updates.iter().map(|c| c.id.as_str()).collect();
        return Err(PhysicsError::new(
            ErrorKind::MassConservationViolation,
            format!(
                "Effect on [{}] changes total mass from {before} to {after}.",
                ids.join(", ")
            ),
            after,
            before,
            format!(
                "keep the total mass of [{}] at {before} across this step",
                ids.join(", ")
            ),
        ));
    }
    Ok(())
}

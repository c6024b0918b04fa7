//! Device capability bounds, checked independently of physical feasibility.

use crate::action::ActionKind;
use crate::entity::{Container, Matter};
use crate::error::{DiagnosticValue, ErrorKind, LabResult, PhysicsError};
use crate::profile::CapabilityProfile;
use crate::units::{Temperature, Volume};

pub(crate) fn check_supported(profile: &CapabilityProfile, kind: ActionKind) -> LabResult<()> {
    if !profile.supports(kind) {
        let supported: Vec<String> =
            profile.supported_actions.iter().map(ToString::to_string).collect();
        return Err(PhysicsError::new(
            ErrorKind::CapabilityBoundExceeded,
            format!("Profile '{}' does not support {kind} actions.", profile.name),
            DiagnosticValue::text(kind.to_string()),
            DiagnosticValue::Ids(supported.clone()),
            format!("use only supported actions: [{}]", supported.join(", ")),
        ));
    }
    Ok(())
}

pub(crate) fn check_transfer_volume(profile: &CapabilityProfile, amount: Volume) -> LabResult<()> {
    if amount > profile.max_volume {
        return Err(PhysicsError::new(
            ErrorKind::CapabilityBoundExceeded,
            format!(
                "Profile '{}' moves at most {} per step, {amount} was requested.",
                profile.name, profile.max_volume
            ),
            amount,
            profile.max_volume,
            format!(
                "split the transfer into steps of <= {}",
                profile.max_volume.to(amount.unit())
            ),
        ));
    }
    Ok(())
}

pub(crate) fn check_vessel(profile: &CapabilityProfile, container: &Container) -> LabResult<()> {
    let Some(limit) = profile.max_vessel_volume else {
        return Ok(());
    };
    if container.max_volume > limit {
        return Err(PhysicsError::new(
            ErrorKind::CapabilityBoundExceeded,
            format!(
                "Container '{}' ({}) is larger than profile '{}' accepts.",
                container.id, container.max_volume, profile.name
            ),
            container.max_volume,
            limit,
            format!("use a vessel of <= {limit} for '{}'", container.id),
        ));
    }
    Ok(())
}

pub(crate) fn check_temperature(
    profile: &CapabilityProfile,
    container: &Container,
    temperature: Temperature,
) -> LabResult<()> {
    if temperature > profile.max_temp {
        return Err(PhysicsError::new(
            ErrorKind::CapabilityBoundExceeded,
            format!(
                "Profile '{}' reaches at most {}, '{}' would be at {temperature}.",
                profile.name, profile.max_temp, container.id
            ),
            temperature,
            profile.max_temp,
            format!("reduce target temperature to <= {}", profile.max_temp),
        ));
    }
    if let Some(min) = profile.min_temp
        && temperature < min
    {
        return Err(PhysicsError::new(
            ErrorKind::CapabilityBoundExceeded,
            format!(
                "Profile '{}' reaches at least {min}, '{}' would be at {temperature}.",
                profile.name, container.id
            ),
            temperature,
            min,
            format!("raise target temperature to >= {min}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_hazards<'a>(
    profile: &CapabilityProfile,
    matters: impl Iterator<Item = &'a Matter>,
) -> LabResult<()> {
    for matter in matters {
        if let Some(tag) = matter.hazard_tags.iter().find(|t| profile.blocks(t)) {
            return Err(PhysicsError::new(
                ErrorKind::CapabilityBoundExceeded,
                format!(
                    "Profile '{}' may not handle {} ({tag}).",
                    profile.name, matter.name
                ),
                DiagnosticValue::text(tag.clone()),
                DiagnosticValue::ids(profile.blocked_hazard_classes.iter().cloned()),
                format!("route {} to a target that accepts {tag} materials", matter.name),
            ));
        }
    }
    Ok(())
}

pub(crate) fn check_step_count(profile: &CapabilityProfile, steps: usize) -> LabResult<()> {
    if steps > profile.max_steps {
        return Err(PhysicsError::new(
            ErrorKind::CapabilityBoundExceeded,
            format!(
                "Protocol has {steps} steps, profile '{}' runs at most {}.",
                profile.name, profile.max_steps
            ),
            steps,
            profile.max_steps,
            format!("reduce the protocol to <= {} steps", profile.max_steps),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Mass;

    fn handler() -> CapabilityProfile {
        CapabilityProfile::bundled("liquid-handler").unwrap()
    }

    #[test]
    fn transfer_bound_hint_uses_request_unit() {
        let err = check_transfer_volume(&handler(), Volume::milliliters(2.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CapabilityBoundExceeded);
        assert_eq!(err.remediation_hint(), "split the transfer into steps of <= 1 mL");
        assert!(check_transfer_volume(&handler(), Volume::microliters(1000.0)).is_ok());
    }

    #[test]
    fn vessel_size() {
        let flask = Container::new(
            "F",
            Volume::liters(1.0),
            Temperature::celsius(4.0),
            Temperature::celsius(40.0),
        );
        assert!(check_vessel(&handler(), &flask).is_err());
    }

    #[test]
    fn temperature_window() {
        let tube = Container::new(
            "T",
            Volume::microliters(200.0),
            Temperature::celsius(-20.0),
            Temperature::celsius(100.0),
        );
        assert!(check_temperature(&handler(), &tube, Temperature::celsius(37.0)).is_ok());
        assert!(check_temperature(&handler(), &tube, Temperature::celsius(60.0)).is_err());
        assert!(check_temperature(&handler(), &tube, Temperature::celsius(0.0)).is_err());
    }

    #[test]
    fn blocked_hazards() {
        let tbutyl = Matter::liquid("t-BuLi", Mass::milligrams(1.0), Volume::microliters(1.0))
            .with_hazard("Pyrophoric");
        let err = check_hazards(&handler(), [tbutyl].iter()).unwrap_err();
        assert_eq!(err.actual_value(), &DiagnosticValue::text("pyrophoric"));
    }

    #[test]
    fn step_budget() {
        let mut p = handler();
        p.max_steps = 2;
        assert!(check_step_count(&p, 2).is_ok());
        assert_eq!(check_step_count(&p, 3).unwrap_err().kind(), ErrorKind::CapabilityBoundExceeded);
    }
}

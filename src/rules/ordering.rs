//! Ordering and compatibility rules.

use crate::action::ActionKind;
use crate::entity::{Container, Matter};
use crate::error::{DiagnosticValue, ErrorKind, LabResult, PhysicsError};
use crate::units::{Temperature, TemperatureUnit, Time, Volume};

pub(crate) fn check_positive_volume(amount: Volume) -> LabResult<()> {
    if !amount.is_positive() {
        return Err(PhysicsError::new(
            ErrorKind::InvalidOrdering,
            format!("Move amount must be strictly positive, got {amount}."),
            amount,
            Volume::zero(amount.unit()),
            "use a strictly positive, finite transfer volume",
        ));
    }
    Ok(())
}

pub(crate) fn check_distinct(source: &str, destination: &str) -> LabResult<()> {
    if source == destination {
        return Err(PhysicsError::new(
            ErrorKind::InvalidOrdering,
            format!("Move source and destination are both '{source}'."),
            DiagnosticValue::ids([source, destination]),
            DiagnosticValue::text("distinct containers"),
            "move into a different container than the source",
        ));
    }
    Ok(())
}

/// Target temperatures must be finite and above absolute zero.
pub(crate) fn check_absolute_temperature(target: Temperature) -> LabResult<()> {
    if !(target.value_in(TemperatureUnit::Kelvin) > 0.0) || !target.is_finite() {
        return Err(PhysicsError::new(
            ErrorKind::InvalidOrdering,
            format!("Transform target {target} is not a physical temperature."),
            target,
            Temperature::kelvin(0.0),
            "use a finite target temperature above 0 K",
        ));
    }
    Ok(())
}

pub(crate) fn check_positive_duration(duration: Time, kind: ActionKind) -> LabResult<()> {
    if !duration.is_positive() {
        return Err(PhysicsError::new(
            ErrorKind::InvalidOrdering,
            format!("{kind} duration must be strictly positive, got {duration}."),
            duration,
            Time::zero(duration.unit()),
            "use a strictly positive, finite duration",
        ));
    }
    Ok(())
}

pub(crate) fn check_non_empty(container: &Container) -> LabResult<()> {
    if container.is_empty() {
        return Err(PhysicsError::new(
            ErrorKind::InvalidOrdering,
            format!("Combine target '{}' is empty.", container.id),
            container.current_volume(),
            DiagnosticValue::text("non-empty container"),
            format!("add material to '{}' before combining", container.id),
        ));
    }
    Ok(())
}

pub(crate) fn check_method(method: &str) -> LabResult<()> {
    if method.trim().is_empty() {
        return Err(PhysicsError::schema(
            "Combine method is empty.",
            DiagnosticValue::text(method),
            "name the mixing method, e.g. \"vortex\" or \"pipette-mix\"",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Compatibility
// ---------------------------------------------------------------------------

fn incompatible(a: &Matter, b: &Matter, tag: String) -> PhysicsError {
    PhysicsError::new(
        ErrorKind::IncompatibleMaterials,
        format!("{} must not share a container with {} ({tag}).", a.name, b.name),
        DiagnosticValue::ids([a.name.as_str(), b.name.as_str()]),
        DiagnosticValue::text(tag),
        format!("keep {} and {} in separate containers", a.name, b.name),
    )
}

/// Every incoming portion against every resident of the destination.
pub(crate) fn check_transfer_compatibility(
    incoming: &[Matter],
    resident: &[Matter],
) -> LabResult<()> {
    for a in incoming {
        for b in resident {
            if let Some(tag) = a.conflict_with(b) {
                return Err(incompatible(a, b, tag));
            }
        }
    }
    Ok(())
}

/// Every pair of contents of one container.
pub(crate) fn check_mutual_compatibility(contents: &[Matter]) -> LabResult<()> {
    for (i, a) in contents.iter().enumerate() {
        for b in &contents[i + 1..] {
            if let Some(tag) = a.conflict_with(b) {
                return Err(incompatible(a, b, tag));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Mass;

    fn liquid(name: &str) -> Matter {
        Matter::liquid(name, Mass::milligrams(1.0), Volume::microliters(1.0))
    }

    #[test]
    fn zero_and_nan_volumes_fail() {
        assert!(check_positive_volume(Volume::microliters(0.0)).is_err());
        assert!(check_positive_volume(Volume::microliters(f64::NAN)).is_err());
        assert!(check_positive_volume(Volume::microliters(0.5)).is_ok());
    }

    #[test]
    fn below_absolute_zero_fails() {
        assert!(check_absolute_temperature(Temperature::celsius(-300.0)).is_err());
        assert!(check_absolute_temperature(Temperature::celsius(f64::INFINITY)).is_err());
        assert!(check_absolute_temperature(Temperature::celsius(-80.0)).is_ok());
    }

    #[test]
    fn combine_duration_must_be_positive() {
        let err = check_positive_duration(Time::seconds(0.0), ActionKind::Combine).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOrdering);
        assert!(err.to_string().starts_with("Combine duration"));
    }

    #[test]
    fn pairwise_conflicts() {
        let acid = liquid("hcl").with_hazard("acid");
        let cyanide = liquid("kcn").incompatible_with("acid");
        let err = check_mutual_compatibility(&[liquid("water"), acid.clone(), cyanide.clone()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IncompatibleMaterials);
        assert_eq!(err.actual_value(), &DiagnosticValue::ids(["hcl", "kcn"]));

        assert!(check_transfer_compatibility(&[acid], &[liquid("water")]).is_ok());
        assert!(check_transfer_compatibility(&[cyanide], &[liquid("hcl").with_hazard("acid")]).is_err());
    }
}

//! Protocol actions.
//!
//! An [`Action`] is a closed tagged union. Each variant carries only
//! container ids and typed quantities, so one step can be evaluated,
//! serialized and hashed without looking anything else up.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::units::{Temperature, Time, Volume};

/// A single protocol operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type")]
pub enum Action {
    /// Transfer `amount` from `source` to `destination`.
    Move {
        source: String,
        destination: String,
        amount: Volume,
    },
    /// Drive a container parameter to `target_value`, optionally over
    /// `duration`.
    Transform {
        target: String,
        parameter: TransformParameter,
        target_value: Temperature,
        #[serde(default)]
        duration: Option<Time>,
    },
    /// Mix the contents of `target`.
    Combine {
        target: String,
        method: String,
        duration: Time,
    },
    /// Read a sensor on `target`.
    Measure { target: String, sensor: SensorKind },
}

/// Variant discriminant of [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    Move,
    Transform,
    Combine,
    Measure,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Move => "Move",
            Self::Transform => "Transform",
            Self::Combine => "Combine",
            Self::Measure => "Measure",
        })
    }
}

/// Parameters a [`Action::Transform`] can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformParameter {
    Temperature,
}

/// Sensors a [`Action::Measure`] can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Volume,
    Temperature,
    Mass,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Volume => "volume",
            Self::Temperature => "temperature",
            Self::Mass => "mass",
        })
    }
}

impl Action {
    pub fn transfer(
        source: impl Into<String>,
        destination: impl Into<String>,
        amount: Volume,
    ) -> Self {
        Self::Move {
            source: source.into(),
            destination: destination.into(),
            amount,
        }
    }

    pub fn heat(target: impl Into<String>, target_value: Temperature) -> Self {
        Self::Transform {
            target: target.into(),
            parameter: TransformParameter::Temperature,
            target_value,
            duration: None,
        }
    }

    pub fn ramp(target: impl Into<String>, target_value: Temperature, duration: Time) -> Self {
        Self::Transform {
            target: target.into(),
            parameter: TransformParameter::Temperature,
            target_value,
            duration: Some(duration),
        }
    }

    pub fn combine(target: impl Into<String>, method: impl Into<String>, duration: Time) -> Self {
        Self::Combine {
            target: target.into(),
            method: method.into(),
            duration,
        }
    }

    pub fn measure(target: impl Into<String>, sensor: SensorKind) -> Self {
        Self::Measure {
            target: target.into(),
            sensor,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Move { .. } => ActionKind::Move,
            Self::Transform { .. } => ActionKind::Transform,
            Self::Combine { .. } => ActionKind::Combine,
            Self::Measure { .. } => ActionKind::Measure,
        }
    }

    /// Container ids this action touches, in declaration order, without
    /// duplicates.
    pub fn footprint(&self) -> Vec<&str> {
        match self {
            Self::Move {
                source,
                destination,
                ..
            } if source == destination => vec![source.as_str()],
            Self::Move {
                source,
                destination,
                ..
            } => vec![source.as_str(), destination.as_str()],
            Self::Transform { target, .. }
            | Self::Combine { target, .. }
            | Self::Measure { target, .. } => vec![target.as_str()],
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move {
                source,
                destination,
                amount,
            } => write!(f, "Move {amount} {source} -> {destination}"),
            Self::Transform {
                target,
                target_value,
                duration,
                ..
            } => match duration {
                Some(d) => write!(f, "Transform {target} to {target_value} over {d}"),
                None => write!(f, "Transform {target} to {target_value}"),
            },
            Self::Combine {
                target,
                method,
                duration,
            } => write!(f, "Combine {target} by {method} for {duration}"),
            Self::Measure { target, sensor } => write!(f, "Measure {sensor} of {target}"),
        }
    }
}

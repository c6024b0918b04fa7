//! Typed physical quantities.
//!
//! A [`Quantity`] is parameterized by its unit enum, so the dimension is part of
//! the type: adding a [`Volume`] to a [`Mass`] does not compile. Within a
//! dimension, conversions go through a fixed scale table relative to the
//! smallest unit, and converting to the unit a value is already in is the
//! identity (no float round trip).
//!
//! ```
//! use labgraph::units::{Volume, VolumeUnit};
//!
//! let a = Volume::microliters(150.0);
//! let b = Volume::milliliters(0.1);
//! assert_eq!((a - b).magnitude(), 50.0);
//! assert_eq!((a - b).unit(), VolumeUnit::Microliter);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Sub};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A unit tag belonging to exactly one physical dimension.
pub trait Unit:
    Copy + Eq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Dimension name used in diagnostics (`"volume"`, `"temperature"`, ...).
    const DIMENSION: &'static str;

    /// Short symbol, identical to the serialized tag.
    fn symbol(self) -> &'static str;

    /// Convert a magnitude expressed in `self` into the dimension's base unit.
    fn to_base(self, magnitude: f64) -> f64;

    /// Convert a magnitude expressed in the base unit into `self`.
    fn from_base(self, magnitude: f64) -> f64;
}

/// Marker for dimensions where addition and scaling are physically meaningful.
///
/// Absolute temperatures are deliberately not additive.
pub trait Additive: Unit {}

// ---------------------------------------------------------------------------
// Unit tables
// ---------------------------------------------------------------------------

/// Volume units. Base: microliter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeUnit {
    #[serde(rename = "uL", alias = "µL", alias = "ul", alias = "microliter")]
    Microliter,
    #[serde(rename = "mL", alias = "ml", alias = "milliliter")]
    Milliliter,
    #[serde(rename = "L", alias = "l", alias = "liter")]
    Liter,
}

impl VolumeUnit {
    fn scale(self) -> f64 {
        match self {
            Self::Microliter => 1.0,
            Self::Milliliter => 1_000.0,
            Self::Liter => 1_000_000.0,
        }
    }
}

impl Unit for VolumeUnit {
    const DIMENSION: &'static str = "volume";

    fn symbol(self) -> &'static str {
        match self {
            Self::Microliter => "uL",
            Self::Milliliter => "mL",
            Self::Liter => "L",
        }
    }

    fn to_base(self, magnitude: f64) -> f64 {
        magnitude * self.scale()
    }

    fn from_base(self, magnitude: f64) -> f64 {
        magnitude / self.scale()
    }
}

impl Additive for VolumeUnit {}

/// Mass units. Base: milligram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MassUnit {
    #[serde(rename = "mg", alias = "milligram")]
    Milligram,
    #[serde(rename = "g", alias = "gram")]
    Gram,
}

impl MassUnit {
    fn scale(self) -> f64 {
        match self {
            Self::Milligram => 1.0,
            Self::Gram => 1_000.0,
        }
    }
}

impl Unit for MassUnit {
    const DIMENSION: &'static str = "mass";

    fn symbol(self) -> &'static str {
        match self {
            Self::Milligram => "mg",
            Self::Gram => "g",
        }
    }

    fn to_base(self, magnitude: f64) -> f64 {
        magnitude * self.scale()
    }

    fn from_base(self, magnitude: f64) -> f64 {
        magnitude / self.scale()
    }
}

impl Additive for MassUnit {}

/// Time units. Base: second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    #[serde(rename = "s", alias = "second")]
    Second,
    #[serde(rename = "min", alias = "minute")]
    Minute,
    #[serde(rename = "h", alias = "hour")]
    Hour,
}

impl TimeUnit {
    fn scale(self) -> f64 {
        match self {
            Self::Second => 1.0,
            Self::Minute => 60.0,
            Self::Hour => 3_600.0,
        }
    }
}

impl Unit for TimeUnit {
    const DIMENSION: &'static str = "time";

    fn symbol(self) -> &'static str {
        match self {
            Self::Second => "s",
            Self::Minute => "min",
            Self::Hour => "h",
        }
    }

    fn to_base(self, magnitude: f64) -> f64 {
        magnitude * self.scale()
    }

    fn from_base(self, magnitude: f64) -> f64 {
        magnitude / self.scale()
    }
}

impl Additive for TimeUnit {}

/// Absolute temperature units. Base: degree Celsius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[serde(rename = "C", alias = "°C", alias = "degC", alias = "celsius")]
    Celsius,
    #[serde(rename = "K", alias = "kelvin")]
    Kelvin,
}

const KELVIN_OFFSET: f64 = 273.15;

impl Unit for TemperatureUnit {
    const DIMENSION: &'static str = "temperature";

    fn symbol(self) -> &'static str {
        match self {
            Self::Celsius => "C",
            Self::Kelvin => "K",
        }
    }

    fn to_base(self, magnitude: f64) -> f64 {
        match self {
            Self::Celsius => magnitude,
            Self::Kelvin => magnitude - KELVIN_OFFSET,
        }
    }

    fn from_base(self, magnitude: f64) -> f64 {
        match self {
            Self::Celsius => magnitude,
            Self::Kelvin => magnitude + KELVIN_OFFSET,
        }
    }
}

// ---------------------------------------------------------------------------
// Quantity
// ---------------------------------------------------------------------------

/// A magnitude tagged with a unit of dimension `U`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct Quantity<U: Unit> {
    magnitude: f64,
    unit: U,
}

pub type Volume = Quantity<VolumeUnit>;
pub type Mass = Quantity<MassUnit>;
pub type Time = Quantity<TimeUnit>;
pub type Temperature = Quantity<TemperatureUnit>;

impl<U: Unit> Quantity<U> {
    pub fn new(magnitude: f64, unit: U) -> Self {
        Self { magnitude, unit }
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub fn unit(&self) -> U {
        self.unit
    }

    /// Express this quantity in `target`. Identity when already in `target`.
    pub fn to(self, target: U) -> Self {
        if target == self.unit {
            return self;
        }
        Self::new(target.from_base(self.unit.to_base(self.magnitude)), target)
    }

    /// Magnitude of this quantity expressed in `target`.
    pub fn value_in(self, target: U) -> f64 {
        self.to(target).magnitude
    }

    pub fn is_finite(&self) -> bool {
        self.magnitude.is_finite()
    }
}

impl<U: Additive> Quantity<U> {
    pub fn zero(unit: U) -> Self {
        Self::new(0.0, unit)
    }

    /// Strictly positive and finite.
    pub fn is_positive(&self) -> bool {
        self.magnitude.is_finite() && self.magnitude > 0.0
    }

    /// Smaller of two quantities, in `self`'s unit.
    pub fn min(self, other: Self) -> Self {
        let other = other.to(self.unit);
        if other.magnitude < self.magnitude { other } else { self }
    }
}

impl<U: Unit> PartialEq for Quantity<U> {
    fn eq(&self, other: &Self) -> bool {
        self.magnitude == other.value_in(self.unit)
    }
}

impl<U: Unit> PartialOrd for Quantity<U> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.magnitude.partial_cmp(&other.value_in(self.unit))
    }
}

impl<U: Additive> Add for Quantity<U> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.magnitude + rhs.value_in(self.unit), self.unit)
    }
}

impl<U: Additive> Sub for Quantity<U> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.magnitude - rhs.value_in(self.unit), self.unit)
    }
}

impl<U: Additive> Mul<f64> for Quantity<U> {
    type Output = Self;

    fn mul(self, factor: f64) -> Self {
        Self::new(self.magnitude * factor, self.unit)
    }
}

impl<U: Unit> fmt::Display for Quantity<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude, self.unit.symbol())
    }
}

impl Volume {
    pub fn microliters(magnitude: f64) -> Self {
        Self::new(magnitude, VolumeUnit::Microliter)
    }

    pub fn milliliters(magnitude: f64) -> Self {
        Self::new(magnitude, VolumeUnit::Milliliter)
    }

    pub fn liters(magnitude: f64) -> Self {
        Self::new(magnitude, VolumeUnit::Liter)
    }
}

impl Mass {
    pub fn milligrams(magnitude: f64) -> Self {
        Self::new(magnitude, MassUnit::Milligram)
    }

    pub fn grams(magnitude: f64) -> Self {
        Self::new(magnitude, MassUnit::Gram)
    }
}

impl Time {
    pub fn seconds(magnitude: f64) -> Self {
        Self::new(magnitude, TimeUnit::Second)
    }

    pub fn minutes(magnitude: f64) -> Self {
        Self::new(magnitude, TimeUnit::Minute)
    }

    pub fn hours(magnitude: f64) -> Self {
        Self::new(magnitude, TimeUnit::Hour)
    }
}

impl Temperature {
    pub fn celsius(magnitude: f64) -> Self {
        Self::new(magnitude, TemperatureUnit::Celsius)
    }

    pub fn kelvin(magnitude: f64) -> Self {
        Self::new(magnitude, TemperatureUnit::Kelvin)
    }

    /// Magnitude in degrees Celsius.
    pub fn as_celsius(self) -> f64 {
        self.value_in(TemperatureUnit::Celsius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_unit_conversion_is_identity() {
        let v = Volume::microliters(0.1 + 0.2);
        assert_eq!(v.to(VolumeUnit::Microliter).magnitude(), 0.1 + 0.2);
    }

    #[test]
    fn volume_scale_table() {
        assert_eq!(Volume::liters(1.0).value_in(VolumeUnit::Microliter), 1_000_000.0);
        assert_eq!(Volume::microliters(250.0).value_in(VolumeUnit::Milliliter), 0.25);
        assert_eq!(Volume::milliliters(1.0), Volume::microliters(1000.0));
    }

    #[test]
    fn temperature_offsets() {
        assert_eq!(Temperature::kelvin(373.15).as_celsius(), 100.0);
        assert_eq!(Temperature::celsius(0.0).value_in(TemperatureUnit::Kelvin), 273.15);
        assert!(Temperature::celsius(30.0) > Temperature::kelvin(300.0));
    }

    #[test]
    fn arithmetic_keeps_left_unit() {
        let total = Mass::grams(1.0) + Mass::milligrams(500.0);
        assert_eq!(total.unit(), MassUnit::Gram);
        assert_eq!(total.magnitude(), 1.5);

        let left = Time::minutes(2.0) - Time::seconds(30.0);
        assert_eq!(left.value_in(TimeUnit::Second), 90.0);
    }

    #[test]
    fn positivity() {
        assert!(Volume::microliters(1.0).is_positive());
        assert!(!Volume::microliters(0.0).is_positive());
        assert!(!Volume::microliters(-3.0).is_positive());
        assert!(!Volume::microliters(f64::NAN).is_positive());
    }

    #[test]
    fn serde_uses_short_tags_and_accepts_aliases() {
        let json = serde_json::to_string(&Volume::microliters(150.0)).unwrap();
        assert_eq!(json, r#"{"magnitude":150.0,"unit":"uL"}"#);

        let t: Temperature = serde_json::from_str(r#"{"magnitude":37,"unit":"degC"}"#).unwrap();
        assert_eq!(t, Temperature::celsius(37.0));
    }

    #[test]
    fn quantities_deserialize_in_generic_position() {
        fn parse<U: Unit>(json: &str) -> Vec<Quantity<U>> {
            serde_json::from_str(json).unwrap()
        }
        let masses: Vec<Mass> = parse(r#"[{"magnitude":2,"unit":"g"},{"magnitude":5,"unit":"mg"}]"#);
        assert_eq!(masses, vec![Mass::grams(2.0), Mass::milligrams(5.0)]);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(Volume::microliters(150.0).to_string(), "150 uL");
        assert_eq!(Temperature::celsius(-20.5).to_string(), "-20.5 C");
    }
}

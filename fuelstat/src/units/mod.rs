//! Unit conversion between liters, kilograms and metric tons.
//!
//! All conversions go through a product density in kg per liter:
//!
//! ```text
//! VOLUME:  liters = value          kg = value × density
//! MASS:    kg     = value          liters = value / density
//! always:  mt     = kg / 1000
//! ```
//!
//! Zero is a real "no activity" observation, so a zero value yields exactly
//! `0.0` in all three fields whatever the unit or density.

use serde::{Deserialize, Serialize};

use crate::error::ConversionError;
use crate::models::UnitHint;

/// Kilograms per metric ton.
pub const KG_PER_MT: f64 = 1000.0;

/// A value expressed in all three canonical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Volumes {
    pub liters: f64,
    pub kg: f64,
    pub mt: f64,
}

impl Volumes {
    pub const ZERO: Volumes = Volumes {
        liters: 0.0,
        kg: 0.0,
        mt: 0.0,
    };
}

fn check_density(density: f64) -> Result<(), ConversionError> {
    if density.is_finite() && density > 0.0 {
        Ok(())
    } else {
        Err(ConversionError::InvalidDensity(density))
    }
}

fn check_value(value: f64) -> Result<(), ConversionError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConversionError::InvalidValue(value))
    }
}

/// Convert `value` reported in `unit` to liters.
pub fn to_liters(value: f64, unit: UnitHint, density: f64) -> Result<f64, ConversionError> {
    check_density(density)?;
    check_value(value)?;
    match unit {
        UnitHint::Unknown => Err(ConversionError::InvalidUnit(unit.to_string())),
        _ if value == 0.0 => Ok(0.0),
        UnitHint::Volume => Ok(value),
        UnitHint::Mass => Ok(value / density),
    }
}

/// Convert `value` reported in `unit` to kilograms.
pub fn to_kg(value: f64, unit: UnitHint, density: f64) -> Result<f64, ConversionError> {
    check_density(density)?;
    check_value(value)?;
    match unit {
        UnitHint::Unknown => Err(ConversionError::InvalidUnit(unit.to_string())),
        _ if value == 0.0 => Ok(0.0),
        UnitHint::Volume => Ok(value * density),
        UnitHint::Mass => Ok(value),
    }
}

/// Kilograms to metric tons.
pub fn to_mt(kg: f64) -> f64 {
    if kg == 0.0 {
        0.0
    } else {
        kg / KG_PER_MT
    }
}

/// Convert one value into liters, kilograms and metric tons.
pub fn convert(value: f64, unit: UnitHint, density: f64) -> Result<Volumes, ConversionError> {
    let liters = to_liters(value, unit, density)?;
    let kg = to_kg(value, unit, density)?;
    Ok(Volumes {
        liters,
        kg,
        mt: to_mt(kg),
    })
}

/// Parse a unit tag, rejecting anything that is not a known code.
pub fn parse_unit(code: &str) -> Result<UnitHint, ConversionError> {
    UnitHint::from_code(code).ok_or_else(|| ConversionError::InvalidUnit(code.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_to_mass() {
        let v = convert(1000.0, UnitHint::Volume, 0.85).unwrap();
        assert_eq!(v.liters, 1000.0);
        assert!((v.kg - 850.0).abs() < 1e-9);
        assert!((v.mt - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_lpg_mass_scenario() {
        let v = convert(50_000.0, UnitHint::Mass, 0.54).unwrap();
        assert_eq!(v.kg, 50_000.0);
        assert!((v.liters - 92_592.592_592).abs() < 1e-3);
        assert_eq!(v.mt, 50.0);
    }

    #[test]
    fn test_zero_is_conserved() {
        for unit in [UnitHint::Volume, UnitHint::Mass] {
            for density in [0.54, 0.85, 1.3] {
                let v = convert(0.0, unit, density).unwrap();
                assert_eq!(v, Volumes::ZERO);
            }
        }
        // Negative zero must come out as plain zero too.
        let v = convert(-0.0, UnitHint::Volume, 0.74).unwrap();
        assert!(v.kg == 0.0 && v.kg.is_sign_positive());
    }

    #[test]
    fn test_volume_mass_volume_roundtrip() {
        for value in [0.001, 1.0, 1234.5678, 9.87e9] {
            let density = 0.745;
            let kg = to_kg(value, UnitHint::Volume, density).unwrap();
            let back = to_liters(kg, UnitHint::Mass, density).unwrap();
            assert!((back - value).abs() <= value * 1e-12);
        }
    }

    #[test]
    fn test_invalid_density() {
        assert_eq!(
            convert(10.0, UnitHint::Volume, 0.0),
            Err(ConversionError::InvalidDensity(0.0))
        );
        assert!(matches!(
            convert(10.0, UnitHint::Mass, -0.5),
            Err(ConversionError::InvalidDensity(_))
        ));
        assert!(matches!(
            convert(0.0, UnitHint::Mass, f64::NAN),
            Err(ConversionError::InvalidDensity(_))
        ));
    }

    #[test]
    fn test_invalid_unit_and_value() {
        assert!(matches!(
            convert(10.0, UnitHint::Unknown, 0.8),
            Err(ConversionError::InvalidUnit(_))
        ));
        assert!(matches!(
            convert(-1.0, UnitHint::Volume, 0.8),
            Err(ConversionError::InvalidValue(_))
        ));
        assert!(matches!(parse_unit("barrels"), Err(ConversionError::InvalidUnit(_))));
        assert_eq!(parse_unit("KG").unwrap(), UnitHint::Mass);
    }
}

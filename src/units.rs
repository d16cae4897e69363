//! Scalar quantities shared across the request model
//!
//! Wavelengths are stored as integer **picometers** and durations as integer
//! **microseconds** so that logically equal requests have bit-identical
//! encodings (the cache key is a hash of those encodings). Converting
//! constructors round half-up from the unit the client supplied.

use serde::{Deserialize, Serialize};

/// Speed of light, m/s. Used to turn a radial velocity into a redshift.
pub const SPEED_OF_LIGHT_MPS: f64 = 299_792_458.0;

// ============================================================================
// Wavelength
// ============================================================================

/// A wavelength, positive, carried as integer picometers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Wavelength {
    picometers: i64,
}

impl Wavelength {
    /// Build from integer picometers.
    pub fn from_picometers(picometers: i64) -> Self {
        Self { picometers }
    }

    /// Build from a decimal value in ångströms (1 Å = 100 pm).
    pub fn from_angstroms(angstroms: f64) -> Self {
        Self { picometers: (angstroms * 1e2).round() as i64 }
    }

    /// Build from a decimal value in nanometers (1 nm = 1000 pm).
    pub fn from_nanometers(nanometers: f64) -> Self {
        Self { picometers: (nanometers * 1e3).round() as i64 }
    }

    /// Build from a decimal value in micrometers (1 µm = 10⁶ pm).
    pub fn from_micrometers(micrometers: f64) -> Self {
        Self { picometers: (micrometers * 1e6).round() as i64 }
    }

    /// The exact stored value in picometers.
    pub fn as_picometers(self) -> i64 {
        self.picometers
    }

    /// The value in ångströms.
    pub fn as_angstroms(self) -> f64 {
        self.picometers as f64 / 1e2
    }

    /// The value in nanometers. This is the unit the legacy document and the
    /// graph series use.
    pub fn as_nanometers(self) -> f64 {
        self.picometers as f64 / 1e3
    }

    /// The value in micrometers.
    pub fn as_micrometers(self) -> f64 {
        self.picometers as f64 / 1e6
    }
}

impl std::fmt::Display for Wavelength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} nm", self.as_nanometers())
    }
}

// ============================================================================
// TimeSpan
// ============================================================================

/// A non-negative duration carried as integer microseconds.
///
/// Exposure durations reach the legacy calculator as decimal seconds but are
/// normalised here first so equal requests hash equally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeSpan {
    microseconds: u64,
}

impl TimeSpan {
    /// Build from whole seconds.
    pub fn from_secs(seconds: u64) -> Self {
        Self { microseconds: seconds * 1_000_000 }
    }

    /// Build from decimal seconds. `None` for negative or non-finite input.
    pub fn from_secs_f64(seconds: f64) -> Option<Self> {
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        Some(Self { microseconds: (seconds * 1e6).round() as u64 })
    }

    /// Build from decimal milliseconds. `None` for negative or non-finite input.
    pub fn from_millis_f64(milliseconds: f64) -> Option<Self> {
        Self::from_secs_f64(milliseconds / 1e3)
    }

    /// The exact stored value in microseconds.
    pub fn as_micros(self) -> u64 {
        self.microseconds
    }

    /// The value in decimal seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.microseconds as f64 / 1e6
    }

    /// The value in decimal milliseconds.
    pub fn as_millis_f64(self) -> f64 {
        self.microseconds as f64 / 1e3
    }
}

// ============================================================================
// RadialVelocity
// ============================================================================

/// A radial velocity, m/s, positive away from the observer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadialVelocity {
    meters_per_second: f64,
}

impl RadialVelocity {
    /// Build from meters per second.
    pub fn from_meters_per_second(mps: f64) -> Self {
        Self { meters_per_second: mps }
    }

    /// Build from centimeters per second.
    pub fn from_centimeters_per_second(cmps: f64) -> Self {
        Self { meters_per_second: cmps / 1e2 }
    }

    /// Build from kilometers per second.
    pub fn from_kilometers_per_second(kmps: f64) -> Self {
        Self { meters_per_second: kmps * 1e3 }
    }

    /// The value in meters per second.
    pub fn as_meters_per_second(self) -> f64 {
        self.meters_per_second
    }

    /// The relativistic redshift `z = √((1+β)/(1−β)) − 1` with
    /// `β = v/c`. Requires `|v| < c`; callers validate that at coercion.
    pub fn redshift(self) -> f64 {
        let beta = self.meters_per_second / SPEED_OF_LIGHT_MPS;
        ((1.0 + beta) / (1.0 - beta)).sqrt() - 1.0
    }
}

// ============================================================================
// Angle
// ============================================================================

/// A small angle (source FWHM, slit widths), integer microarcseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Angle {
    microarcseconds: i64,
}

impl Angle {
    /// Build from integer microarcseconds.
    pub fn from_microarcseconds(microarcseconds: i64) -> Self {
        Self { microarcseconds }
    }

    /// Build from decimal milliarcseconds.
    pub fn from_milliarcseconds(mas: f64) -> Self {
        Self { microarcseconds: (mas * 1e3).round() as i64 }
    }

    /// Build from decimal arcseconds.
    pub fn from_arcseconds(arcsec: f64) -> Self {
        Self { microarcseconds: (arcsec * 1e6).round() as i64 }
    }

    /// The value in decimal arcseconds.
    pub fn as_arcseconds(self) -> f64 {
        self.microarcseconds as f64 / 1e6
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wavelength_units_share_a_base() {
        let w = Wavelength::from_nanometers(500.0);
        assert_eq!(w.as_picometers(), 500_000);
        assert_eq!(w, Wavelength::from_angstroms(5000.0));
        assert_eq!(w, Wavelength::from_micrometers(0.5));
        assert_eq!(w.as_nanometers(), 500.0);
    }

    #[test]
    fn wavelength_rounds_sub_picometer_input() {
        // 0.0004 nm = 0.4 pm rounds to 0; 0.0006 nm rounds to 1 pm.
        assert_eq!(Wavelength::from_nanometers(0.0004).as_picometers(), 0);
        assert_eq!(Wavelength::from_nanometers(0.0006).as_picometers(), 1);
    }

    #[test]
    fn timespan_accepts_fractional_milliseconds() {
        let t = TimeSpan::from_millis_f64(2.5).unwrap();
        assert_eq!(t.as_micros(), 2_500);
        assert_eq!(t.as_secs_f64(), 0.0025);
        assert!(TimeSpan::from_secs_f64(-1.0).is_none());
        assert!(TimeSpan::from_secs_f64(f64::NAN).is_none());
    }

    #[test]
    fn redshift_is_zero_at_rest_and_positive_receding() {
        assert_eq!(RadialVelocity::from_meters_per_second(0.0).redshift(), 0.0);
        let z = RadialVelocity::from_kilometers_per_second(300.0).redshift();
        // Non-relativistic regime: z ≈ v/c within a part in a thousand.
        assert!((z - 0.001).abs() < 1e-5, "z = {z}");
        assert!(RadialVelocity::from_kilometers_per_second(-300.0).redshift() < 0.0);
    }

    #[test]
    fn angle_round_trip() {
        let a = Angle::from_arcseconds(0.75);
        assert_eq!(a.as_arcseconds(), 0.75);
        assert_eq!(a, Angle::from_milliarcseconds(750.0));
    }
}

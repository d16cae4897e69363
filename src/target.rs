//! Target description: spatial profile, spectral energy distribution, brightness
//!
//! The coerced form kept here is already **normalised**: of the brightness
//! entries a client may supply, only the one matching the requested band
//! survives coercion, so requests that differ solely in unused brightnesses
//! hash to the same cache key.

use async_graphql::Enum;
use serde::{Deserialize, Serialize};

use crate::units::{Angle, RadialVelocity, Wavelength};

/// Spatial shape of the source on the sky.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SourceGeometry {
    /// Unresolved point source.
    Point,
    /// Uniform surface brightness, larger than the aperture.
    Uniform,
    /// Gaussian profile with the given full width at half maximum.
    Gaussian {
        /// Full width at half maximum.
        fwhm: Angle,
    },
}

/// Library spectra the kernel ships. The subset offered for GMOS.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum StellarLibrarySpectrum {
    /// O5 dwarf.
    O5V,
    /// B0 dwarf.
    B0V,
    /// B5 giant.
    B5III,
    /// A0 dwarf.
    A0V,
    /// A5 giant.
    A5III,
    /// F0 dwarf.
    F0V,
    /// G0 dwarf.
    G0V,
    /// G2 dwarf (solar analogue).
    G2V,
    /// K0 giant.
    K0III,
    /// K4 dwarf.
    K4V,
    /// M0 dwarf.
    M0V,
    /// M6 dwarf.
    M6V,
}

/// Spectral energy distribution of a band-normalised source.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpectralDistribution {
    /// One of the bundled library templates.
    Library {
        /// The template to use.
        template: StellarLibrarySpectrum,
    },
    /// Black body at the given temperature.
    BlackBody {
        /// Temperature in kelvin, positive.
        temperature_k: f64,
    },
    /// Power law `F(λ) ∝ λ^index`.
    PowerLaw {
        /// The exponent; may be negative.
        index: f64,
    },
}

/// Photometric bands accepted for normalisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum Band {
    /// Sloan u′.
    SloanU,
    /// Sloan g′.
    SloanG,
    /// Sloan r′.
    SloanR,
    /// Sloan i′.
    SloanI,
    /// Sloan z′.
    SloanZ,
    /// Johnson U.
    U,
    /// Johnson B.
    B,
    /// Johnson V.
    V,
    /// Cousins R.
    R,
    /// Cousins I.
    I,
    /// Near-infrared J.
    J,
    /// Near-infrared H.
    H,
    /// Near-infrared K.
    K,
}

/// Unit system of a brightness value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum BrightnessUnit {
    /// Vega magnitudes.
    VegaMagnitude,
    /// AB magnitudes.
    AbMagnitude,
    /// Flux density in jansky.
    Jansky,
}

/// A brightness in one band.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandBrightness {
    /// The band the value refers to.
    pub band: Band,
    /// Magnitude or flux density, in `units`.
    pub value: f64,
    /// Unit system of `value`.
    pub units: BrightnessUnit,
}

/// A single emission line on a flat continuum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmissionLine {
    /// Rest wavelength of the line.
    pub wavelength: Wavelength,
    /// Line width, km/s, positive.
    pub line_width_kms: f64,
    /// Integrated line flux, W/m².
    pub line_flux: f64,
    /// Continuum flux density, W/m²/µm.
    pub continuum: f64,
}

/// How the spectrum is specified.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SpectralDefinition {
    /// An SED scaled to match one measured brightness.
    BandNormalized {
        /// The distribution shape.
        sed: SpectralDistribution,
        /// The brightness selected for the requested band (normalised form
        /// keeps exactly one).
        brightness: BandBrightness,
    },
    /// An emission line over a flat continuum.
    EmissionLine(EmissionLine),
}

/// The complete target description a calculation request carries.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetProfile {
    /// Spatial shape.
    pub geometry: SourceGeometry,
    /// Spectral shape and normalisation.
    pub spectral: SpectralDefinition,
    /// Radial velocity; the kernel receives the derived redshift.
    pub radial_velocity: RadialVelocity,
}

impl TargetProfile {
    /// Redshift handed to the kernel, derived from the radial velocity.
    pub fn redshift(&self) -> f64 {
        self.radial_velocity.redshift()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redshift_follows_radial_velocity() {
        let t = TargetProfile {
            geometry: SourceGeometry::Point,
            spectral: SpectralDefinition::BandNormalized {
                sed: SpectralDistribution::Library { template: StellarLibrarySpectrum::G2V },
                brightness: BandBrightness {
                    band: Band::R,
                    value: 15.0,
                    units: BrightnessUnit::VegaMagnitude,
                },
            },
            radial_velocity: RadialVelocity::from_kilometers_per_second(0.0),
        };
        assert_eq!(t.redshift(), 0.0);
    }
}

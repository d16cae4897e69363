//! GMOS observing modes and their instrument tables
//!
//! Gratings, filters, and focal-plane units are enumerated exactly as the
//! legacy calculator names them (the serde names below are the wire names in
//! the canonical document). Derived attributes — dispersion, simultaneous
//! coverage, resolving power — come from small per-grating tables; the
//! resolving power reference values are quoted for a 0.5″ slit and scale
//! inversely with the actual slit width.

#![allow(missing_docs)]

use async_graphql::Enum;
use serde::{Deserialize, Serialize};

use crate::units::{Angle, Wavelength};

// ============================================================================
// Gratings
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum GmosNorthGrating {
    #[graphql(name = "B1200_G5301")]
    #[serde(rename = "B1200_G5301")]
    B1200G5301,
    #[graphql(name = "R831_G5302")]
    #[serde(rename = "R831_G5302")]
    R831G5302,
    #[graphql(name = "B600_G5303")]
    #[serde(rename = "B600_G5303")]
    B600G5303,
    #[graphql(name = "B600_G5307")]
    #[serde(rename = "B600_G5307")]
    B600G5307,
    #[graphql(name = "R600_G5304")]
    #[serde(rename = "R600_G5304")]
    R600G5304,
    #[graphql(name = "R400_G5305")]
    #[serde(rename = "R400_G5305")]
    R400G5305,
    #[graphql(name = "R150_G5306")]
    #[serde(rename = "R150_G5306")]
    R150G5306,
    #[graphql(name = "R150_G5308")]
    #[serde(rename = "R150_G5308")]
    R150G5308,
}

impl GmosNorthGrating {
    /// Dispersion at the detector, nm per pixel.
    pub fn dispersion_nm_per_px(self) -> f64 {
        use GmosNorthGrating::*;
        match self {
            B1200G5301 => 0.026,
            R831G5302 => 0.038,
            B600G5303 | B600G5307 => 0.050,
            R600G5304 => 0.052,
            R400G5305 => 0.074,
            R150G5306 | R150G5308 => 0.193,
        }
    }

    /// Simultaneous wavelength coverage, nm.
    pub fn coverage_nm(self) -> f64 {
        use GmosNorthGrating::*;
        match self {
            B1200G5301 => 164.0,
            R831G5302 => 235.0,
            B600G5303 | B600G5307 => 307.0,
            R600G5304 => 318.0,
            R400G5305 => 462.0,
            R150G5306 | R150G5308 => 1190.0,
        }
    }

    /// Resolving power λ/Δλ with a 0.5″ slit.
    pub fn reference_resolution(self) -> f64 {
        use GmosNorthGrating::*;
        match self {
            B1200G5301 => 3744.0,
            R831G5302 => 4396.0,
            B600G5303 | B600G5307 => 1688.0,
            R600G5304 => 3744.0,
            R400G5305 => 1918.0,
            R150G5306 | R150G5308 => 631.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum GmosSouthGrating {
    #[graphql(name = "B1200_G5321")]
    #[serde(rename = "B1200_G5321")]
    B1200G5321,
    #[graphql(name = "R831_G5322")]
    #[serde(rename = "R831_G5322")]
    R831G5322,
    #[graphql(name = "B600_G5323")]
    #[serde(rename = "B600_G5323")]
    B600G5323,
    #[graphql(name = "R600_G5324")]
    #[serde(rename = "R600_G5324")]
    R600G5324,
    #[graphql(name = "R400_G5325")]
    #[serde(rename = "R400_G5325")]
    R400G5325,
    #[graphql(name = "R150_G5326")]
    #[serde(rename = "R150_G5326")]
    R150G5326,
}

impl GmosSouthGrating {
    /// Dispersion at the detector, nm per pixel.
    pub fn dispersion_nm_per_px(self) -> f64 {
        use GmosSouthGrating::*;
        match self {
            B1200G5321 => 0.026,
            R831G5322 => 0.038,
            B600G5323 => 0.050,
            R600G5324 => 0.052,
            R400G5325 => 0.074,
            R150G5326 => 0.193,
        }
    }

    /// Simultaneous wavelength coverage, nm.
    pub fn coverage_nm(self) -> f64 {
        use GmosSouthGrating::*;
        match self {
            B1200G5321 => 164.0,
            R831G5322 => 235.0,
            B600G5323 => 307.0,
            R600G5324 => 318.0,
            R400G5325 => 462.0,
            R150G5326 => 1190.0,
        }
    }

    /// Resolving power λ/Δλ with a 0.5″ slit.
    pub fn reference_resolution(self) -> f64 {
        use GmosSouthGrating::*;
        match self {
            B1200G5321 => 3744.0,
            R831G5322 => 4396.0,
            B600G5323 => 1688.0,
            R600G5324 => 3744.0,
            R400G5325 => 1918.0,
            R150G5326 => 631.0,
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum GmosNorthFilter {
    #[graphql(name = "U_PRIME")]
    #[serde(rename = "U_PRIME")]
    UPrime,
    #[graphql(name = "G_PRIME")]
    #[serde(rename = "G_PRIME")]
    GPrime,
    #[graphql(name = "R_PRIME")]
    #[serde(rename = "R_PRIME")]
    RPrime,
    #[graphql(name = "I_PRIME")]
    #[serde(rename = "I_PRIME")]
    IPrime,
    #[graphql(name = "Z_PRIME")]
    #[serde(rename = "Z_PRIME")]
    ZPrime,
    Z,
    Y,
    #[graphql(name = "GG455")]
    #[serde(rename = "GG455")]
    Gg455,
    #[graphql(name = "OG515")]
    #[serde(rename = "OG515")]
    Og515,
    #[graphql(name = "RG610")]
    #[serde(rename = "RG610")]
    Rg610,
    #[graphql(name = "CA_T")]
    #[serde(rename = "CA_T")]
    CaT,
    #[graphql(name = "HARTMANN_A_RG610")]
    #[serde(rename = "HARTMANN_A_RG610")]
    HartmannARg610,
    #[graphql(name = "HA")]
    #[serde(rename = "HA")]
    Ha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum GmosSouthFilter {
    #[graphql(name = "U_PRIME")]
    #[serde(rename = "U_PRIME")]
    UPrime,
    #[graphql(name = "G_PRIME")]
    #[serde(rename = "G_PRIME")]
    GPrime,
    #[graphql(name = "R_PRIME")]
    #[serde(rename = "R_PRIME")]
    RPrime,
    #[graphql(name = "I_PRIME")]
    #[serde(rename = "I_PRIME")]
    IPrime,
    #[graphql(name = "Z_PRIME")]
    #[serde(rename = "Z_PRIME")]
    ZPrime,
    Z,
    Y,
    #[graphql(name = "GG455")]
    #[serde(rename = "GG455")]
    Gg455,
    #[graphql(name = "OG515")]
    #[serde(rename = "OG515")]
    Og515,
    #[graphql(name = "RG610")]
    #[serde(rename = "RG610")]
    Rg610,
    #[graphql(name = "RG780")]
    #[serde(rename = "RG780")]
    Rg780,
    #[graphql(name = "CA_T")]
    #[serde(rename = "CA_T")]
    CaT,
    #[graphql(name = "HA")]
    #[serde(rename = "HA")]
    Ha,
}

// ============================================================================
// Focal-plane units
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum GmosNorthBuiltinFpu {
    #[graphql(name = "LONG_SLIT_0_25")]
    #[serde(rename = "LONG_SLIT_0_25")]
    LongSlit0_25,
    #[graphql(name = "LONG_SLIT_0_50")]
    #[serde(rename = "LONG_SLIT_0_50")]
    LongSlit0_50,
    #[graphql(name = "LONG_SLIT_0_75")]
    #[serde(rename = "LONG_SLIT_0_75")]
    LongSlit0_75,
    #[graphql(name = "LONG_SLIT_1_00")]
    #[serde(rename = "LONG_SLIT_1_00")]
    LongSlit1_00,
    #[graphql(name = "LONG_SLIT_1_50")]
    #[serde(rename = "LONG_SLIT_1_50")]
    LongSlit1_50,
    #[graphql(name = "LONG_SLIT_2_00")]
    #[serde(rename = "LONG_SLIT_2_00")]
    LongSlit2_00,
    #[graphql(name = "LONG_SLIT_5_00")]
    #[serde(rename = "LONG_SLIT_5_00")]
    LongSlit5_00,
}

impl GmosNorthBuiltinFpu {
    pub fn slit_width(self) -> Angle {
        use GmosNorthBuiltinFpu::*;
        let arcsec = match self {
            LongSlit0_25 => 0.25,
            LongSlit0_50 => 0.50,
            LongSlit0_75 => 0.75,
            LongSlit1_00 => 1.00,
            LongSlit1_50 => 1.50,
            LongSlit2_00 => 2.00,
            LongSlit5_00 => 5.00,
        };
        Angle::from_arcseconds(arcsec)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Enum, Serialize, Deserialize)]
pub enum GmosSouthBuiltinFpu {
    #[graphql(name = "LONG_SLIT_0_25")]
    #[serde(rename = "LONG_SLIT_0_25")]
    LongSlit0_25,
    #[graphql(name = "LONG_SLIT_0_50")]
    #[serde(rename = "LONG_SLIT_0_50")]
    LongSlit0_50,
    #[graphql(name = "LONG_SLIT_0_75")]
    #[serde(rename = "LONG_SLIT_0_75")]
    LongSlit0_75,
    #[graphql(name = "LONG_SLIT_1_00")]
    #[serde(rename = "LONG_SLIT_1_00")]
    LongSlit1_00,
    #[graphql(name = "LONG_SLIT_1_50")]
    #[serde(rename = "LONG_SLIT_1_50")]
    LongSlit1_50,
    #[graphql(name = "LONG_SLIT_2_00")]
    #[serde(rename = "LONG_SLIT_2_00")]
    LongSlit2_00,
    #[graphql(name = "LONG_SLIT_5_00")]
    #[serde(rename = "LONG_SLIT_5_00")]
    LongSlit5_00,
}

impl GmosSouthBuiltinFpu {
    pub fn slit_width(self) -> Angle {
        use GmosSouthBuiltinFpu::*;
        let arcsec = match self {
            LongSlit0_25 => 0.25,
            LongSlit0_50 => 0.50,
            LongSlit0_75 => 0.75,
            LongSlit1_00 => 1.00,
            LongSlit1_50 => 1.50,
            LongSlit2_00 => 2.00,
            LongSlit5_00 => 5.00,
        };
        Angle::from_arcseconds(arcsec)
    }
}

/// A custom-cut mask with a known slit width.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GmosCustomMask {
    /// ODF file name of the mask design.
    pub filename: String,
    /// Width of the cut slit.
    pub slit_width: Angle,
}

/// Built-in or custom focal-plane unit, per site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GmosFpu<B> {
    /// One of the permanently mounted units.
    Builtin(B),
    /// A custom mask.
    Custom(GmosCustomMask),
}

impl GmosFpu<GmosNorthBuiltinFpu> {
    pub fn slit_width(&self) -> Angle {
        match self {
            GmosFpu::Builtin(b) => b.slit_width(),
            GmosFpu::Custom(m) => m.slit_width,
        }
    }
}

impl GmosFpu<GmosSouthBuiltinFpu> {
    pub fn slit_width(&self) -> Angle {
        match self {
            GmosFpu::Builtin(b) => b.slit_width(),
            GmosFpu::Custom(m) => m.slit_width,
        }
    }
}

// ============================================================================
// Observing mode
// ============================================================================

/// The instrument configuration of a calculation request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObservingMode {
    GmosNorthSpectroscopy {
        grating: GmosNorthGrating,
        fpu: GmosFpu<GmosNorthBuiltinFpu>,
        filter: Option<GmosNorthFilter>,
        central_wavelength: Wavelength,
    },
    GmosSouthSpectroscopy {
        grating: GmosSouthGrating,
        fpu: GmosFpu<GmosSouthBuiltinFpu>,
        filter: Option<GmosSouthFilter>,
        central_wavelength: Wavelength,
    },
    GmosNorthImaging {
        filter: GmosNorthFilter,
    },
    GmosSouthImaging {
        filter: GmosSouthFilter,
    },
}

impl ObservingMode {
    /// Legacy instrument identifier.
    pub fn instrument(&self) -> &'static str {
        match self {
            ObservingMode::GmosNorthSpectroscopy { .. } | ObservingMode::GmosNorthImaging { .. } => {
                "GMOS_NORTH"
            }
            ObservingMode::GmosSouthSpectroscopy { .. } | ObservingMode::GmosSouthImaging { .. } => {
                "GMOS_SOUTH"
            }
        }
    }

    /// Legacy site identifier.
    pub fn site(&self) -> &'static str {
        match self {
            ObservingMode::GmosNorthSpectroscopy { .. } | ObservingMode::GmosNorthImaging { .. } => {
                "MAUNA_KEA"
            }
            ObservingMode::GmosSouthSpectroscopy { .. } | ObservingMode::GmosSouthImaging { .. } => {
                "CERRO_PACHON"
            }
        }
    }

    /// True for the imaging variants.
    pub fn is_imaging(&self) -> bool {
        matches!(
            self,
            ObservingMode::GmosNorthImaging { .. } | ObservingMode::GmosSouthImaging { .. }
        )
    }

    /// Slit width, spectroscopy only.
    pub fn slit_width(&self) -> Option<Angle> {
        match self {
            ObservingMode::GmosNorthSpectroscopy { fpu, .. } => Some(fpu.slit_width()),
            ObservingMode::GmosSouthSpectroscopy { fpu, .. } => Some(fpu.slit_width()),
            _ => None,
        }
    }

    /// Resolving power for the configured grating and slit, spectroscopy only.
    pub fn resolution(&self) -> Option<f64> {
        let (reference, slit) = match self {
            ObservingMode::GmosNorthSpectroscopy { grating, fpu, .. } => {
                (grating.reference_resolution(), fpu.slit_width())
            }
            ObservingMode::GmosSouthSpectroscopy { grating, fpu, .. } => {
                (grating.reference_resolution(), fpu.slit_width())
            }
            _ => return None,
        };
        let arcsec = slit.as_arcseconds();
        if arcsec <= 0.0 {
            return None;
        }
        Some(reference * 0.5 / arcsec)
    }

    /// Wavelength interval covered in one setting, spectroscopy only.
    pub fn coverage(&self) -> Option<(Wavelength, Wavelength)> {
        let (coverage_nm, central) = match self {
            ObservingMode::GmosNorthSpectroscopy { grating, central_wavelength, .. } => {
                (grating.coverage_nm(), *central_wavelength)
            }
            ObservingMode::GmosSouthSpectroscopy { grating, central_wavelength, .. } => {
                (grating.coverage_nm(), *central_wavelength)
            }
            _ => return None,
        };
        let half = coverage_nm / 2.0;
        let c = central.as_nanometers();
        Some((
            Wavelength::from_nanometers((c - half).max(0.0)),
            Wavelength::from_nanometers(c + half),
        ))
    }

    /// Dispersion in nm per pixel, spectroscopy only.
    pub fn dispersion_nm_per_px(&self) -> Option<f64> {
        match self {
            ObservingMode::GmosNorthSpectroscopy { grating, .. } => {
                Some(grating.dispersion_nm_per_px())
            }
            ObservingMode::GmosSouthSpectroscopy { grating, .. } => {
                Some(grating.dispersion_nm_per_px())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn north_spec(fpu: GmosFpu<GmosNorthBuiltinFpu>) -> ObservingMode {
        ObservingMode::GmosNorthSpectroscopy {
            grating: GmosNorthGrating::B1200G5301,
            fpu,
            filter: None,
            central_wavelength: Wavelength::from_nanometers(500.0),
        }
    }

    #[test]
    fn resolution_scales_inversely_with_slit_width() {
        let half = north_spec(GmosFpu::Builtin(GmosNorthBuiltinFpu::LongSlit0_50));
        let one = north_spec(GmosFpu::Builtin(GmosNorthBuiltinFpu::LongSlit1_00));
        assert_eq!(half.resolution(), Some(3744.0));
        assert_eq!(one.resolution(), Some(1872.0));
    }

    #[test]
    fn custom_mask_uses_its_own_width() {
        let m = north_spec(GmosFpu::Custom(GmosCustomMask {
            filename: "GN2026A-001-01".into(),
            slit_width: Angle::from_arcseconds(0.25),
        }));
        assert_eq!(m.resolution(), Some(2.0 * 3744.0));
    }

    #[test]
    fn coverage_is_centred_and_clamped_at_zero() {
        let m = north_spec(GmosFpu::Builtin(GmosNorthBuiltinFpu::LongSlit0_25));
        let (lo, hi) = m.coverage().unwrap();
        assert_eq!(lo.as_nanometers(), 418.0);
        assert_eq!(hi.as_nanometers(), 582.0);

        let near_zero = ObservingMode::GmosNorthSpectroscopy {
            grating: GmosNorthGrating::R150G5306,
            fpu: GmosFpu::Builtin(GmosNorthBuiltinFpu::LongSlit0_25),
            filter: None,
            central_wavelength: Wavelength::from_nanometers(60.0),
        };
        let (lo, _) = near_zero.coverage().unwrap();
        assert_eq!(lo.as_nanometers(), 0.0);
    }

    #[test]
    fn imaging_has_no_spectroscopic_attributes() {
        let m = ObservingMode::GmosNorthImaging { filter: GmosNorthFilter::GPrime };
        assert!(m.is_imaging());
        assert_eq!(m.resolution(), None);
        assert_eq!(m.coverage(), None);
        assert_eq!(m.slit_width(), None);
    }
}

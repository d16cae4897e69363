//! GraphQL surface
//!
//! Input objects mirror the public schema: unit-tagged quantities are oneof
//! objects (exactly one member), instrument modes and source profiles are
//! oneof variants, and every input is coerced into the normalised domain
//! types before it reaches the orchestrator. Coercion collects *all*
//! problems it finds and returns them as a single validation error, so a
//! client sees every broken field at once rather than one per round-trip.
//!
//! Domain failures from the orchestrator are mapped onto GraphQL errors with
//! a stable `code` extension alongside the human-readable message.

#![allow(missing_docs)]

use async_graphql::{
    Context, EmptyMutation, EmptySubscription, ErrorExtensions, InputObject, Object, OneofObject,
    Schema, SimpleObject,
};
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::conditions::{
    AirMassBucket, CloudExtinction, ImageQuality, ObservingConditions, SkyBackground, WaterVapor,
};
use crate::graph::{ItcCcd, SeriesGroup, SignificantFigures};
use crate::legacy::LegacyItc;
use crate::mode::{
    GmosCustomMask, GmosFpu, GmosNorthBuiltinFpu, GmosNorthFilter, GmosNorthGrating,
    GmosSouthBuiltinFpu, GmosSouthFilter, GmosSouthGrating, ObservingMode,
};
use crate::service::{
    ImagingTimeRequest, Itc, ItcResponse, SpectroscopyGraphRequest, SpectroscopyGraphs,
    SpectroscopyTimeRequest,
};
use crate::target::{
    Band, BandBrightness, BrightnessUnit, EmissionLine, SourceGeometry, SpectralDefinition,
    SpectralDistribution, StellarLibrarySpectrum, TargetProfile,
};
use crate::units::{Angle, RadialVelocity, TimeSpan, Wavelength, SPEED_OF_LIGHT_MPS};
use crate::{IntegrationTime, ItcError, ItcVersions};

/// The orchestrator type the schema serves.
pub type AppItc = Itc<LegacyItc, CacheStore>;

/// The executable schema.
pub type ItcSchema = Schema<QueryRoot, EmptyMutation, EmptySubscription>;

/// Build the schema with the orchestrator injected as context data.
pub fn build_schema(itc: Arc<AppItc>) -> ItcSchema {
    Schema::build(QueryRoot, EmptyMutation, EmptySubscription)
        .data(itc)
        .finish()
}

// ============================================================================
// Unit-tagged inputs
// ============================================================================

#[derive(OneofObject)]
pub enum WavelengthInput {
    Picometers(i64),
    Angstroms(f64),
    Nanometers(f64),
    Micrometers(f64),
}

impl WavelengthInput {
    fn coerce(&self, field: &str, problems: &mut Vec<String>) -> Option<Wavelength> {
        let w = match *self {
            WavelengthInput::Picometers(pm) => Wavelength::from_picometers(pm),
            WavelengthInput::Angstroms(a) => Wavelength::from_angstroms(a),
            WavelengthInput::Nanometers(nm) => Wavelength::from_nanometers(nm),
            WavelengthInput::Micrometers(um) => Wavelength::from_micrometers(um),
        };
        if w.as_picometers() <= 0 {
            problems.push(format!("{field}: wavelength must be positive"));
            return None;
        }
        Some(w)
    }
}

#[derive(OneofObject)]
pub enum RadialVelocityInput {
    CentimetersPerSecond(f64),
    MetersPerSecond(f64),
    KilometersPerSecond(f64),
}

impl RadialVelocityInput {
    fn coerce(&self, problems: &mut Vec<String>) -> Option<RadialVelocity> {
        let rv = match *self {
            RadialVelocityInput::CentimetersPerSecond(v) => {
                RadialVelocity::from_centimeters_per_second(v)
            }
            RadialVelocityInput::MetersPerSecond(v) => RadialVelocity::from_meters_per_second(v),
            RadialVelocityInput::KilometersPerSecond(v) => {
                RadialVelocity::from_kilometers_per_second(v)
            }
        };
        let mps = rv.as_meters_per_second();
        if !mps.is_finite() || mps.abs() >= SPEED_OF_LIGHT_MPS {
            problems.push("radialVelocity: must be finite and slower than light".into());
            return None;
        }
        Some(rv)
    }
}

#[derive(OneofObject)]
pub enum DurationInput {
    Milliseconds(f64),
    Seconds(f64),
    Minutes(f64),
    Hours(f64),
}

impl DurationInput {
    fn coerce(&self, field: &str, problems: &mut Vec<String>) -> Option<TimeSpan> {
        let seconds = match *self {
            DurationInput::Milliseconds(v) => v / 1e3,
            DurationInput::Seconds(v) => v,
            DurationInput::Minutes(v) => v * 60.0,
            DurationInput::Hours(v) => v * 3600.0,
        };
        match TimeSpan::from_secs_f64(seconds).filter(|t| t.as_micros() > 0) {
            Some(t) => Some(t),
            None => {
                problems.push(format!("{field}: duration must be positive"));
                None
            }
        }
    }
}

#[derive(OneofObject)]
pub enum AngleInput {
    Microarcseconds(i64),
    Milliarcseconds(f64),
    Arcseconds(f64),
}

impl AngleInput {
    fn coerce_positive(&self, field: &str, problems: &mut Vec<String>) -> Option<Angle> {
        let angle = match *self {
            AngleInput::Microarcseconds(uas) => Angle::from_microarcseconds(uas),
            AngleInput::Milliarcseconds(mas) => Angle::from_milliarcseconds(mas),
            AngleInput::Arcseconds(arcsec) => Angle::from_arcseconds(arcsec),
        };
        if angle.as_arcseconds() <= 0.0 {
            problems.push(format!("{field}: angle must be positive"));
            return None;
        }
        Some(angle)
    }
}

// ============================================================================
// Source profile inputs
// ============================================================================

#[derive(OneofObject)]
pub enum SedInput {
    StellarLibrary(StellarLibrarySpectrum),
    BlackBodyTempK(f64),
    PowerLawIndex(f64),
}

impl SedInput {
    fn coerce(&self, problems: &mut Vec<String>) -> Option<SpectralDistribution> {
        match *self {
            SedInput::StellarLibrary(template) => {
                Some(SpectralDistribution::Library { template })
            }
            SedInput::BlackBodyTempK(t) => {
                if !t.is_finite() || t <= 0.0 {
                    problems.push("sed.blackBodyTempK: temperature must be positive".into());
                    return None;
                }
                Some(SpectralDistribution::BlackBody { temperature_k: t })
            }
            SedInput::PowerLawIndex(index) => {
                if !index.is_finite() {
                    problems.push("sed.powerLawIndex: index must be finite".into());
                    return None;
                }
                Some(SpectralDistribution::PowerLaw { index })
            }
        }
    }
}

#[derive(InputObject)]
pub struct BrightnessInput {
    pub band: Band,
    pub value: f64,
    pub units: BrightnessUnit,
}

#[derive(InputObject)]
pub struct BandNormalizedInput {
    pub sed: SedInput,
    pub brightnesses: Vec<BrightnessInput>,
}

impl BandNormalizedInput {
    fn coerce(&self, band: Band, problems: &mut Vec<String>) -> Option<SpectralDefinition> {
        let sed = self.sed.coerce(problems);
        let brightness = match self.brightnesses.iter().find(|b| b.band == band) {
            Some(b) if b.value.is_finite() => {
                Some(BandBrightness { band: b.band, value: b.value, units: b.units })
            }
            Some(_) => {
                problems.push(format!("brightnesses: value for {band:?} must be finite"));
                None
            }
            None => {
                problems.push(format!("brightnesses: no entry for the requested band {band:?}"));
                None
            }
        };
        Some(SpectralDefinition::BandNormalized { sed: sed?, brightness: brightness? })
    }
}

#[derive(InputObject)]
pub struct EmissionLineInput {
    pub wavelength: WavelengthInput,
    /// Line width, km/s.
    pub line_width: f64,
    /// Integrated line flux, W/m².
    pub line_flux: f64,
    /// Continuum flux density, W/m²/µm.
    pub continuum: f64,
}

impl EmissionLineInput {
    fn coerce(&self, problems: &mut Vec<String>) -> Option<SpectralDefinition> {
        let wavelength = self.wavelength.coerce("emissionLines.wavelength", problems);
        if !self.line_width.is_finite() || self.line_width <= 0.0 {
            problems.push("emissionLines.lineWidth: must be positive".into());
            return None;
        }
        if !self.line_flux.is_finite() || self.line_flux <= 0.0 {
            problems.push("emissionLines.lineFlux: must be positive".into());
            return None;
        }
        if !self.continuum.is_finite() || self.continuum < 0.0 {
            problems.push("emissionLines.continuum: must be non-negative".into());
            return None;
        }
        Some(SpectralDefinition::EmissionLine(EmissionLine {
            wavelength: wavelength?,
            line_width_kms: self.line_width,
            line_flux: self.line_flux,
            continuum: self.continuum,
        }))
    }
}

#[derive(OneofObject)]
pub enum SpectralDefinitionInput {
    BandNormalized(BandNormalizedInput),
    EmissionLines(EmissionLineInput),
}

impl SpectralDefinitionInput {
    fn coerce(&self, band: Band, problems: &mut Vec<String>) -> Option<SpectralDefinition> {
        match self {
            SpectralDefinitionInput::BandNormalized(input) => input.coerce(band, problems),
            SpectralDefinitionInput::EmissionLines(input) => input.coerce(problems),
        }
    }
}

#[derive(InputObject)]
pub struct GaussianInput {
    pub fwhm: AngleInput,
    pub spectral_definition: SpectralDefinitionInput,
}

#[derive(OneofObject)]
pub enum SourceProfileInput {
    Point(SpectralDefinitionInput),
    Uniform(SpectralDefinitionInput),
    Gaussian(GaussianInput),
}

fn coerce_target(
    profile: &SourceProfileInput,
    band: Band,
    radial_velocity: &RadialVelocityInput,
    problems: &mut Vec<String>,
) -> Option<TargetProfile> {
    let (geometry, spectral) = match profile {
        SourceProfileInput::Point(sd) => (Some(SourceGeometry::Point), sd.coerce(band, problems)),
        SourceProfileInput::Uniform(sd) => {
            (Some(SourceGeometry::Uniform), sd.coerce(band, problems))
        }
        SourceProfileInput::Gaussian(g) => (
            g.fwhm
                .coerce_positive("sourceProfile.gaussian.fwhm", problems)
                .map(|fwhm| SourceGeometry::Gaussian { fwhm }),
            g.spectral_definition.coerce(band, problems),
        ),
    };
    let radial_velocity = radial_velocity.coerce(problems);
    Some(TargetProfile {
        geometry: geometry?,
        spectral: spectral?,
        radial_velocity: radial_velocity?,
    })
}

// ============================================================================
// Constraints inputs
// ============================================================================

#[derive(InputObject)]
pub struct AirMassRangeInput {
    pub min: f64,
    pub max: f64,
}

#[derive(InputObject)]
pub struct HourAngleRangeInput {
    pub min_hours: f64,
    pub max_hours: f64,
}

#[derive(OneofObject)]
pub enum ElevationRangeInput {
    #[graphql(name = "airmassRange")]
    AirMass(AirMassRangeInput),
    #[graphql(name = "hourAngleRange")]
    HourAngle(HourAngleRangeInput),
}

#[derive(InputObject)]
pub struct ConstraintsInput {
    pub image_quality: ImageQuality,
    pub cloud_extinction: CloudExtinction,
    pub sky_background: SkyBackground,
    pub water_vapor: WaterVapor,
    pub elevation_range: ElevationRangeInput,
}

impl ConstraintsInput {
    fn coerce(&self, problems: &mut Vec<String>) -> Option<ObservingConditions> {
        let air_mass = match &self.elevation_range {
            ElevationRangeInput::AirMass(range) => {
                if !range.min.is_finite() || !range.max.is_finite() || range.min < 1.0 {
                    problems.push("elevationRange.airMass: bounds must be finite and ≥ 1".into());
                    None
                } else if range.max < range.min {
                    problems.push("elevationRange.airMass: max must not be less than min".into());
                    None
                } else {
                    // The worst (largest) airmass in the range drives the bin.
                    Some(AirMassBucket::from_air_mass(range.max))
                }
            }
            ElevationRangeInput::HourAngle(range) => {
                if !range.min_hours.is_finite() || !range.max_hours.is_finite() {
                    problems.push("elevationRange.hourAngle: bounds must be finite".into());
                    None
                } else if range.max_hours < range.min_hours {
                    problems.push("elevationRange.hourAngle: maxHours must not be less than minHours".into());
                    None
                } else {
                    // Hour-angle windows carry no airmass; the middle bin is used.
                    Some(AirMassBucket::OnePointFive)
                }
            }
        };
        Some(ObservingConditions {
            image_quality: self.image_quality,
            cloud_extinction: self.cloud_extinction,
            sky_background: self.sky_background,
            water_vapor: self.water_vapor,
            air_mass: air_mass?,
        })
    }
}

// ============================================================================
// Instrument mode inputs
// ============================================================================

#[derive(InputObject)]
pub struct CustomMaskInput {
    pub filename: String,
    pub slit_width: AngleInput,
}

impl CustomMaskInput {
    fn coerce(&self, problems: &mut Vec<String>) -> Option<GmosCustomMask> {
        if self.filename.trim().is_empty() {
            problems.push("customMask.filename: must not be empty".into());
            return None;
        }
        let slit_width = self.slit_width.coerce_positive("customMask.slitWidth", problems)?;
        Some(GmosCustomMask { filename: self.filename.clone(), slit_width })
    }
}

#[derive(OneofObject)]
pub enum GmosNorthFpuInput {
    Builtin(GmosNorthBuiltinFpu),
    CustomMask(CustomMaskInput),
}

#[derive(OneofObject)]
pub enum GmosSouthFpuInput {
    Builtin(GmosSouthBuiltinFpu),
    CustomMask(CustomMaskInput),
}

#[derive(InputObject)]
pub struct GmosNSpectroscopyInput {
    pub grating: GmosNorthGrating,
    pub fpu: GmosNorthFpuInput,
    pub filter: Option<GmosNorthFilter>,
}

#[derive(InputObject)]
pub struct GmosSSpectroscopyInput {
    pub grating: GmosSouthGrating,
    pub fpu: GmosSouthFpuInput,
    pub filter: Option<GmosSouthFilter>,
}

#[derive(InputObject)]
pub struct GmosNImagingInput {
    pub filter: GmosNorthFilter,
}

#[derive(InputObject)]
pub struct GmosSImagingInput {
    pub filter: GmosSouthFilter,
}

#[derive(OneofObject)]
pub enum InstrumentModesInput {
    GmosNSpectroscopy(GmosNSpectroscopyInput),
    GmosSSpectroscopy(GmosSSpectroscopyInput),
    GmosNImaging(GmosNImagingInput),
    GmosSImaging(GmosSImagingInput),
}

impl InstrumentModesInput {
    fn coerce_spectroscopy(
        &self,
        central: Option<Wavelength>,
        problems: &mut Vec<String>,
    ) -> Option<ObservingMode> {
        match self {
            InstrumentModesInput::GmosNSpectroscopy(input) => {
                let fpu = match &input.fpu {
                    GmosNorthFpuInput::Builtin(b) => Some(GmosFpu::Builtin(*b)),
                    GmosNorthFpuInput::CustomMask(m) => m.coerce(problems).map(GmosFpu::Custom),
                };
                Some(ObservingMode::GmosNorthSpectroscopy {
                    grating: input.grating,
                    fpu: fpu?,
                    filter: input.filter,
                    central_wavelength: central?,
                })
            }
            InstrumentModesInput::GmosSSpectroscopy(input) => {
                let fpu = match &input.fpu {
                    GmosSouthFpuInput::Builtin(b) => Some(GmosFpu::Builtin(*b)),
                    GmosSouthFpuInput::CustomMask(m) => m.coerce(problems).map(GmosFpu::Custom),
                };
                Some(ObservingMode::GmosSouthSpectroscopy {
                    grating: input.grating,
                    fpu: fpu?,
                    filter: input.filter,
                    central_wavelength: central?,
                })
            }
            _ => {
                problems.push("mode: a spectroscopy mode is required for this query".into());
                None
            }
        }
    }

    fn coerce_imaging(&self, problems: &mut Vec<String>) -> Option<ObservingMode> {
        match self {
            InstrumentModesInput::GmosNImaging(input) => {
                Some(ObservingMode::GmosNorthImaging { filter: input.filter })
            }
            InstrumentModesInput::GmosSImaging(input) => {
                Some(ObservingMode::GmosSouthImaging { filter: input.filter })
            }
            _ => {
                problems.push("mode: an imaging mode is required for this query".into());
                None
            }
        }
    }
}

#[derive(InputObject)]
pub struct SignificantFiguresInput {
    pub x_axis: Option<u32>,
    pub y_axis: Option<u32>,
    pub ccd: Option<u32>,
}

impl SignificantFiguresInput {
    fn coerce(&self, problems: &mut Vec<String>) -> Option<SignificantFigures> {
        for (name, digits) in
            [("xAxis", self.x_axis), ("yAxis", self.y_axis), ("ccd", self.ccd)]
        {
            if digits == Some(0) {
                problems.push(format!("significantFigures.{name}: must be positive"));
                return None;
            }
        }
        Some(SignificantFigures { x_axis: self.x_axis, y_axis: self.y_axis, ccd: self.ccd })
    }
}

// ============================================================================
// Query inputs
// ============================================================================

#[derive(InputObject)]
pub struct SpectroscopyIntegrationTimeInput {
    /// Central wavelength of the spectroscopic setting.
    pub wavelength: WavelengthInput,
    pub signal_to_noise: f64,
    /// When present, the S/N requirement holds at this wavelength.
    pub signal_to_noise_at: Option<WavelengthInput>,
    pub source_profile: SourceProfileInput,
    pub band: Band,
    pub radial_velocity: RadialVelocityInput,
    pub constraints: ConstraintsInput,
    pub mode: InstrumentModesInput,
}

impl SpectroscopyIntegrationTimeInput {
    fn coerce(&self) -> Result<SpectroscopyTimeRequest, async_graphql::Error> {
        let mut problems = Vec::new();
        if !self.signal_to_noise.is_finite() || self.signal_to_noise <= 0.0 {
            problems.push("signalToNoise: must be positive".into());
        }
        let central = self.wavelength.coerce("wavelength", &mut problems);
        let at_wavelength = match &self.signal_to_noise_at {
            Some(w) => w.coerce("signalToNoiseAt", &mut problems).map(Some),
            None => Some(None),
        };
        let target = coerce_target(&self.source_profile, self.band, &self.radial_velocity, &mut problems);
        let conditions = self.constraints.coerce(&mut problems);
        let mode = self.mode.coerce_spectroscopy(central, &mut problems);

        match (problems.is_empty(), target, conditions, mode, at_wavelength) {
            (true, Some(target), Some(conditions), Some(mode), Some(at_wavelength)) => {
                Ok(SpectroscopyTimeRequest {
                    target,
                    mode,
                    conditions,
                    signal_to_noise: self.signal_to_noise,
                    at_wavelength,
                })
            }
            _ => Err(validation_error(problems)),
        }
    }
}

#[derive(InputObject)]
pub struct ImagingIntegrationTimeInput {
    pub signal_to_noise: f64,
    pub source_profile: SourceProfileInput,
    pub band: Band,
    pub radial_velocity: RadialVelocityInput,
    pub constraints: ConstraintsInput,
    pub mode: InstrumentModesInput,
}

impl ImagingIntegrationTimeInput {
    fn coerce(&self) -> Result<ImagingTimeRequest, async_graphql::Error> {
        let mut problems = Vec::new();
        if !self.signal_to_noise.is_finite() || self.signal_to_noise <= 0.0 {
            problems.push("signalToNoise: must be positive".into());
        }
        let target = coerce_target(&self.source_profile, self.band, &self.radial_velocity, &mut problems);
        let conditions = self.constraints.coerce(&mut problems);
        let mode = self.mode.coerce_imaging(&mut problems);

        match (problems.is_empty(), target, conditions, mode) {
            (true, Some(target), Some(conditions), Some(mode)) => Ok(ImagingTimeRequest {
                target,
                mode,
                conditions,
                signal_to_noise: self.signal_to_noise,
            }),
            _ => Err(validation_error(problems)),
        }
    }
}

#[derive(InputObject)]
pub struct OptimizedSpectroscopyGraphInput {
    /// Central wavelength of the spectroscopic setting.
    pub wavelength: WavelengthInput,
    pub exposure_time: DurationInput,
    pub exposures: i32,
    /// When present, S/N values are additionally extracted at this wavelength.
    pub signal_to_noise_at: Option<WavelengthInput>,
    pub source_profile: SourceProfileInput,
    pub band: Band,
    pub radial_velocity: RadialVelocityInput,
    pub constraints: ConstraintsInput,
    pub mode: InstrumentModesInput,
    pub significant_figures: Option<SignificantFiguresInput>,
}

impl OptimizedSpectroscopyGraphInput {
    fn coerce(&self) -> Result<SpectroscopyGraphRequest, async_graphql::Error> {
        let mut problems = Vec::new();
        if self.exposures <= 0 {
            problems.push("exposures: must be positive".into());
        }
        let exposure = self.exposure_time.coerce("exposureTime", &mut problems);
        let central = self.wavelength.coerce("wavelength", &mut problems);
        let at_wavelength = match &self.signal_to_noise_at {
            Some(w) => w.coerce("signalToNoiseAt", &mut problems).map(Some),
            None => Some(None),
        };
        let significant_figures = match &self.significant_figures {
            Some(sf) => sf.coerce(&mut problems).map(Some),
            None => Some(None),
        };
        let target = coerce_target(&self.source_profile, self.band, &self.radial_velocity, &mut problems);
        let conditions = self.constraints.coerce(&mut problems);
        let mode = self.mode.coerce_spectroscopy(central, &mut problems);

        match (problems.is_empty(), exposure, target, conditions, mode, at_wavelength, significant_figures) {
            (
                true,
                Some(exposure),
                Some(target),
                Some(conditions),
                Some(mode),
                Some(at_wavelength),
                Some(significant_figures),
            ) => Ok(SpectroscopyGraphRequest {
                target,
                mode,
                conditions,
                exposure,
                exposures: self.exposures,
                at_wavelength,
                significant_figures,
            }),
            _ => Err(validation_error(problems)),
        }
    }
}

// ============================================================================
// Outputs
// ============================================================================

#[derive(SimpleObject)]
pub struct VersionsResult {
    pub server_version: String,
    pub data_version: Option<String>,
}

impl From<ItcVersions> for VersionsResult {
    fn from(v: ItcVersions) -> Self {
        Self { server_version: v.server_version, data_version: v.data_version }
    }
}

#[derive(SimpleObject)]
pub struct DurationSeconds {
    pub seconds: f64,
}

#[derive(SimpleObject)]
pub struct IntegrationTimeResult {
    pub server_version: String,
    pub data_version: Option<String>,
    pub exposure_time: DurationSeconds,
    pub exposures: i32,
    pub signal_to_noise: f64,
    pub single_sn_ratio: f64,
}

impl From<ItcResponse<IntegrationTime>> for IntegrationTimeResult {
    fn from(r: ItcResponse<IntegrationTime>) -> Self {
        Self {
            server_version: r.server_version,
            data_version: r.data_version,
            exposure_time: DurationSeconds { seconds: r.result.exposure.as_secs_f64() },
            exposures: r.result.exposures,
            signal_to_noise: r.result.signal_to_noise,
            single_sn_ratio: r.result.single_sn_ratio,
        }
    }
}

#[derive(SimpleObject)]
pub struct OptimizedSpectroscopyGraphResult {
    pub server_version: String,
    pub data_version: Option<String>,
    pub ccds: Vec<ItcCcd>,
    pub charts: Vec<SeriesGroup>,
    pub peak_final_sn_ratio: f64,
    pub at_wavelength_final_sn_ratio: Option<f64>,
    pub peak_single_sn_ratio: f64,
    pub at_wavelength_single_sn_ratio: Option<f64>,
}

impl From<ItcResponse<SpectroscopyGraphs>> for OptimizedSpectroscopyGraphResult {
    fn from(r: ItcResponse<SpectroscopyGraphs>) -> Self {
        Self {
            server_version: r.server_version,
            data_version: r.data_version,
            ccds: r.result.ccds,
            charts: r.result.groups,
            peak_final_sn_ratio: r.result.peak_final_sn_ratio,
            at_wavelength_final_sn_ratio: r.result.at_wavelength_final_sn_ratio,
            peak_single_sn_ratio: r.result.peak_single_sn_ratio,
            at_wavelength_single_sn_ratio: r.result.at_wavelength_single_sn_ratio,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

fn validation_error(problems: Vec<String>) -> async_graphql::Error {
    let message = if problems.is_empty() {
        "invalid input".to_string()
    } else {
        problems.join("; ")
    };
    async_graphql::Error::new(message).extend_with(|_, ext| ext.set("code", "INVALID_INPUT"))
}

fn domain_error(error: ItcError) -> async_graphql::Error {
    let code = match &error {
        ItcError::SourceTooBright { .. } => "SOURCE_TOO_BRIGHT",
        ItcError::WavelengthBelowRange { .. } => "WAVELENGTH_BELOW_RANGE",
        ItcError::WavelengthAboveRange { .. } => "WAVELENGTH_ABOVE_RANGE",
        ItcError::Calculation(_) => "CALCULATION_ERROR",
        ItcError::IntegrationTime(_) => "INTEGRATION_TIME_ERROR",
        ItcError::Upstream(_) => "UPSTREAM_ERROR",
    };
    async_graphql::Error::new(error.to_string()).extend_with(|_, ext| ext.set("code", code))
}

// ============================================================================
// Query root
// ============================================================================

/// Root of the query graph.
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Server build and upstream data release.
    async fn versions(&self, ctx: &Context<'_>) -> async_graphql::Result<VersionsResult> {
        let itc = ctx.data::<Arc<AppItc>>()?;
        Ok(itc.versions().await.into())
    }

    /// Exposure plan reaching the requested S/N in a spectroscopy mode.
    async fn spectroscopy_integration_time(
        &self,
        ctx: &Context<'_>,
        input: SpectroscopyIntegrationTimeInput,
    ) -> async_graphql::Result<IntegrationTimeResult> {
        let itc = ctx.data::<Arc<AppItc>>()?;
        let request = input.coerce()?;
        let response = itc
            .spectroscopy_integration_time(&request)
            .await
            .map_err(domain_error)?;
        Ok(response.into())
    }

    /// Exposure plan reaching the requested S/N in an imaging mode.
    async fn imaging_integration_time(
        &self,
        ctx: &Context<'_>,
        input: ImagingIntegrationTimeInput,
    ) -> async_graphql::Result<IntegrationTimeResult> {
        let itc = ctx.data::<Arc<AppItc>>()?;
        let request = input.coerce()?;
        let response = itc.imaging_integration_time(&request).await.map_err(domain_error)?;
        Ok(response.into())
    }

    /// Spectra for a fixed exposure plan, with extracted S/N summary values.
    async fn optimized_spectroscopy_graph(
        &self,
        ctx: &Context<'_>,
        input: OptimizedSpectroscopyGraphInput,
    ) -> async_graphql::Result<OptimizedSpectroscopyGraphResult> {
        let itc = ctx.data::<Arc<AppItc>>()?;
        let request = input.coerce()?;
        let response = itc.spectroscopy_graph(&request).await.map_err(domain_error)?;
        Ok(response.into())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemKvs;

    fn constraints(elevation_range: ElevationRangeInput) -> ConstraintsInput {
        ConstraintsInput {
            image_quality: ImageQuality::Percent70,
            cloud_extinction: CloudExtinction::Percent50,
            sky_background: SkyBackground::Percent50,
            water_vapor: WaterVapor::Any,
            elevation_range,
        }
    }

    fn point_source() -> SourceProfileInput {
        SourceProfileInput::Point(SpectralDefinitionInput::BandNormalized(BandNormalizedInput {
            sed: SedInput::StellarLibrary(StellarLibrarySpectrum::G2V),
            brightnesses: vec![BrightnessInput {
                band: Band::R,
                value: 18.0,
                units: BrightnessUnit::VegaMagnitude,
            }],
        }))
    }

    fn spectroscopy_input() -> SpectroscopyIntegrationTimeInput {
        SpectroscopyIntegrationTimeInput {
            wavelength: WavelengthInput::Nanometers(500.0),
            signal_to_noise: 10.0,
            signal_to_noise_at: None,
            source_profile: point_source(),
            band: Band::R,
            radial_velocity: RadialVelocityInput::KilometersPerSecond(10.0),
            constraints: constraints(ElevationRangeInput::AirMass(AirMassRangeInput {
                min: 1.0,
                max: 1.3,
            })),
            mode: InstrumentModesInput::GmosNSpectroscopy(GmosNSpectroscopyInput {
                grating: GmosNorthGrating::B1200G5301,
                fpu: GmosNorthFpuInput::Builtin(GmosNorthBuiltinFpu::LongSlit0_25),
                filter: Some(GmosNorthFilter::GPrime),
            }),
        }
    }

    #[test]
    fn a_valid_input_coerces() {
        let request = spectroscopy_input().coerce().unwrap();
        assert_eq!(request.signal_to_noise, 10.0);
        assert_eq!(request.conditions.air_mass, AirMassBucket::OnePointTwo);
        assert!(matches!(request.mode, ObservingMode::GmosNorthSpectroscopy { .. }));
    }

    #[test]
    fn inverted_airmass_range_is_a_validation_error() {
        let mut input = spectroscopy_input();
        input.constraints =
            constraints(ElevationRangeInput::AirMass(AirMassRangeInput { min: 2.0, max: 1.2 }));
        let err = input.coerce().unwrap_err();
        assert!(err.message.contains("max must not be less than min"), "{}", err.message);
    }

    #[test]
    fn hour_angle_ranges_fall_back_to_the_middle_bin() {
        let mut input = spectroscopy_input();
        input.constraints = constraints(ElevationRangeInput::HourAngle(HourAngleRangeInput {
            min_hours: -2.0,
            max_hours: 2.0,
        }));
        let request = input.coerce().unwrap();
        assert_eq!(request.conditions.air_mass, AirMassBucket::OnePointFive);
    }

    #[test]
    fn problems_are_collected_not_short_circuited() {
        let mut input = spectroscopy_input();
        input.signal_to_noise = -1.0;
        input.constraints =
            constraints(ElevationRangeInput::AirMass(AirMassRangeInput { min: 2.0, max: 1.2 }));
        let err = input.coerce().unwrap_err();
        assert!(err.message.contains("signalToNoise"), "{}", err.message);
        assert!(err.message.contains("airMass"), "{}", err.message);
    }

    #[test]
    fn missing_brightness_band_is_reported() {
        let mut input = spectroscopy_input();
        input.band = Band::K;
        let err = input.coerce().unwrap_err();
        assert!(err.message.contains("no entry for the requested band"), "{}", err.message);
    }

    #[test]
    fn imaging_query_rejects_spectroscopy_modes() {
        let input = ImagingIntegrationTimeInput {
            signal_to_noise: 5.0,
            source_profile: point_source(),
            band: Band::R,
            radial_velocity: RadialVelocityInput::MetersPerSecond(0.0),
            constraints: constraints(ElevationRangeInput::AirMass(AirMassRangeInput {
                min: 1.0,
                max: 1.5,
            })),
            mode: InstrumentModesInput::GmosNSpectroscopy(GmosNSpectroscopyInput {
                grating: GmosNorthGrating::R400G5305,
                fpu: GmosNorthFpuInput::Builtin(GmosNorthBuiltinFpu::LongSlit1_00),
                filter: None,
            }),
        };
        let err = input.coerce().unwrap_err();
        assert!(err.message.contains("an imaging mode is required"), "{}", err.message);
    }

    #[test]
    fn graph_input_validates_plan_and_figures() {
        let input = OptimizedSpectroscopyGraphInput {
            wavelength: WavelengthInput::Nanometers(60.0),
            exposure_time: DurationInput::Milliseconds(2.5),
            exposures: 10,
            signal_to_noise_at: Some(WavelengthInput::Nanometers(1.5)),
            source_profile: point_source(),
            band: Band::R,
            radial_velocity: RadialVelocityInput::CentimetersPerSecond(0.0),
            constraints: constraints(ElevationRangeInput::AirMass(AirMassRangeInput {
                min: 1.0,
                max: 2.0,
            })),
            mode: InstrumentModesInput::GmosNSpectroscopy(GmosNSpectroscopyInput {
                grating: GmosNorthGrating::B1200G5301,
                fpu: GmosNorthFpuInput::Builtin(GmosNorthBuiltinFpu::LongSlit0_25),
                filter: Some(GmosNorthFilter::GPrime),
            }),
            significant_figures: Some(SignificantFiguresInput {
                x_axis: Some(4),
                y_axis: Some(4),
                ccd: None,
            }),
        };
        let request = input.coerce().unwrap();
        assert_eq!(request.exposure.as_millis_f64(), 2.5);
        assert_eq!(request.exposures, 10);
        assert_eq!(
            request.at_wavelength,
            Some(Wavelength::from_nanometers(1.5))
        );
        assert_eq!(
            request.significant_figures,
            Some(SignificantFigures { x_axis: Some(4), y_axis: Some(4), ccd: None })
        );

        let mut bad = OptimizedSpectroscopyGraphInput { exposures: 0, ..input };
        bad.significant_figures =
            Some(SignificantFiguresInput { x_axis: Some(0), y_axis: None, ccd: None });
        let err = bad.coerce().unwrap_err();
        assert!(err.message.contains("exposures"), "{}", err.message);
        assert!(err.message.contains("significantFigures.xAxis"), "{}", err.message);
    }

    #[test]
    fn schema_exposes_the_public_field_names() {
        let itc = Arc::new(Itc::new(
            LegacyItc::http("http://127.0.0.1:1"),
            CacheStore::Memory(MemKvs::new()),
        ));
        let sdl = build_schema(itc).sdl();
        for field in [
            "versions",
            "spectroscopyIntegrationTime",
            "imagingIntegrationTime",
            "optimizedSpectroscopyGraph",
            "serverVersion",
            "dataVersion",
            "signalToNoiseAt",
            "significantFigures",
        ] {
            assert!(sdl.contains(field), "SDL is missing {field}:\n{sdl}");
        }
    }
}

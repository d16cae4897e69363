//! Legacy calculator bridge
//!
//! The numeric kernel is a separately shipped legacy program. We never link
//! it: a request is serialised as a **canonical text document** (single-line
//! JSON, field order fixed by struct declaration, numbers in serde_json's
//! shortest round-trip form) and exchanged either with a sidecar over HTTP or
//! with a spawned process over stdin/stdout. The reply is a discriminated
//! union: a structured payload on success or a single-line error message.
//!
//! Contract notes:
//! - The bridge never retries and never calls itself concurrently; mutual
//!   exclusion is owned by [`crate::exec::CalcExecutor`].
//! - A reply that parses as neither success nor error is reported as an
//!   "unknown result" upstream error, never a panic.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::conditions::{CloudExtinction, ImageQuality, ObservingConditions, SkyBackground, WaterVapor};
use crate::graph::GraphsPayload;
use crate::mode::{
    GmosFpu, GmosNorthBuiltinFpu, GmosNorthFilter, GmosNorthGrating, GmosSouthBuiltinFpu,
    GmosSouthFilter, GmosSouthGrating, ObservingMode,
};
use crate::target::{BandBrightness, SourceGeometry, SpectralDefinition, SpectralDistribution, StellarLibrarySpectrum, TargetProfile};
use crate::units::TimeSpan;
use crate::{IntegrationTime, ItcError};

// ============================================================================
// Request
// ============================================================================

/// What the kernel is asked to produce.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum CalculationMethod {
    /// Compute spectra/graphs for a fixed exposure plan.
    #[serde(rename = "S2N", rename_all = "camelCase")]
    SignalToNoise {
        /// Number of exposures.
        exposures: i32,
        /// Duration of one exposure, seconds.
        exposure_secs: f64,
        /// Optional wavelength at which S/N is wanted, nm.
        at_nm: Option<f64>,
    },
    /// Ask the kernel itself for an exposure plan reaching `sigma`.
    #[serde(rename = "INTEGRATION_TIME", rename_all = "camelCase")]
    IntegrationTime {
        /// Requested total signal-to-noise.
        sigma: f64,
        /// Optional wavelength at which `sigma` must hold, nm.
        at_nm: Option<f64>,
    },
}

/// A complete request to the kernel.
#[derive(Clone, Debug, PartialEq)]
pub struct ItcRequest {
    /// Target description.
    pub target: TargetProfile,
    /// Instrument configuration.
    pub mode: ObservingMode,
    /// Site and atmosphere.
    pub conditions: ObservingConditions,
    /// What to compute.
    pub method: CalculationMethod,
}

impl ItcRequest {
    /// The same request with a different calculation method; the solver uses
    /// this to re-probe at new exposure plans.
    pub fn with_method(&self, method: CalculationMethod) -> Self {
        Self { method, ..self.clone() }
    }
}

// ============================================================================
// Canonical document
// ============================================================================

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocProfile {
    #[serde(rename = "POINT")]
    Point,
    #[serde(rename = "UNIFORM")]
    Uniform,
    #[serde(rename = "GAUSSIAN", rename_all = "camelCase")]
    Gaussian { fwhm_arcsec: f64 },
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocDistribution {
    #[serde(rename = "LIBRARY")]
    Library { template: StellarLibrarySpectrum },
    #[serde(rename = "BLACK_BODY")]
    BlackBody { temperature: f64 },
    #[serde(rename = "POWER_LAW")]
    PowerLaw { index: f64 },
    #[serde(rename = "EMISSION_LINE", rename_all = "camelCase")]
    EmissionLine { wavelength_nm: f64, width_kms: f64, flux: f64, continuum: f64 },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocTarget {
    profile: DocProfile,
    distribution: DocDistribution,
    #[serde(skip_serializing_if = "Option::is_none")]
    norm_band: Option<BandBrightness>,
    redshift: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocConditions {
    image_quality: ImageQuality,
    cloud_extinction: CloudExtinction,
    sky_background: SkyBackground,
    water_vapor: WaterVapor,
    airmass: f64,
}

/// Fixed telescope context; the front-end never varies these.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocTelescope {
    mirror_coating: &'static str,
    instrument_port: &'static str,
    wavefront_sensor: &'static str,
}

impl DocTelescope {
    fn defaults() -> Self {
        Self {
            mirror_coating: "SILVER",
            instrument_port: "SIDE_LOOKING",
            wavefront_sensor: "OIWFS",
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum DocGrating {
    North(GmosNorthGrating),
    South(GmosSouthGrating),
}

#[derive(Serialize)]
#[serde(untagged)]
enum DocFilter {
    North(GmosNorthFilter),
    South(GmosSouthFilter),
}

#[derive(Serialize)]
#[serde(untagged)]
enum DocBuiltinFpu {
    North(GmosNorthBuiltinFpu),
    South(GmosSouthBuiltinFpu),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocFpu {
    #[serde(rename = "BUILTIN")]
    Builtin { name: DocBuiltinFpu },
    #[serde(rename = "CUSTOM_MASK", rename_all = "camelCase")]
    Custom { filename: String, slit_width_arcsec: f64 },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocInstrument {
    instrument: &'static str,
    site: &'static str,
    detector: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    grating: Option<DocGrating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<DocFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fpu: Option<DocFpu>,
    #[serde(skip_serializing_if = "Option::is_none")]
    central_wavelength_nm: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    target: DocTarget,
    conditions: DocConditions,
    telescope: DocTelescope,
    instrument: DocInstrument,
    observation: CalculationMethod,
}

fn doc_target(target: &TargetProfile) -> DocTarget {
    let profile = match target.geometry {
        SourceGeometry::Point => DocProfile::Point,
        SourceGeometry::Uniform => DocProfile::Uniform,
        SourceGeometry::Gaussian { fwhm } => {
            DocProfile::Gaussian { fwhm_arcsec: fwhm.as_arcseconds() }
        }
    };
    let (distribution, norm_band) = match target.spectral {
        SpectralDefinition::BandNormalized { sed, brightness } => {
            let d = match sed {
                SpectralDistribution::Library { template } => DocDistribution::Library { template },
                SpectralDistribution::BlackBody { temperature_k } => {
                    DocDistribution::BlackBody { temperature: temperature_k }
                }
                SpectralDistribution::PowerLaw { index } => DocDistribution::PowerLaw { index },
            };
            (d, Some(brightness))
        }
        SpectralDefinition::EmissionLine(line) => (
            DocDistribution::EmissionLine {
                wavelength_nm: line.wavelength.as_nanometers(),
                width_kms: line.line_width_kms,
                flux: line.line_flux,
                continuum: line.continuum,
            },
            None,
        ),
    };
    DocTarget { profile, distribution, norm_band, redshift: target.redshift() }
}

fn doc_instrument(mode: &ObservingMode) -> DocInstrument {
    let (grating, filter, fpu, central) = match mode {
        ObservingMode::GmosNorthSpectroscopy { grating, fpu, filter, central_wavelength } => (
            Some(DocGrating::North(*grating)),
            filter.map(DocFilter::North),
            Some(match fpu {
                GmosFpu::Builtin(b) => DocFpu::Builtin { name: DocBuiltinFpu::North(*b) },
                GmosFpu::Custom(m) => DocFpu::Custom {
                    filename: m.filename.clone(),
                    slit_width_arcsec: m.slit_width.as_arcseconds(),
                },
            }),
            Some(central_wavelength.as_nanometers()),
        ),
        ObservingMode::GmosSouthSpectroscopy { grating, fpu, filter, central_wavelength } => (
            Some(DocGrating::South(*grating)),
            filter.map(DocFilter::South),
            Some(match fpu {
                GmosFpu::Builtin(b) => DocFpu::Builtin { name: DocBuiltinFpu::South(*b) },
                GmosFpu::Custom(m) => DocFpu::Custom {
                    filename: m.filename.clone(),
                    slit_width_arcsec: m.slit_width.as_arcseconds(),
                },
            }),
            Some(central_wavelength.as_nanometers()),
        ),
        ObservingMode::GmosNorthImaging { filter } => {
            (None, Some(DocFilter::North(*filter)), None, None)
        }
        ObservingMode::GmosSouthImaging { filter } => {
            (None, Some(DocFilter::South(*filter)), None, None)
        }
    };
    DocInstrument {
        instrument: mode.instrument(),
        site: mode.site(),
        detector: "HAMAMATSU",
        grating,
        filter,
        fpu,
        central_wavelength_nm: central,
    }
}

/// Encode a request as the canonical single-line JSON document.
///
/// Field order follows struct declaration order and is therefore fixed;
/// logically equal requests encode to identical byte strings.
pub fn canonical_document(request: &ItcRequest) -> Result<String, ItcError> {
    let document = Document {
        target: doc_target(&request.target),
        conditions: DocConditions {
            image_quality: request.conditions.image_quality,
            cloud_extinction: request.conditions.cloud_extinction,
            sky_background: request.conditions.sky_background,
            water_vapor: request.conditions.water_vapor,
            airmass: request.conditions.air_mass.value(),
        },
        telescope: DocTelescope::defaults(),
        instrument: doc_instrument(&request.mode),
        observation: request.method,
    };
    serde_json::to_string(&document)
        .map_err(|e| ItcError::Upstream(format!("encode request document: {e}")))
}

// ============================================================================
// Replies
// ============================================================================

const UNKNOWN_RESULT: &str = "unknown result from legacy calculator";

#[derive(Deserialize)]
struct LegacyFault {
    message: String,
}

#[derive(Deserialize)]
enum GraphsReply {
    GraphsResult(GraphsPayload),
    Error(LegacyFault),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExposureTimePayload {
    exposure_time_secs: f64,
    exposures: i32,
    signal_to_noise: f64,
    single_sn_ratio: f64,
}

#[derive(Deserialize)]
enum ExposureTimeReply {
    ExposureTimeResult(ExposureTimePayload),
    Error(LegacyFault),
}

fn parse_graphs(body: &str) -> Result<GraphsPayload, ItcError> {
    match serde_json::from_str::<GraphsReply>(body) {
        Ok(GraphsReply::GraphsResult(payload)) => Ok(payload),
        Ok(GraphsReply::Error(fault)) => Err(ItcError::Upstream(fault.message)),
        Err(_) => Err(ItcError::Upstream(UNKNOWN_RESULT.into())),
    }
}

fn parse_exposure_time(body: &str) -> Result<IntegrationTime, ItcError> {
    let payload = match serde_json::from_str::<ExposureTimeReply>(body) {
        Ok(ExposureTimeReply::ExposureTimeResult(p)) => p,
        Ok(ExposureTimeReply::Error(fault)) => return Err(ItcError::Upstream(fault.message)),
        Err(_) => return Err(ItcError::Upstream(UNKNOWN_RESULT.into())),
    };
    if payload.exposures <= 0 {
        return Err(ItcError::IntegrationTime(format!(
            "kernel produced a non-positive exposure count ({})",
            payload.exposures
        )));
    }
    let exposure = TimeSpan::from_secs_f64(payload.exposure_time_secs)
        .filter(|t| t.as_micros() > 0)
        .ok_or_else(|| {
            ItcError::IntegrationTime(format!(
                "kernel produced a non-positive exposure time ({} s)",
                payload.exposure_time_secs
            ))
        })?;
    Ok(IntegrationTime {
        exposure,
        exposures: payload.exposures,
        signal_to_noise: payload.signal_to_noise,
        single_sn_ratio: payload.single_sn_ratio,
    })
}

// ============================================================================
// Calculator trait and transports
// ============================================================================

/// The two-method calculator surface plus the data-version probe.
///
/// This is the seam the solver, orchestrator, and tests share; the production
/// implementation is [`LegacyItc`].
#[allow(async_fn_in_trait)]
pub trait Calculator: Send + Sync {
    /// Spectra and CCD scalars for a fixed exposure plan.
    async fn calculate_graphs(&self, request: &ItcRequest) -> Result<GraphsPayload, ItcError>;
    /// An exposure plan computed by the kernel itself.
    async fn calculate_exposure_time(&self, request: &ItcRequest) -> Result<IntegrationTime, ItcError>;
    /// The kernel's data release string, used for cache gating.
    async fn data_version(&self) -> Result<String, ItcError>;
}

enum Transport {
    Http { base_url: String, client: reqwest::Client },
    Process { jar: PathBuf },
}

/// Bridge to the real legacy calculator.
pub struct LegacyItc {
    transport: Transport,
}

impl LegacyItc {
    /// Talk to a sidecar instance over HTTP. `base_url` without trailing slash.
    pub fn http(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { transport: Transport::Http { base_url, client: reqwest::Client::new() } }
    }

    /// Spawn the legacy jar per call, feeding the document on stdin.
    pub fn local_jar(jar: impl Into<PathBuf>) -> Self {
        Self { transport: Transport::Process { jar: jar.into() } }
    }

    async fn exchange(&self, document: String) -> Result<String, ItcError> {
        match &self.transport {
            Transport::Http { base_url, client } => {
                let url = format!("{base_url}/json");
                let response = client
                    .post(&url)
                    .header("Content-Type", "application/json")
                    .body(document)
                    .send()
                    .await
                    .map_err(|e| ItcError::Upstream(format!("legacy transport: {e}")))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| ItcError::Upstream(format!("legacy transport: {e}")))?;
                if !status.is_success() {
                    return Err(ItcError::Upstream(format!("legacy calculator {status}: {body}")));
                }
                Ok(body)
            }
            Transport::Process { jar } => {
                let mut child = Command::new("java")
                    .arg("-jar")
                    .arg(jar)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| ItcError::Upstream(format!("spawn legacy jar: {e}")))?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin
                        .write_all(document.as_bytes())
                        .await
                        .map_err(|e| ItcError::Upstream(format!("write legacy stdin: {e}")))?;
                    stdin
                        .write_all(b"\n")
                        .await
                        .map_err(|e| ItcError::Upstream(format!("write legacy stdin: {e}")))?;
                }
                let output = child
                    .wait_with_output()
                    .await
                    .map_err(|e| ItcError::Upstream(format!("await legacy jar: {e}")))?;
                if !output.status.success() {
                    return Err(ItcError::Upstream(format!("legacy jar exited with {}", output.status)));
                }
                let body = String::from_utf8_lossy(&output.stdout);
                Ok(body.lines().find(|l| !l.trim().is_empty()).unwrap_or("").to_string())
            }
        }
    }
}

impl Calculator for LegacyItc {
    async fn calculate_graphs(&self, request: &ItcRequest) -> Result<GraphsPayload, ItcError> {
        let document = canonical_document(request)?;
        let body = self.exchange(document).await?;
        parse_graphs(&body)
    }

    async fn calculate_exposure_time(&self, request: &ItcRequest) -> Result<IntegrationTime, ItcError> {
        let document = canonical_document(request)?;
        let body = self.exchange(document).await?;
        parse_exposure_time(&body)
    }

    async fn data_version(&self) -> Result<String, ItcError> {
        match &self.transport {
            Transport::Http { base_url, client } => {
                let url = format!("{base_url}/version");
                let response = client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| ItcError::Upstream(format!("legacy transport: {e}")))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|e| ItcError::Upstream(format!("legacy transport: {e}")))?;
                if !status.is_success() {
                    return Err(ItcError::Upstream(format!("legacy calculator {status}: {body}")));
                }
                Ok(body.trim().to_string())
            }
            Transport::Process { jar } => {
                let output = Command::new("java")
                    .arg("-jar")
                    .arg(jar)
                    .arg("--version")
                    .output()
                    .await
                    .map_err(|e| ItcError::Upstream(format!("spawn legacy jar: {e}")))?;
                if !output.status.success() {
                    return Err(ItcError::Upstream(format!("legacy jar exited with {}", output.status)));
                }
                let body = String::from_utf8_lossy(&output.stdout);
                Ok(body.trim().to_string())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::AirMassBucket;
    use crate::mode::GmosFpu;
    use crate::target::{Band, BrightnessUnit};
    use crate::units::{RadialVelocity, Wavelength};

    fn request() -> ItcRequest {
        ItcRequest {
            target: TargetProfile {
                geometry: SourceGeometry::Point,
                spectral: SpectralDefinition::BandNormalized {
                    sed: SpectralDistribution::Library { template: StellarLibrarySpectrum::G2V },
                    brightness: BandBrightness {
                        band: Band::R,
                        value: 18.0,
                        units: BrightnessUnit::VegaMagnitude,
                    },
                },
                radial_velocity: RadialVelocity::from_kilometers_per_second(10.0),
            },
            mode: ObservingMode::GmosNorthSpectroscopy {
                grating: GmosNorthGrating::B1200G5301,
                fpu: GmosFpu::Builtin(GmosNorthBuiltinFpu::LongSlit0_25),
                filter: Some(GmosNorthFilter::GPrime),
                central_wavelength: Wavelength::from_nanometers(500.0),
            },
            conditions: ObservingConditions {
                image_quality: ImageQuality::Percent70,
                cloud_extinction: CloudExtinction::Percent50,
                sky_background: SkyBackground::Percent50,
                water_vapor: WaterVapor::Any,
                air_mass: AirMassBucket::OnePointFive,
            },
            method: CalculationMethod::SignalToNoise {
                exposures: 10,
                exposure_secs: 0.0025,
                at_nm: None,
            },
        }
    }

    #[test]
    fn document_is_deterministic() {
        let a = canonical_document(&request()).unwrap();
        let b = canonical_document(&request()).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains('\n'));
    }

    #[test]
    fn document_carries_wire_names_and_telescope_defaults() {
        let doc = canonical_document(&request()).unwrap();
        assert!(doc.contains(r#""grating":"B1200_G5301""#), "{doc}");
        assert!(doc.contains(r#""name":"LONG_SLIT_0_25""#), "{doc}");
        assert!(doc.contains(r#""filter":"G_PRIME""#), "{doc}");
        assert!(doc.contains(r#""imageQuality":"PERCENT_70""#), "{doc}");
        assert!(doc.contains(r#""airmass":1.5"#), "{doc}");
        assert!(doc.contains(r#""mirrorCoating":"SILVER""#), "{doc}");
        assert!(doc.contains(r#""wavefrontSensor":"OIWFS""#), "{doc}");
        assert!(doc.contains(r#""method":"S2N""#), "{doc}");
    }

    #[test]
    fn imaging_document_has_no_spectroscopic_fields() {
        let mut r = request();
        r.mode = ObservingMode::GmosNorthImaging { filter: GmosNorthFilter::RPrime };
        let doc = canonical_document(&r).unwrap();
        assert!(!doc.contains("grating"), "{doc}");
        assert!(!doc.contains("centralWavelengthNm"), "{doc}");
        assert!(doc.contains(r#""filter":"R_PRIME""#), "{doc}");
    }

    #[test]
    fn graphs_reply_union_parses_both_arms() {
        let ok = r#"{"GraphsResult":{"ccds":[],"groups":[]}}"#;
        assert!(parse_graphs(ok).is_ok());

        let err = r#"{"Error":{"message":"ups: no data"}}"#;
        match parse_graphs(err) {
            Err(ItcError::Upstream(m)) => assert_eq!(m, "ups: no data"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_reply_is_unknown_result_not_a_panic() {
        for body in ["", "not json", r#"{"Unexpected":{}}"#] {
            match parse_graphs(body) {
                Err(ItcError::Upstream(m)) => assert_eq!(m, UNKNOWN_RESULT),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn exposure_time_reply_checks_positivity() {
        let ok = r#"{"ExposureTimeResult":{"exposureTimeSecs":1.0,"exposures":10,"signalToNoise":10.0,"singleSnRatio":3.16}}"#;
        let plan = parse_exposure_time(ok).unwrap();
        assert_eq!(plan.exposures, 10);
        assert_eq!(plan.exposure.as_secs_f64(), 1.0);

        let zero_count = r#"{"ExposureTimeResult":{"exposureTimeSecs":1.0,"exposures":0,"signalToNoise":1.0,"singleSnRatio":1.0}}"#;
        assert!(matches!(parse_exposure_time(zero_count), Err(ItcError::IntegrationTime(_))));

        let zero_time = r#"{"ExposureTimeResult":{"exposureTimeSecs":0.0,"exposures":5,"signalToNoise":1.0,"singleSnRatio":1.0}}"#;
        assert!(matches!(parse_exposure_time(zero_time), Err(ItcError::IntegrationTime(_))));
    }
}

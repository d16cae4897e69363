//! Iterative signal-to-noise exposure-time solver
//!
//! Given a requested total S/N, the solver finds an exposure plan by probing
//! the kernel with trial plans and rescaling: S/N grows with the square root
//! of collected time, so from an observed σ at a total time `n·t` the time
//! needed for the target is `n·t·(σ*/σ)²`. The rescaled total is split into
//! integer-second exposures no longer than the saturation-safe maximum.
//!
//! The loop stops on convergence (same exposure count, exposure time within
//! one second of the previous step), or after ten steps — a circuit breaker
//! against a kernel whose estimates refuse to settle, in which case the most
//! recent plan is returned as-is.
//!
//! The first probe doubles as a saturation check: with well depth `W` and a
//! peak-pixel rate `P` per second, an exposure of `W / (2P)` seconds fills
//! the brightest pixel to half the well. If even one second cannot be afforded
//! the source is too bright for the configuration and no plan exists.

use crate::exec::CalcExecutor;
use crate::graph::{peak_sn, GraphsPayload, SeriesDataType};
use crate::legacy::{CalculationMethod, Calculator, ItcRequest};
use crate::units::TimeSpan;
use crate::{IntegrationTime, ItcError};

/// Circuit breaker on solver steps.
pub const MAX_ITERATIONS: u32 = 10;

/// Exposure length of the very first probe, seconds.
pub const INITIAL_EXPOSURE_SECS: i64 = 1200;

/// Exposure plans below this half-well time are rejected outright.
const MIN_HALF_WELL_SECS: f64 = 1.0;

/// Strategy value composing the bridge and the executor; borrowed by the
/// orchestrator per request.
pub struct SnSolver<'a, C> {
    calc: &'a C,
    exec: &'a CalcExecutor,
}

impl<'a, C: Calculator> SnSolver<'a, C> {
    /// Borrow the calculator and its gate.
    pub fn new(calc: &'a C, exec: &'a CalcExecutor) -> Self {
        Self { calc, exec }
    }

    async fn probe(
        &self,
        base: &ItcRequest,
        exposures: i64,
        exposure_secs: i64,
    ) -> Result<GraphsPayload, ItcError> {
        let request = base.with_method(CalculationMethod::SignalToNoise {
            exposures: exposures.min(i32::MAX as i64) as i32,
            exposure_secs: exposure_secs as f64,
            at_nm: None,
        });
        self.exec.run(self.calc.calculate_graphs(&request)).await
    }

    /// Delegate to the kernel's own exposure-time computation. Used when the
    /// S/N requirement holds at a specific wavelength, which the kernel
    /// answers directly in one call.
    pub async fn solve_at_wavelength(&self, request: &ItcRequest) -> Result<IntegrationTime, ItcError> {
        self.exec.run(self.calc.calculate_exposure_time(request)).await
    }

    /// Iterate exposure plans until the peak final S/N reaches `target_sn`.
    ///
    /// `base` carries target, mode, and conditions; its method field is
    /// replaced for every probe.
    pub async fn solve_peak(&self, base: &ItcRequest, target_sn: f64) -> Result<IntegrationTime, ItcError> {
        let first = self.probe(base, 1, INITIAL_EXPOSURE_SECS).await?;
        if first.ccds.is_empty() {
            return Err(ItcError::Calculation("kernel returned no CCDs".into()));
        }

        // Saturation guard from the first probe. peak_pixel_flux is a rate,
        // electrons per second.
        let peak_per_sec = first
            .ccds
            .iter()
            .map(|c| c.peak_pixel_flux)
            .fold(0.0f64, f64::max);
        let well_depth = first.ccds.iter().map(|c| c.well_depth).fold(f64::INFINITY, f64::min);
        let half_well_secs = well_depth / (2.0 * peak_per_sec);
        if half_well_secs < MIN_HALF_WELL_SECS {
            return Err(ItcError::SourceTooBright { half_well_secs });
        }
        let tmax = INITIAL_EXPOSURE_SECS.min(half_well_secs.floor() as i64).max(1);

        let mut exposures: i64 = 1;
        let mut exposure_secs: i64 = INITIAL_EXPOSURE_SECS;
        let mut sn = peak_sn(&first.groups, SeriesDataType::FinalS2NData).into_result()?;
        let mut iterations: u32 = 0;

        loop {
            if sn == 0.0 {
                return Err(ItcError::Calculation("S/N obtained is 0".into()));
            }

            let total_secs =
                exposures as f64 * exposure_secs as f64 * (target_sn / sn).powi(2);
            let next_exposures = (total_secs / tmax as f64).ceil() as i64;
            let raw_next_secs = if next_exposures > 0 {
                (total_secs / next_exposures as f64).ceil()
            } else {
                f64::NAN
            };
            let next_secs = raw_next_secs as i64; // saturating cast
            if next_exposures <= 0 || next_secs <= 0 {
                return Err(ItcError::IntegrationTime(format!(
                    "step produced a non-positive plan ({next_exposures} × {next_secs} s)"
                )));
            }

            if next_exposures == exposures && (next_secs - exposure_secs).abs() <= 1 {
                return Ok(plan(next_secs, next_exposures, sn));
            }

            iterations += 1;
            if iterations >= MAX_ITERATIONS || raw_next_secs >= i64::MAX as f64 {
                // Circuit breaker: hand back the most recent estimate.
                return Ok(plan(next_secs, next_exposures, sn));
            }

            let probe = self.probe(base, next_exposures, next_secs).await?;
            sn = peak_sn(&probe.groups, SeriesDataType::FinalS2NData).into_result()?;
            exposures = next_exposures;
            exposure_secs = next_secs;
        }
    }
}

fn plan(exposure_secs: i64, exposures: i64, sn: f64) -> IntegrationTime {
    let count = exposures.min(i32::MAX as i64) as i32;
    IntegrationTime {
        exposure: TimeSpan::from_secs(exposure_secs as u64),
        exposures: count,
        signal_to_noise: sn,
        single_sn_ratio: sn / (count as f64).sqrt(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{
        AirMassBucket, CloudExtinction, ImageQuality, ObservingConditions, SkyBackground, WaterVapor,
    };
    use crate::graph::{ItcCcd, ItcSeries, SeriesGroup};
    use crate::mode::{GmosFpu, GmosNorthBuiltinFpu, GmosNorthGrating, ObservingMode};
    use crate::target::{
        Band, BandBrightness, BrightnessUnit, SourceGeometry, SpectralDefinition,
        SpectralDistribution, StellarLibrarySpectrum, TargetProfile,
    };
    use crate::units::{RadialVelocity, Wavelength};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn base_request() -> ItcRequest {
        ItcRequest {
            target: TargetProfile {
                geometry: SourceGeometry::Point,
                spectral: SpectralDefinition::BandNormalized {
                    sed: SpectralDistribution::Library { template: StellarLibrarySpectrum::A0V },
                    brightness: BandBrightness {
                        band: Band::V,
                        value: 20.0,
                        units: BrightnessUnit::VegaMagnitude,
                    },
                },
                radial_velocity: RadialVelocity::from_kilometers_per_second(0.0),
            },
            mode: ObservingMode::GmosNorthSpectroscopy {
                grating: GmosNorthGrating::B1200G5301,
                fpu: GmosFpu::Builtin(GmosNorthBuiltinFpu::LongSlit0_50),
                filter: None,
                central_wavelength: Wavelength::from_nanometers(500.0),
            },
            conditions: ObservingConditions {
                image_quality: ImageQuality::Percent70,
                cloud_extinction: CloudExtinction::Percent50,
                sky_background: SkyBackground::Percent50,
                water_vapor: WaterVapor::Any,
                air_mass: AirMassBucket::OnePointTwo,
            },
            method: CalculationMethod::SignalToNoise {
                exposures: 1,
                exposure_secs: 1.0,
                at_nm: None,
            },
        }
    }

    fn payload(well_depth: f64, peak_pixel_flux: f64, sn: f64) -> GraphsPayload {
        GraphsPayload {
            ccds: vec![ItcCcd {
                single_sn_ratio: sn,
                max_single_sn_ratio: sn,
                total_sn_ratio: sn,
                max_total_sn_ratio: sn,
                peak_pixel_flux,
                well_depth,
                amp_gain: 1.0,
                warnings: vec![],
            }],
            groups: vec![SeriesGroup {
                series: vec![ItcSeries {
                    title: "Final S/N".into(),
                    series_type: SeriesDataType::FinalS2NData,
                    data_x: vec![495.0, 505.0],
                    data_y: vec![sn * 0.99, sn],
                }],
            }],
        }
    }

    type GraphsFn =
        Box<dyn Fn(usize, i32, f64) -> Result<GraphsPayload, ItcError> + Send + Sync>;

    struct StubCalc {
        graphs: GraphsFn,
        exposure_time: Result<IntegrationTime, ItcError>,
        graph_calls: AtomicUsize,
        time_calls: AtomicUsize,
    }

    impl StubCalc {
        fn graphs_only(graphs: GraphsFn) -> Self {
            Self {
                graphs,
                exposure_time: Err(ItcError::Upstream("not stubbed".into())),
                graph_calls: AtomicUsize::new(0),
                time_calls: AtomicUsize::new(0),
            }
        }
    }

    impl Calculator for StubCalc {
        async fn calculate_graphs(&self, request: &ItcRequest) -> Result<GraphsPayload, ItcError> {
            let call = self.graph_calls.fetch_add(1, Ordering::SeqCst);
            match request.method {
                CalculationMethod::SignalToNoise { exposures, exposure_secs, .. } => {
                    (self.graphs)(call, exposures, exposure_secs)
                }
                _ => panic!("solver must probe with the S2N method"),
            }
        }

        async fn calculate_exposure_time(&self, _request: &ItcRequest) -> Result<IntegrationTime, ItcError> {
            self.time_calls.fetch_add(1, Ordering::SeqCst);
            self.exposure_time.clone()
        }

        async fn data_version(&self) -> Result<String, ItcError> {
            Ok("test".into())
        }
    }

    const DEEP_WELL: f64 = 1.0e12;

    #[tokio::test]
    async fn converges_with_a_constant_kernel_estimate() {
        // σ = 10 regardless of the plan; requesting σ* = 2 walks the time down.
        let calc = StubCalc::graphs_only(Box::new(|_, _, _| Ok(payload(DEEP_WELL, 1.0, 10.0))));
        let exec = CalcExecutor::new();
        let solver = SnSolver::new(&calc, &exec);

        let plan = solver.solve_peak(&base_request(), 2.0).await.unwrap();
        assert_eq!(plan.exposures, 1);
        assert_eq!(plan.exposure.as_secs_f64(), 1.0);
        assert_eq!(plan.signal_to_noise, 10.0);
        assert!(calc.graph_calls.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn converges_on_a_square_root_kernel() {
        // A kernel that behaves like real noise: σ = 0.5·√(n·t).
        let calc = StubCalc::graphs_only(Box::new(|_, exposures, secs| {
            Ok(payload(DEEP_WELL, 1.0, 0.5 * (exposures as f64 * secs).sqrt()))
        }));
        let exec = CalcExecutor::new();
        let solver = SnSolver::new(&calc, &exec);

        let plan = solver.solve_peak(&base_request(), 40.0).await.unwrap();
        assert!((plan.signal_to_noise - 40.0).abs() / 40.0 < 0.02, "{plan:?}");
        // Total and single S/N stay consistent.
        let total_sq = plan.signal_to_noise.powi(2);
        let per_exposure = plan.exposures as f64 * plan.single_sn_ratio.powi(2);
        assert!((total_sq - per_exposure).abs() / total_sq < 1e-9);
        // No single exposure exceeds the initial probe length.
        assert!(plan.exposure.as_secs_f64() <= INITIAL_EXPOSURE_SECS as f64);
    }

    #[tokio::test]
    async fn saturation_caps_the_single_exposure_length() {
        // Peak rate 50 e⁻/s on a 10000 e⁻ well: half-well time 100 s.
        let calc = StubCalc::graphs_only(Box::new(|_, exposures, secs| {
            Ok(payload(10_000.0, 50.0, 0.5 * (exposures as f64 * secs).sqrt()))
        }));
        let exec = CalcExecutor::new();
        let solver = SnSolver::new(&calc, &exec);

        let plan = solver.solve_peak(&base_request(), 40.0).await.unwrap();
        assert!(plan.exposure.as_secs_f64() <= 100.0, "{plan:?}");
        assert!(plan.exposures >= 64, "{plan:?}");
    }

    #[tokio::test]
    async fn source_too_bright_is_deterministic_from_the_first_probe() {
        // Well depth 1, peak rate 1000 e⁻/s: half-well time 1/2000 s.
        let calc = StubCalc::graphs_only(Box::new(|_, _, _| Ok(payload(1.0, 1000.0, 10.0))));
        let exec = CalcExecutor::new();
        let solver = SnSolver::new(&calc, &exec);

        match solver.solve_peak(&base_request(), 2.0).await {
            Err(ItcError::SourceTooBright { half_well_secs }) => {
                assert!((half_well_secs - 0.0005).abs() < 1e-12, "{half_well_secs}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calc.graph_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_signal_to_noise_is_a_calculation_error() {
        let calc = StubCalc::graphs_only(Box::new(|_, _, _| Ok(payload(DEEP_WELL, 1.0, 0.0))));
        let exec = CalcExecutor::new();
        let solver = SnSolver::new(&calc, &exec);

        match solver.solve_peak(&base_request(), 2.0).await {
            Err(ItcError::Calculation(m)) => assert_eq!(m, "S/N obtained is 0"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn oscillating_estimates_hit_the_iteration_cap() {
        // Alternate between wildly low and wildly high σ so the plan never
        // settles; the breaker must stop the loop and return an estimate.
        let calc = StubCalc::graphs_only(Box::new(|call, _, _| {
            let sn = if call % 2 == 0 { 0.1 } else { 1000.0 };
            Ok(payload(DEEP_WELL, 1.0, sn))
        }));
        let exec = CalcExecutor::new();
        let solver = SnSolver::new(&calc, &exec);

        let plan = solver.solve_peak(&base_request(), 10.0).await.unwrap();
        assert!(plan.exposures >= 1 && plan.exposure.as_micros() > 0);
        assert_eq!(calc.graph_calls.load(Ordering::SeqCst), MAX_ITERATIONS as usize);
    }

    #[tokio::test]
    async fn upstream_errors_pass_through_untouched() {
        let calc = StubCalc::graphs_only(Box::new(|_, _, _| {
            Err(ItcError::Upstream("kernel melted".into()))
        }));
        let exec = CalcExecutor::new();
        let solver = SnSolver::new(&calc, &exec);

        match solver.solve_peak(&base_request(), 2.0).await {
            Err(ItcError::Upstream(m)) => assert_eq!(m, "kernel melted"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn at_wavelength_mode_is_a_single_delegated_call() {
        let mut calc = StubCalc::graphs_only(Box::new(|_, _, _| panic!("no graph probes expected")));
        calc.exposure_time = Ok(IntegrationTime {
            exposure: TimeSpan::from_secs(1),
            exposures: 10,
            signal_to_noise: 10.0,
            single_sn_ratio: 10.0 / 10f64.sqrt(),
        });
        let exec = CalcExecutor::new();
        let solver = SnSolver::new(&calc, &exec);

        let request = base_request().with_method(CalculationMethod::IntegrationTime {
            sigma: 2.0,
            at_nm: Some(500.0),
        });
        let plan = solver.solve_at_wavelength(&request).await.unwrap();
        assert_eq!(plan.exposures, 10);
        assert_eq!(plan.exposure.as_secs_f64(), 1.0);
        assert_eq!(plan.signal_to_noise, 10.0);
        assert_eq!(calc.time_calls.load(Ordering::SeqCst), 1);
        assert_eq!(calc.graph_calls.load(Ordering::SeqCst), 0);
    }
}

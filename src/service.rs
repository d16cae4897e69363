//! Request orchestrator
//!
//! [`Itc`] is the one concrete type behind all three query entry points. It
//! owns the calculator bridge, the single-flight executor, the result cache,
//! and the version tracker; everything is injected at construction, nothing
//! lives in module globals.
//!
//! Every entry point follows the same shape: refresh the upstream data
//! version (which gates the cache), consult the cache, and on a miss run the
//! appropriate path — the iterative solver or a direct kernel call — then
//! store and return the result together with `(serverVersion, dataVersion)`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{KeyValueStore, Namespace, ResultCache, VersionTracker};
use crate::conditions::ObservingConditions;
use crate::exec::CalcExecutor;
use crate::graph::{
    peak_sn, sn_at, trim_significant_figures, GraphsPayload, ItcCcd, round_sig_figs,
    SeriesDataType, SeriesGroup, SignificantFigures,
};
use crate::legacy::{CalculationMethod, Calculator, ItcRequest};
use crate::mode::ObservingMode;
use crate::solver::SnSolver;
use crate::target::TargetProfile;
use crate::units::{TimeSpan, Wavelength};
use crate::{IntegrationTime, ItcError, ItcVersions, SERVER_VERSION};

// ============================================================================
// Coerced requests
// ============================================================================

/// A validated spectroscopy integration-time request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectroscopyTimeRequest {
    /// Target description.
    pub target: TargetProfile,
    /// A spectroscopy observing mode.
    pub mode: ObservingMode,
    /// Site and atmosphere.
    pub conditions: ObservingConditions,
    /// Requested total signal-to-noise, positive.
    pub signal_to_noise: f64,
    /// When set, the S/N must hold at this wavelength and the kernel is
    /// asked directly; when absent the iterative peak-S/N solver runs.
    pub at_wavelength: Option<Wavelength>,
}

/// A validated imaging integration-time request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImagingTimeRequest {
    /// Target description.
    pub target: TargetProfile,
    /// An imaging observing mode.
    pub mode: ObservingMode,
    /// Site and atmosphere.
    pub conditions: ObservingConditions,
    /// Requested total signal-to-noise, positive.
    pub signal_to_noise: f64,
}

/// A validated spectroscopy graph request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectroscopyGraphRequest {
    /// Target description.
    pub target: TargetProfile,
    /// A spectroscopy observing mode.
    pub mode: ObservingMode,
    /// Site and atmosphere.
    pub conditions: ObservingConditions,
    /// Duration of one exposure.
    pub exposure: TimeSpan,
    /// Number of exposures, positive.
    pub exposures: i32,
    /// Optional wavelength at which S/N values are additionally extracted.
    pub at_wavelength: Option<Wavelength>,
    /// Optional rounding applied to the response.
    pub significant_figures: Option<SignificantFigures>,
}

// ============================================================================
// Results
// ============================================================================

/// Versioned envelope around every orchestrator answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItcResponse<T> {
    /// This build's identifier.
    pub server_version: String,
    /// Upstream data release, `None` when the probe failed.
    pub data_version: Option<String>,
    /// The computed payload.
    pub result: T,
}

/// A graph answer enriched with the extracted S/N summary values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectroscopyGraphs {
    /// Per-CCD scalars.
    pub ccds: Vec<ItcCcd>,
    /// Chart groups with their typed series.
    pub groups: Vec<SeriesGroup>,
    /// Greatest value of the final-S/N series.
    pub peak_final_sn_ratio: f64,
    /// Final S/N at the requested wavelength, when one was given.
    pub at_wavelength_final_sn_ratio: Option<f64>,
    /// Greatest value of the single-exposure-S/N series.
    pub peak_single_sn_ratio: f64,
    /// Single-exposure S/N at the requested wavelength, when one was given.
    pub at_wavelength_single_sn_ratio: Option<f64>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// The request-processing engine composing calculator, executor, and cache.
pub struct Itc<C, K> {
    calc: C,
    exec: CalcExecutor,
    cache: ResultCache<K>,
    tracker: VersionTracker,
}

impl<C: Calculator, K: KeyValueStore> Itc<C, K> {
    /// Compose the engine from an injected calculator and cache backend.
    pub fn new(calc: C, store: K) -> Self {
        Self {
            calc,
            exec: CalcExecutor::new(),
            cache: ResultCache::new(store),
            tracker: VersionTracker::default(),
        }
    }

    /// Probe the upstream data release and gate the cache on it. A failed
    /// probe is logged and reported as `None`; the request proceeds.
    async fn refresh_data_version(&self) -> Option<String> {
        match self.exec.run(self.calc.data_version()).await {
            Ok(version) => {
                self.cache.ensure_version(&self.tracker, &version).await;
                Some(version)
            }
            Err(e) => {
                warn!("upstream data version probe failed: {e}");
                None
            }
        }
    }

    fn respond<T>(&self, data_version: Option<String>, result: T) -> ItcResponse<T> {
        ItcResponse { server_version: SERVER_VERSION.to_string(), data_version, result }
    }

    /// The `versions` query.
    pub async fn versions(&self) -> ItcVersions {
        ItcVersions {
            server_version: SERVER_VERSION.to_string(),
            data_version: self.refresh_data_version().await,
        }
    }

    /// Exposure plan for spectroscopy reaching the requested S/N.
    pub async fn spectroscopy_integration_time(
        &self,
        request: &SpectroscopyTimeRequest,
    ) -> Result<ItcResponse<IntegrationTime>, ItcError> {
        let data_version = self.refresh_data_version().await;
        let solver = SnSolver::new(&self.calc, &self.exec);
        let result = self
            .cache
            .get_or_invoke(Namespace::SpecTime, request, async {
                match request.at_wavelength {
                    Some(at) => {
                        let probe = ItcRequest {
                            target: request.target,
                            mode: request.mode.clone(),
                            conditions: request.conditions,
                            method: CalculationMethod::IntegrationTime {
                                sigma: request.signal_to_noise,
                                at_nm: Some(at.as_nanometers()),
                            },
                        };
                        solver.solve_at_wavelength(&probe).await
                    }
                    None => {
                        let base = ItcRequest {
                            target: request.target,
                            mode: request.mode.clone(),
                            conditions: request.conditions,
                            method: CalculationMethod::IntegrationTime {
                                sigma: request.signal_to_noise,
                                at_nm: None,
                            },
                        };
                        solver.solve_peak(&base, request.signal_to_noise).await
                    }
                }
            })
            .await?;
        Ok(self.respond(data_version, result))
    }

    /// Exposure plan for imaging; the kernel answers this in one call.
    pub async fn imaging_integration_time(
        &self,
        request: &ImagingTimeRequest,
    ) -> Result<ItcResponse<IntegrationTime>, ItcError> {
        let data_version = self.refresh_data_version().await;
        let result = self
            .cache
            .get_or_invoke(Namespace::ImgTime, request, async {
                let probe = ItcRequest {
                    target: request.target,
                    mode: request.mode.clone(),
                    conditions: request.conditions,
                    method: CalculationMethod::IntegrationTime {
                        sigma: request.signal_to_noise,
                        at_nm: None,
                    },
                };
                self.exec.run(self.calc.calculate_exposure_time(&probe)).await
            })
            .await?;
        Ok(self.respond(data_version, result))
    }

    /// Spectra and S/N summary for a fixed exposure plan.
    pub async fn spectroscopy_graph(
        &self,
        request: &SpectroscopyGraphRequest,
    ) -> Result<ItcResponse<SpectroscopyGraphs>, ItcError> {
        let data_version = self.refresh_data_version().await;
        let result = self
            .cache
            .get_or_invoke(Namespace::SpecGraph, request, self.compute_graphs(request))
            .await?;
        Ok(self.respond(data_version, result))
    }

    async fn compute_graphs(
        &self,
        request: &SpectroscopyGraphRequest,
    ) -> Result<SpectroscopyGraphs, ItcError> {
        let probe = ItcRequest {
            target: request.target,
            mode: request.mode.clone(),
            conditions: request.conditions,
            method: CalculationMethod::SignalToNoise {
                exposures: request.exposures,
                exposure_secs: request.exposure.as_secs_f64(),
                at_nm: request.at_wavelength.map(|w| w.as_nanometers()),
            },
        };
        let mut payload: GraphsPayload = self.exec.run(self.calc.calculate_graphs(&probe)).await?;

        let figures = request.significant_figures.unwrap_or_default();
        if request.significant_figures.is_some() {
            trim_significant_figures(&mut payload, figures);
        }
        // Interpolation can reintroduce digits, so extracted values get the
        // y-axis rounding applied once more.
        let trim_y = |sn: f64| match figures.y_axis {
            Some(digits) => round_sig_figs(sn, digits),
            None => sn,
        };

        let peak_final = peak_sn(&payload.groups, SeriesDataType::FinalS2NData).into_result()?;
        let peak_single = peak_sn(&payload.groups, SeriesDataType::SingleS2NData).into_result()?;
        let (at_final, at_single) = match request.at_wavelength {
            Some(at) => (
                Some(sn_at(&payload.groups, SeriesDataType::FinalS2NData, at).into_result()?),
                Some(sn_at(&payload.groups, SeriesDataType::SingleS2NData, at).into_result()?),
            ),
            None => (None, None),
        };

        Ok(SpectroscopyGraphs {
            ccds: payload.ccds,
            groups: payload.groups,
            peak_final_sn_ratio: trim_y(peak_final),
            at_wavelength_final_sn_ratio: at_final.map(trim_y),
            peak_single_sn_ratio: trim_y(peak_single),
            at_wavelength_single_sn_ratio: at_single.map(trim_y),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Crate root: public surface, shared result types, and service-wide invariants
//!
//! This crate is a GraphQL front-end for the GMOS instrument time calculator.
//! It validates observation descriptions, asks a **legacy numeric kernel** for
//! spectra and exposure plans, and caches the structured answers in an
//! external key-value store. The heavy radiative-transfer/detector work lives
//! entirely in the legacy calculator; this crate is a stateless front-end.
//!
//! ## Invariants
//!
//! - **Single-flight kernel.** The legacy calculator is non-reentrant. Every
//!   call goes through [`exec::CalcExecutor`], which holds a one-permit gate
//!   across the call and yields to the runtime before and after it.
//!
//! - **Content-addressed cache.** A cache key is a pure function of the
//!   normalised request: `"<namespace>:<hex>"` where the hex digits are the
//!   first 64 bits of a BLAKE3 digest over the request's binary encoding.
//!   Values are compact `bincode` bytes. A value that fails to decode is a
//!   miss, never an error.
//!
//! - **Version gating.** Every cached entry was produced under the data
//!   version currently recorded at the `"version"` key; when the legacy
//!   calculator reports a different version the store is flushed wholesale
//!   before anything else is read.
//!
//! - **Exposure plans.** For any plan returned by the solver,
//!   `total_sn² ≈ exposures · single_sn²` within the kernel's precision, and
//!   both the exposure duration and count are positive.
//!
//! Failures follow a strict policy: cache and tracing problems are swallowed
//! (the request proceeds as if uncached), calculator problems are surfaced,
//! and input coercion problems are collected and returned together.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

use serde::{Deserialize, Serialize};

/// Scalar quantities: wavelengths, durations, velocities, angles.
pub mod units;
/// Source profile, spectral distributions, and brightness model.
pub mod target;
/// Observing conditions with their enumerated orderings and air-mass buckets.
pub mod conditions;
/// GMOS-N/S gratings, filters, focal-plane units, and observing modes.
pub mod mode;
/// Legacy-calculator bridge: canonical document, transports, response parsing.
pub mod legacy;
/// Single-flight executor isolating the legacy kernel from the async layer.
pub mod exec;
/// Content-addressed binary result cache and its key-value backends.
pub mod cache;
/// Graph result model and the final-S/N extraction/interpolation.
pub mod graph;
/// Iterative signal-to-noise exposure-time solver.
pub mod solver;
/// Request orchestrator composing bridge, executor, cache, and solver.
pub mod service;
/// GraphQL schema: input coercion, output shapes, query root.
pub mod graphql;

// ============================================================================
// Shared result types
// ============================================================================

/// Build identifier reported as `serverVersion` on every response.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version pair attached to every orchestrator response.
///
/// `data_version` is the legacy calculator's data release string and is the
/// same value used to gate the cache; it is `None` when the upstream version
/// probe failed (the request still proceeds).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItcVersions {
    /// This server's build identifier.
    pub server_version: String,
    /// Upstream data release, if the legacy calculator answered.
    pub data_version: Option<String>,
}

/// An exposure plan: how long and how often to expose to reach a target S/N.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrationTime {
    /// Duration of a single exposure.
    pub exposure: units::TimeSpan,
    /// Number of exposures of that duration.
    pub exposures: i32,
    /// Total signal-to-noise accumulated over all exposures.
    pub signal_to_noise: f64,
    /// Signal-to-noise of one exposure.
    pub single_sn_ratio: f64,
}

/// Domain failures surfaced to the response channel.
///
/// Cache-backend and decode failures never appear here: the cache swallows
/// them and recomputes. Everything below is a real answer about the request.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ItcError {
    /// The source half-fills the detector well in under a second.
    #[error("source saturates the detector: half-well time is {half_well_secs:.4} s")]
    SourceTooBright {
        /// Seconds until the brightest pixel reaches half the well depth.
        half_well_secs: f64,
    },
    /// The requested S/N wavelength is below the computed series.
    #[error("S/N at {wavelength} is below the computed wavelength range")]
    WavelengthBelowRange {
        /// The out-of-range wavelength as requested.
        wavelength: units::Wavelength,
    },
    /// The requested S/N wavelength is above the computed series.
    #[error("S/N at {wavelength} is above the computed wavelength range")]
    WavelengthAboveRange {
        /// The out-of-range wavelength as requested.
        wavelength: units::Wavelength,
    },
    /// The kernel produced data the solver/extractor cannot use.
    #[error("calculation error: {0}")]
    Calculation(String),
    /// A solver step produced a non-positive exposure time or count.
    #[error("integration time error: {0}")]
    IntegrationTime(String),
    /// The legacy calculator reported a failure or returned garbage.
    #[error("legacy calculator error: {0}")]
    Upstream(String),
}

// ============================================================================
// Root-level re-exports (centralization)
// ============================================================================

pub use crate::cache::{CacheStore, Kvs, MemKvs, ResultCache};
pub use crate::exec::CalcExecutor;
pub use crate::graph::{GraphsPayload, ItcCcd, ItcSeries, SeriesGroup};
pub use crate::legacy::{Calculator, LegacyItc};
pub use crate::service::{Itc, ItcResponse};
pub use crate::units::{TimeSpan, Wavelength};

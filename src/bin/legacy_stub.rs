//! legacy_stub: a stand-in for the legacy numeric kernel, for local runs.
//!
//! Speaks the same wire protocol as the real calculator — canonical request
//! document in, `GraphsResult` / `ExposureTimeResult` / `Error` union out —
//! but the numbers are a deterministic toy model (S/N grows with √(n·t) and
//! falls off towards the edges of the covered interval). Useful for driving
//! the server end-to-end without the real kernel:
//!
//! ```text
//! ITC_LEGACY_URL=http://127.0.0.1:7080 cargo run --bin gmositc_api
//! ```

#![forbid(unsafe_code)]

use std::net::SocketAddr;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

const DATA_VERSION: &str = "stub-2026A.0001";

fn fault(message: &str) -> Value {
    json!({ "Error": { "message": message } })
}

fn series(title: &str, series_type: &str, xs: &[f64], ys: &[f64]) -> Value {
    json!({ "title": title, "seriesType": series_type, "dataX": xs, "dataY": ys })
}

/// Toy spectrum: a parabola peaking at the central wavelength, zero at the
/// interval edges.
fn shape(x: f64, central: f64, half_span: f64) -> f64 {
    let u = (x - central) / half_span;
    (1.0 - u * u).max(0.0)
}

fn graphs_result(doc: &Value) -> Value {
    let central = doc
        .pointer("/instrument/centralWavelengthNm")
        .and_then(Value::as_f64)
        .unwrap_or(500.0);
    let exposures = doc
        .pointer("/observation/exposures")
        .and_then(Value::as_f64)
        .unwrap_or(1.0)
        .max(1.0);
    let exposure_secs = doc
        .pointer("/observation/exposureSecs")
        .and_then(Value::as_f64)
        .unwrap_or(1.0)
        .max(1e-6);

    let half_span = 80.0;
    let peak_final = 0.5 * (exposures * exposure_secs).sqrt();
    let peak_single = peak_final / exposures.sqrt();

    let n_points = 101;
    let xs: Vec<f64> = (0..n_points)
        .map(|i| central - half_span + 2.0 * half_span * i as f64 / (n_points - 1) as f64)
        .collect();
    let finals: Vec<f64> = xs.iter().map(|&x| peak_final * shape(x, central, half_span)).collect();
    let singles: Vec<f64> = xs.iter().map(|&x| peak_single * shape(x, central, half_span)).collect();
    let signal: Vec<f64> = xs.iter().map(|&x| 1000.0 * shape(x, central, half_span)).collect();
    let background: Vec<f64> = xs.iter().map(|_| 25.0).collect();

    json!({
        "GraphsResult": {
            "ccds": [{
                "singleSnRatio": peak_single,
                "maxSingleSnRatio": peak_single,
                "totalSnRatio": peak_final,
                "maxTotalSnRatio": peak_final,
                "peakPixelFlux": 100.0,
                "wellDepth": 150000.0,
                "ampGain": 1.0,
                "warnings": []
            }],
            "groups": [{
                "series": [
                    series("Signal", "SignalData", &xs, &signal),
                    series("Background", "BackgroundData", &xs, &background),
                    series("Single exposure S/N", "SingleS2NData", &xs, &singles),
                    series("Final S/N", "FinalS2NData", &xs, &finals)
                ]
            }]
        }
    })
}

fn exposure_time_result(doc: &Value) -> Value {
    let sigma = match doc.pointer("/observation/sigma").and_then(Value::as_f64) {
        Some(s) if s > 0.0 => s,
        _ => return fault("sigma must be positive"),
    };
    // Invert the toy model σ = 0.5·√(n·t) with t capped at 300 s.
    let total_secs = (2.0 * sigma).powi(2).max(1.0);
    let exposures = (total_secs / 300.0).ceil().max(1.0);
    let exposure_secs = (total_secs / exposures).ceil().max(1.0);
    let achieved = 0.5 * (exposures * exposure_secs).sqrt();
    json!({
        "ExposureTimeResult": {
            "exposureTimeSecs": exposure_secs,
            "exposures": exposures as i64,
            "signalToNoise": achieved,
            "singleSnRatio": achieved / exposures.sqrt()
        }
    })
}

async fn calculate(Json(doc): Json<Value>) -> impl IntoResponse {
    let reply = match doc.pointer("/observation/method").and_then(Value::as_str) {
        Some("S2N") => graphs_result(&doc),
        Some("INTEGRATION_TIME") => exposure_time_result(&doc),
        Some(other) => fault(&format!("unknown calculation method {other}")),
        None => fault("request document carries no calculation method"),
    };
    Json(reply)
}

async fn version() -> impl IntoResponse {
    DATA_VERSION
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "legacy_stub=info".into()))
        .with_target(false)
        .compact()
        .init();

    let addr: SocketAddr = std::env::var("STUB_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 7080)));

    let app = Router::new()
        .route("/json", post(calculate))
        .route("/version", get(version));

    info!("legacy stub listening on http://{addr} (data version {DATA_VERSION})");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

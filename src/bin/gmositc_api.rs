//! gmositc_api: GraphQL front-end for the GMOS instrument time calculator.
//!
//! Endpoints:
//! - POST /itc            GraphQL (queries: versions, spectroscopyIntegrationTime,
//!                        imagingIntegrationTime, optimizedSpectroscopyGraph)
//! - GET  /playground     GraphQL playground for the /itc endpoint
//! - GET  /v1/health      liveness probe
//! - GET  /v1/version     server build + upstream data release (JSON)
//!
//! Configuration (environment, read once at startup):
//! - ITC_ADDR             listen address, default 127.0.0.1:6060
//! - ITC_LEGACY_URL       base URL of the legacy calculator sidecar
//! - ITC_LEGACY_JAR       path to the legacy jar (used when no URL is set)
//! - ITC_CACHE_URL        Redis REST endpoint; in-memory cache when unset
//! - ITC_CACHE_TOKEN      bearer token for the cache endpoint
//! - CORS_ALLOWED_ORIGINS comma-separated origins, or "*" (dev only)
//!
//! Exactly one of ITC_LEGACY_URL / ITC_LEGACY_JAR must be set; anything else
//! is a startup misconfiguration and the process exits non-zero.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::Method,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use gmositc::cache::{CacheStore, Kvs, MemKvs};
use gmositc::graphql::{build_schema, AppItc, ItcSchema};
use gmositc::{Itc, LegacyItc, SERVER_VERSION};

#[derive(Clone)]
struct AppState {
    schema: ItcSchema,
    itc: Arc<AppItc>,
}

// ------------------------------ Handlers ------------------------------

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(Health { status: "ok" })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionView {
    server_version: &'static str,
    data_version: Option<String>,
}

async fn version(State(st): State<AppState>) -> impl IntoResponse {
    let versions = st.itc.versions().await;
    Json(VersionView { server_version: SERVER_VERSION, data_version: versions.data_version })
}

async fn graphql(
    State(st): State<AppState>,
    Json(request): Json<async_graphql::Request>,
) -> impl IntoResponse {
    Json(st.schema.execute(request).await)
}

async fn playground() -> impl IntoResponse {
    Html(playground_source(GraphQLPlaygroundConfig::new("/itc")))
}

// ------------------------------ Main ------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "gmositc=info,gmositc_api=info,tower_http=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    info!("Starting GMOS ITC server {SERVER_VERSION}");

    let addr: SocketAddr = std::env::var("ITC_ADDR")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 6060)));

    let legacy = match (std::env::var("ITC_LEGACY_URL"), std::env::var("ITC_LEGACY_JAR")) {
        (Ok(url), _) => {
            info!("legacy calculator: sidecar at {url}");
            LegacyItc::http(url)
        }
        (_, Ok(jar)) => {
            info!("legacy calculator: local jar {jar}");
            LegacyItc::local_jar(jar)
        }
        _ => anyhow::bail!("set ITC_LEGACY_URL or ITC_LEGACY_JAR"),
    };

    let store = match (std::env::var("ITC_CACHE_URL"), std::env::var("ITC_CACHE_TOKEN")) {
        (Ok(url), Ok(token)) => {
            info!("result cache: redis at {url}");
            CacheStore::Upstash(Kvs::new(url, token))
        }
        _ => {
            warn!("ITC_CACHE_URL/ITC_CACHE_TOKEN not set, results cached in process memory only");
            CacheStore::Memory(MemKvs::new())
        }
    };

    let itc = Arc::new(Itc::new(legacy, store));

    // Startup version gate: flushes the cache if the upstream data release
    // moved while we were down. A dead kernel is not fatal here.
    match itc.versions().await.data_version {
        Some(v) => info!("upstream data version: {v}"),
        None => warn!("upstream data version unavailable at startup"),
    }

    let schema = build_schema(itc.clone());

    let allowed_origins =
        std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".into());
    let cors = if allowed_origins == "*" {
        warn!("CORS set to permissive mode (*); restrict CORS_ALLOWED_ORIGINS in production");
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> =
            allowed_origins.split(',').filter_map(|s| s.trim().parse().ok()).collect();
        info!("CORS configured for origins: {origins:?}");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };

    let app = Router::new()
        .route("/itc", post(graphql))
        .route("/playground", get(playground))
        .route("/v1/health", get(health))
        .route("/v1/version", get(version))
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .with_state(AppState { schema, itc })
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("GMOS ITC listening on http://{addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

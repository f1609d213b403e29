//! HTTP front end for the resolver.
//!
//! `POST /process_sitemaps` takes `{"sitemaps": [...]}` and answers with the
//! urlset sitemaps reachable from those roots. The router is built by
//! [`create_router`] so tests can drive it without binding a socket.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sitewalk_core::resolve::run_resolver;
use sitewalk_scanner::{Diagnostic, ResolveStats, Resolver, ScanError};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Shared state injected into every route handler.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    /// Per-request resolution deadline in seconds
    pub deadline_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessSitemapsResponse {
    pub urlsets: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ResolveStats,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Everything that can go wrong while serving a single request.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Request body must be valid JSON.")]
    MalformedJson,

    #[error("JSON body must include 'sitemaps' key.")]
    MissingSitemaps,

    #[error("Invalid input: 'sitemaps' must be a list of URLs.")]
    NotAList,

    #[error("An error occurred during processing.")]
    Processing(ScanError),
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Pull the sitemap list out of a request body.
///
/// Non-string entries are rejected along with non-list values. Blank or
/// otherwise unusable URLs are accepted here and reported per reference.
pub fn parse_sitemaps_request(body: &[u8]) -> Result<Vec<String>, RequestError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| RequestError::MalformedJson)?;

    let sitemaps = value
        .as_object()
        .and_then(|object| object.get("sitemaps"))
        .ok_or(RequestError::MissingSitemaps)?;

    let entries = sitemaps.as_array().ok_or(RequestError::NotAList)?;
    entries
        .iter()
        .map(|entry| {
            entry
                .as_str()
                .map(str::to_string)
                .ok_or(RequestError::NotAList)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub async fn version_handler() -> Json<VersionResponse> {
    Json(VersionResponse {
        name: "sitewalk".to_string(),
        version: VERSION.to_string(),
    })
}

pub async fn process_sitemaps_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ProcessSitemapsResponse>, RequestError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("process_sitemaps", request_id = %request_id);

    async move {
        let sitemaps = parse_sitemaps_request(&body).inspect_err(|e| {
            warn!("Rejected request: {}", e);
        })?;
        info!("Resolving {} root sitemap(s)", sitemaps.len());

        let result = run_resolver(&state.resolver, &sitemaps, state.deadline_secs)
            .await
            .map_err(|e| {
                error!("Resolution failed: {}", e);
                RequestError::Processing(e)
            })?;

        info!(
            "Resolved {} urlset(s) with {} failure(s) in {:?}",
            result.leaf_count(),
            result.diagnostics.len(),
            result.elapsed
        );

        Ok(Json(ProcessSitemapsResponse {
            urlsets: result.leaves.into_iter().collect(),
            diagnostics: result.diagnostics,
            stats: result.stats,
        }))
    }
    .instrument(span)
    .await
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/version", get(version_handler))
        .route("/process_sitemaps", post(process_sitemaps_handler))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("sitewalk v{} listening on {}", VERSION, addr);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

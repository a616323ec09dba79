use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use timeslice_core::config::RetrievalConfig;
use timeslice_core::engine::Engine;
use timeslice_core::persist::{ClusterPaths, StatsPaths};
use timeslice_core::{ExternalId, RetrievalError, ScoredDoc};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchRequest {
    pub text: String,
    pub embedding: Vec<f32>,
    pub cutoff: ExternalId,
    pub days: u32,
    pub hours: u32,
    /// Partitions scanned per window; the configured cap (or all) when omitted.
    pub top_k: Option<usize>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub top_k: usize,
    pub took_s: f64,
    pub scanned: u64,
    pub eligible: u64,
    pub fraction: Option<f64>,
    pub warnings: Vec<String>,
    pub results: Vec<ScoredDoc>,
}

/// Where the server loads its structures from.
pub struct ServerOptions {
    pub stats: PathBuf,
    pub terms: Option<PathBuf>,
    pub clusters: ClusterPaths,
    pub config: RetrievalConfig,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn build_app(opts: ServerOptions) -> Result<Router> {
    let engine = Engine::open(StatsPaths::new(&opts.stats), opts.terms.as_deref(), &opts.clusters, opts.config)?;
    Ok(router(Arc::new(engine)))
}

pub fn router(engine: Arc<Engine>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", post(search_handler))
        .with_state(AppState { engine })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn bad_request(msg: impl Into<String>) -> (StatusCode, String) { (StatusCode::BAD_REQUEST, msg.into()) }

pub async fn search_handler(State(state): State<AppState>, Json(req): Json<SearchRequest>) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    if req.top_k == Some(0) {
        return Err(bad_request("top_k must be at least 1"));
    }
    let limit = req.limit.clamp(1, state.engine.config().top_n);
    let query = state
        .engine
        .query("q", &req.text, req.embedding, req.cutoff, req.days, req.hours)
        .map_err(|e| bad_request(e.to_string()))?;

    let engine = state.engine.clone();
    let top_k = req.top_k;
    let outcome = tokio::task::spawn_blocking(move || engine.execute_with(&query, None, top_k))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("query task failed: {e}")))?
        .map_err(|e: RetrievalError| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let requested = top_k.or(state.engine.config().max_top_k);
    let level = match requested {
        Some(k) => outcome.level(k),
        None => outcome.levels.last(),
    };
    let warnings = outcome.warnings.iter().map(|w| w.to_string()).collect();
    let elapsed = start.elapsed();
    let resp = match level {
        Some(level) => SearchResponse {
            query: req.text,
            top_k: level.top_k,
            took_s: elapsed.as_secs_f64(),
            scanned: level.scanned,
            eligible: level.eligible,
            fraction: level.fraction_scanned(),
            warnings,
            results: level.ranking.iter().take(limit).copied().collect(),
        },
        None => SearchResponse {
            query: req.text,
            top_k: requested.unwrap_or(0),
            took_s: elapsed.as_secs_f64(),
            scanned: 0,
            eligible: 0,
            fraction: None,
            warnings,
            results: Vec::new(),
        },
    };
    tracing::debug!(query = %resp.query, top_k = resp.top_k, hits = resp.results.len(), took_s = resp.took_s, "search served");
    Ok(Json(resp))
}

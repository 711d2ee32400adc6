use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bsbi::index::Index;
use bsbi::ranking::{Bm25Params, Bm25Ranker, CandidatePolicy};
use bsbi::retrieval::Retriever;
use bsbi::DocId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub mode: CandidatePolicy,
    pub timeout_ms: Option<u64>,
}
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct BooleanParams {
    pub q: String,
    pub timeout_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub name: String,
    pub score: f64,
}

#[derive(Serialize)]
pub struct BooleanResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub docs: Vec<String>,
}

#[derive(Serialize)]
pub struct DocResponse {
    pub doc_id: DocId,
    pub name: String,
    pub length: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub index: Arc<Index>,
    pub params: Bm25Params,
}

type ApiError = (StatusCode, String);

fn api_error(e: bsbi::Error) -> ApiError {
    let status = match &e {
        bsbi::Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
        bsbi::Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "query failed");
    }
    (status, e.to_string())
}

fn deadline(timeout_ms: Option<u64>) -> Option<Instant> {
    timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms))
}

/// Runs blocking index reads off the async executor.
async fn blocking<T, F>(state: AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Index) -> bsbi::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state.index))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(api_error)
}

pub fn build_app(index_dir: impl AsRef<std::path::Path>) -> Result<Router> {
    let index_dir = index_dir.as_ref();
    let index = Index::open(index_dir).with_context(|| format!("opening index {}", index_dir.display()))?;
    Ok(router(AppState { index: Arc::new(index), params: Bm25Params::default() }))
}

pub fn router(app_state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
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
        .route("/search", get(search_handler))
        .route("/boolean", get(boolean_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let k = params.k.clamp(1, 100);
    let deadline = deadline(params.timeout_ms);
    let (query, policy, bm25) = (params.q.clone(), params.mode, state.params);
    let (total_hits, results) = blocking(state, move |index| {
        let ranked = Bm25Ranker::new(index).with_params(bm25).with_policy(policy).rank(&query, None, deadline)?;
        let total = ranked.len();
        let hits = ranked
            .into_iter()
            .take(k)
            .map(|hit| Ok(SearchHit { doc_id: hit.doc_id, name: index.doc_name(hit.doc_id)?.to_owned(), score: hit.score }))
            .collect::<bsbi::Result<Vec<_>>>()?;
        Ok((total, hits))
    })
    .await?;
    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results }))
}

pub async fn boolean_handler(
    State(state): State<AppState>,
    Query(params): Query<BooleanParams>,
) -> Result<Json<BooleanResponse>, ApiError> {
    let start = Instant::now();
    let deadline = deadline(params.timeout_ms);
    let query = params.q.clone();
    let docs = blocking(state, move |index| Retriever::new(index).retrieve_names(&query, deadline)).await?;
    let elapsed = start.elapsed();
    Ok(Json(BooleanResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits: docs.len(), docs }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<DocResponse>, ApiError> {
    let name = state.index.doc_name(doc_id).map_err(api_error)?.to_owned();
    let length = state.index.stats().doc_length(doc_id);
    Ok(Json(DocResponse { doc_id, name, length }))
}

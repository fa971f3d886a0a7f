use anyhow::Result;
use axum::{extract::{Path, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use corpus::persist::list_versions;
use corpus::tokenizer::Analyzer;
use corpus::{
    Commit, CorpusConfig, CorpusError, CorpusStatistics, OnlineCorpus, Version, VocabularySnapshot, WordStatistics,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
pub struct IngestRequest {
    /// Pre-tokenized documents.
    #[serde(default)]
    pub documents: Vec<Vec<String>>,
    /// Raw texts, tokenized by the server's analyzer and appended after `documents`.
    #[serde(default)]
    pub texts: Vec<String>,
}

#[derive(Serialize)]
pub struct CommitResponse {
    pub version: Version,
    pub documents: usize,
    pub checkpointed: bool,
    pub warnings: Vec<String>,
}

impl From<Commit> for CommitResponse {
    fn from(c: Commit) -> Self {
        Self {
            version: c.version,
            documents: c.documents,
            checkpointed: c.checkpointed,
            warnings: c.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub version: Version,
    pub pending: usize,
    pub stats: CorpusStatistics,
}

#[derive(Serialize)]
pub struct WordResponse {
    pub word: String,
    pub id: u32,
    #[serde(flatten)]
    pub stats: WordStatistics,
}

/// What readers see: the state after the last completed write.
#[derive(Clone)]
pub struct ReadView {
    pub version: Version,
    pub pending: usize,
    pub vocabulary: VocabularySnapshot,
}

impl ReadView {
    fn of(corpus: &OnlineCorpus) -> Self {
        Self { version: corpus.version(), pending: corpus.pending(), vocabulary: corpus.vocabulary() }
    }
}

#[derive(Clone)]
pub struct AppState {
    /// Held for the whole of a write, checkpoint I/O included.
    pub writer: Arc<Mutex<OnlineCorpus>>,
    /// Swapped once a write finishes; readers never wait on the writer.
    pub view: Arc<RwLock<ReadView>>,
    pub root: PathBuf,
    pub analyzer: Analyzer,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Run `op` under the writer lock and publish the resulting view.
    fn write<T>(&self, op: impl FnOnce(&mut OnlineCorpus) -> T) -> T {
        let mut corpus = self.writer.lock();
        let out = op(&mut *corpus);
        *self.view.write() = ReadView::of(&corpus);
        out
    }
}

/// Open the store at `config.root` and build the router. Reads ADMIN_TOKEN and CORS_ALLOW_ORIGIN.
pub fn build_app(config: CorpusConfig) -> Result<Router> {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    build_app_with_token(config, admin_token)
}

pub fn build_app_with_token(config: CorpusConfig, admin_token: Option<String>) -> Result<Router> {
    Ok(router(build_state(config, admin_token)?))
}

pub fn build_state(config: CorpusConfig, admin_token: Option<String>) -> Result<AppState> {
    let corpus = OnlineCorpus::open(config)?;
    Ok(AppState {
        view: Arc::new(RwLock::new(ReadView::of(&corpus))),
        root: corpus.root().to_path_buf(),
        writer: Arc::new(Mutex::new(corpus)),
        analyzer: Analyzer::default(),
        admin_token,
    })
}

pub fn router(state: AppState) -> Router {

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
        .route("/stats", get(stats_handler))
        .route("/word/:token", get(word_handler))
        .route("/versions", get(versions_handler))
        .route("/documents", post(documents_handler))
        .route("/commit", post(commit_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let ReadView { version, pending, vocabulary } = state.view.read().clone();
    Json(StatsResponse { version, pending, stats: vocabulary.statistics() })
}

pub async fn word_handler(State(state): State<AppState>, Path(token): Path<String>) -> Result<Json<WordResponse>, ApiError> {
    let vocab = state.view.read().vocabulary.clone();
    let found = vocab.id(&token).zip(vocab.word_statistics(&token));
    match found {
        Some((id, stats)) => Ok(Json(WordResponse { word: token, id, stats })),
        None => Err((StatusCode::NOT_FOUND, format!("unknown word {token:?}"))),
    }
}

pub async fn versions_handler(State(state): State<AppState>) -> Result<Json<Vec<Version>>, ApiError> {
    list_versions(&state.root).map(Json).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

pub async fn documents_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> Result<Json<CommitResponse>, ApiError> {
    authorize(&state, &headers)?;
    let mut documents = req.documents;
    documents.extend(req.texts.iter().map(|t| state.analyzer.tokens(t)));
    let writer = state.clone();
    let commit = tokio::task::spawn_blocking(move || writer.write(|corpus| corpus.add_documents(documents)))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(corpus_error)?;
    for warning in &commit.warnings {
        tracing::warn!(%warning, "retention");
    }
    Ok(Json(commit.into()))
}

pub async fn commit_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CommitResponse>, ApiError> {
    authorize(&state, &headers)?;
    let writer = state.clone();
    let commit = tokio::task::spawn_blocking(move || writer.write(|corpus| corpus.commit()))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(corpus_error)?;
    Ok(Json(commit.into()))
}

fn corpus_error(e: CorpusError) -> ApiError {
    tracing::error!(error = %e, "corpus operation failed");
    let status = match e {
        CorpusError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
        CorpusError::VersionNotFound(_) => StatusCode::NOT_FOUND,
        CorpusError::CheckpointWriteFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CorpusError::CorruptCheckpoint { .. } | CorpusError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

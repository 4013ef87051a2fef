//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (model and version) |
//! | `POST` | `/qa` | `{query, top_k}` → `{answer}` |
//! | `GET`  | `/ask?question=` | → `{question, answer}` |
//! | `POST` | `/chat_api` | `{message}` → `{answer}` |
//! | `POST` | `/search` | `{query, max_results?}` → `{results}` (retrieval only) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Configuration and schema errors map to 400, backend failures to 502,
//! anything else to 500.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::answer::{create_model, Answerer};
use crate::config::{AnswerBackend, Config};
use crate::embedding::create_provider;
use crate::error::{Error, ErrorKind, Result};
use crate::models::RetrievedDocument;
use crate::retrieval::{build_knowledge_source, KnowledgeSource};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn KnowledgeSource>,
    /// `None` when no answer model is configured; answer routes then return 400.
    pub answerer: Option<Arc<Answerer>>,
    pub default_top_k: i64,
}

/// Starts the HTTP server on `[server].bind` and runs until the process exits.
pub async fn run_server(config: &Config) -> Result<()> {
    let provider = create_provider(&config.embedding)?;
    let source = build_knowledge_source(config, provider).await?;
    let answerer = match config.answer.provider {
        AnswerBackend::Disabled => None,
        AnswerBackend::Gemini => Some(Arc::new(Answerer::new(
            source.clone(),
            create_model(&config.answer)?,
        ))),
    };

    let state = AppState {
        source,
        answerer,
        default_top_k: config.retrieval.default_max_results as i64,
    };

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "http server listening");
    println!("medrag server listening on http://{}", config.server.bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/qa", post(handle_qa))
        .route("/ask", get(handle_ask))
        .route("/chat_api", post(handle_chat))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match err.kind() {
            ErrorKind::Configuration | ErrorKind::Schema => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            ErrorKind::Transient => (StatusCode::BAD_GATEWAY, "backend_error"),
            ErrorKind::Io => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status != StatusCode::BAD_REQUEST {
            error!(error = %err, "request failed");
        }
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

fn answerer(state: &AppState) -> std::result::Result<&Answerer, AppError> {
    state.answerer.as_deref().ok_or_else(|| AppError {
        status: StatusCode::BAD_REQUEST,
        code: "answer_disabled".to_string(),
        message: "answer provider is disabled; set [answer] provider in config".to_string(),
    })
}

fn require_text(field: &str, value: &str) -> std::result::Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ============ GET /health ============

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    model: Option<String>,
    version: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.answerer.as_ref().map(|a| a.model_name().to_string()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /qa ============

#[derive(Deserialize)]
pub struct QaRequest {
    query: String,
    #[serde(default)]
    top_k: Option<i64>,
}

#[derive(Serialize)]
pub struct AnswerResponse {
    answer: String,
}

async fn handle_qa(
    State(state): State<AppState>,
    Json(req): Json<QaRequest>,
) -> std::result::Result<Json<AnswerResponse>, AppError> {
    require_text("query", &req.query)?;
    let top_k = req.top_k.unwrap_or(state.default_top_k);
    let answer = answerer(&state)?.answer(&req.query, top_k).await?;
    Ok(Json(AnswerResponse {
        answer: answer.answer,
    }))
}

// ============ GET /ask ============

#[derive(Deserialize)]
pub struct AskQuery {
    question: String,
}

#[derive(Serialize)]
pub struct AskResponse {
    question: String,
    answer: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Query(q): Query<AskQuery>,
) -> std::result::Result<Json<AskResponse>, AppError> {
    require_text("question", &q.question)?;
    let answer = answerer(&state)?
        .answer(&q.question, state.default_top_k)
        .await?;
    Ok(Json(AskResponse {
        question: q.question,
        answer: answer.answer,
    }))
}

// ============ POST /chat_api ============

#[derive(Deserialize)]
pub struct ChatRequest {
    message: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> std::result::Result<Json<AnswerResponse>, AppError> {
    require_text("message", &req.message)?;
    let answer = answerer(&state)?
        .answer(&req.message, state.default_top_k)
        .await?;
    Ok(Json(AnswerResponse {
        answer: answer.answer,
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
pub struct SearchRequest {
    query: String,
    #[serde(default)]
    max_results: Option<i64>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    results: Vec<RetrievedDocument>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> std::result::Result<Json<SearchResponse>, AppError> {
    let results = state
        .source
        .search(&req.query, req.max_results.unwrap_or(0))
        .await?;
    Ok(Json(SearchResponse { results }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::{LanguageModel, DECLINE_MESSAGE};
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    struct EmptySource;

    #[async_trait]
    impl KnowledgeSource for EmptySource {
        async fn search(&self, _q: &str, _n: i64) -> Result<Vec<RetrievedDocument>> {
            Ok(Vec::new())
        }
        fn validate_filters(&self, _f: Option<&Value>) -> (Option<Value>, Vec<String>) {
            (None, Vec::new())
        }
    }

    struct OneHit;

    #[async_trait]
    impl KnowledgeSource for OneHit {
        async fn search(&self, _q: &str, _n: i64) -> Result<Vec<RetrievedDocument>> {
            Ok(vec![RetrievedDocument {
                content: "# Disease: Flu".to_string(),
                metadata: Map::new(),
                score: Some(0.5),
            }])
        }
        fn validate_filters(&self, _f: Option<&Value>) -> (Option<Value>, Vec<String>) {
            (None, Vec::new())
        }
    }

    struct Echo;

    #[async_trait]
    impl LanguageModel for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("rest and fluids".to_string())
        }
    }

    fn state(source: Arc<dyn KnowledgeSource>, with_model: bool) -> AppState {
        AppState {
            answerer: with_model.then(|| Arc::new(Answerer::new(source.clone(), Arc::new(Echo)))),
            source,
            default_top_k: 5,
        }
    }

    #[test]
    fn test_error_status_mapping() {
        let config: AppError = Error::Config("bad".into()).into();
        assert_eq!(config.status, StatusCode::BAD_REQUEST);
        let schema: AppError = Error::SchemaNotFound { candidates: 0 }.into();
        assert_eq!(schema.status, StatusCode::BAD_REQUEST);
        let backend: AppError = Error::backend("qdrant", "down").into();
        assert_eq!(backend.status, StatusCode::BAD_GATEWAY);
        let io: AppError = Error::Io(std::io::Error::other("disk")).into();
        assert_eq!(io.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_qa_answers_from_context() {
        let s = state(Arc::new(OneHit), true);
        let Json(resp) = handle_qa(
            State(s),
            Json(QaRequest {
                query: "flu?".to_string(),
                top_k: None,
            }),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(resp.answer, "rest and fluids");
    }

    #[tokio::test]
    async fn test_chat_declines_without_context() {
        let s = state(Arc::new(EmptySource), true);
        let Json(resp) = handle_chat(
            State(s),
            Json(ChatRequest {
                message: "unknown".to_string(),
            }),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(resp.answer, DECLINE_MESSAGE);
    }

    #[tokio::test]
    async fn test_ask_without_model_is_bad_request() {
        let s = state(Arc::new(OneHit), false);
        let err = handle_ask(
            State(s),
            Query(AskQuery {
                question: "flu?".to_string(),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "answer_disabled");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let s = state(Arc::new(OneHit), true);
        let err = handle_qa(
            State(s),
            Json(QaRequest {
                query: "  ".to_string(),
                top_k: Some(3),
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.code, "bad_request");
    }

    #[tokio::test]
    async fn test_search_returns_results() {
        let s = state(Arc::new(OneHit), false);
        let Json(resp) = handle_search(
            State(s),
            Json(SearchRequest {
                query: "flu".to_string(),
                max_results: None,
            }),
        )
        .await
        .ok()
        .unwrap();
        assert_eq!(resp.results.len(), 1);
    }
}

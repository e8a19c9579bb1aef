//! HTTP surface.
//!
//! - `POST /brief` JSON query to Brief JSON
//! - `POST /brief/voice` raw audio in, `audio/mpeg` narrative out
//! - `GET /debug/news?symbol=X` the news digest and the path taken
//! - `GET /health` liveness

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query as QueryParams, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use briefing_agents::{AgentError, OrchestrationError, Orchestrator, VoiceBridge};
use briefing_models::{Brief, NewsDigest, Query, Stage, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    voice: Arc<dyn VoiceBridge>,
    default_voice_query: String,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        voice: Arc<dyn VoiceBridge>,
        default_voice_query: impl Into<String>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            voice,
            default_voice_query: default_voice_query.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/brief", post(create_brief))
        .route("/brief/voice", post(voice_brief))
        .route("/debug/news", get(debug_news))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(AgentError),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Orchestration(OrchestrationError::SymbolExtraction(_)) => "symbol_extraction_failed",
            ApiError::Orchestration(OrchestrationError::Cancelled { .. }) => "cancelled",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Speech(_) => "speech_synthesis_failed",
        }
    }

    fn stage(&self) -> Option<Stage> {
        match self {
            ApiError::Orchestration(e) => Some(e.stage()),
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Orchestration(OrchestrationError::SymbolExtraction(_)) => StatusCode::BAD_REQUEST,
            ApiError::Orchestration(OrchestrationError::Cancelled { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Speech(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.code(),
            "stage": self.stage(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
pub struct BriefRequest {
    pub query: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub holdings: BTreeMap<String, Decimal>,
}

async fn create_brief(
    State(state): State<AppState>,
    Json(request): Json<BriefRequest>,
) -> Result<Json<Brief>, ApiError> {
    let query = Query::new(request.query)
        .with_symbols(request.symbols)
        .with_holdings(request.holdings);
    info!(query_id = %query.id, "POST /brief");

    let brief = state.orchestrator.handle(&query).await?;
    Ok(Json(brief))
}

#[derive(Debug, Deserialize)]
pub struct NewsParams {
    pub symbol: String,
}

async fn debug_news(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<NewsParams>,
) -> Result<Json<NewsDigest>, ApiError> {
    let symbol = Symbol::parse(&params.symbol)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid symbol: {:?}", params.symbol)))?;
    Ok(Json(state.orchestrator.debug_news(&symbol).await))
}

#[derive(Debug, Default, Deserialize)]
pub struct VoiceParams {
    /// Comma separated.
    pub symbols: Option<String>,
}

async fn voice_brief(
    State(state): State<AppState>,
    QueryParams(params): QueryParams<VoiceParams>,
    audio: Bytes,
) -> Result<Response, ApiError> {
    let text = match state.voice.transcribe(audio.to_vec()).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Transcription failed, using default query");
            state.default_voice_query.clone()
        }
    };

    let symbols: Vec<String> = params
        .symbols
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let query = Query::new(text).with_symbols(symbols);
    info!(query_id = %query.id, "POST /brief/voice");
    let brief = state.orchestrator.handle(&query).await?;

    let audio = state
        .voice
        .synthesize(brief.narrative.text())
        .await
        .map_err(ApiError::Speech)?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_extraction_maps_to_bad_request() {
        let err = ApiError::from(OrchestrationError::SymbolExtraction("hello".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "symbol_extraction_failed");
        assert_eq!(err.stage(), Some(Stage::SymbolExtraction));
    }

    #[test]
    fn speech_failure_maps_to_bad_gateway() {
        let err = ApiError::Speech(AgentError::EmptyResponse("voice_tts".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.stage(), None);
    }
}

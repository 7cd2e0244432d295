//! OpenAI-compatible HTTP server.
//!
//! Routes, handlers, and the application context. Synthesis is CPU-bound
//! and runs on the blocking pool; the streaming endpoint completes the
//! synthesis first and emits the encoded bytes in fixed-size chunks with a
//! short yield in between.

pub mod api;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::allocator::DynamicCpuAllocator;
use crate::config::AppConfig;
use crate::error::TtsError;
use crate::preloader::Preloader;
use crate::synth::{stream_chunks, SynthesisOutcome, Synthesizer};

use api::{
    BlendBody, ErrorBody, HealthStatus, ModelInfo, ModelList, SpeechBody, VoiceInfo,
};

/// Pause between streamed chunks; lets slow clients drain.
const STREAM_YIELD: Duration = Duration::from_millis(5);

/// Everything the handlers share. Built once at startup; no global state.
pub struct AppContext {
    pub config: AppConfig,
    pub synth: Arc<Synthesizer>,
    pub preloader: Arc<Preloader>,
    pub allocator: Option<Arc<DynamicCpuAllocator>>,
    pub model_id: String,
}

/// Error wrapper so handlers can use `?` with [`TtsError`].
struct ApiError(TtsError);

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from_error(&self.0))).into_response()
    }
}

/// Build the router with every v1 route and the compatibility aliases.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let cors = cors_layer(&ctx.config);

    let router = Router::new()
        .route("/v1/audio/speech", post(speech))
        .route("/v1/audio/stream", post(stream))
        .route("/v1/audio/blend", post(blend))
        // Defensive aliases for clients that append the path twice.
        .route("/v1/audio/speech/audio/speech", post(speech))
        .route("/v1/audio/stream/audio/speech", post(stream))
        .route("/v1/voices", get(voices))
        .route("/v1/audio/voices", get(voices))
        .route("/v1/models", get(models))
        .route("/v1/health", get(health));

    // Debug surfaces only exist outside production.
    let router = if ctx.config.is_development() {
        router
            .route("/v1/debug/performance", get(performance_stats))
            .route("/v1/debug/warming", get(warming_stats))
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);
    if config.server.cors_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Run validated synthesis on the blocking pool.
async fn synthesize_blocking(
    ctx: &Arc<AppContext>,
    validated: api::ValidatedRequest,
    blend: Option<Vec<(String, f32)>>,
) -> Result<SynthesisOutcome, ApiError> {
    for warning in &validated.warnings {
        tracing::warn!(warning = %warning, "request warning");
    }
    ctx.preloader
        .on_request_received(&validated.request.text, &validated.request.voice);

    let synth = ctx.synth.clone();
    let request = validated.request;
    let outcome = tokio::task::spawn_blocking(move || match blend {
        Some(parts) => synth.synthesize_blend(&request, &parts),
        None => synth.synthesize(&request),
    })
    .await
    .map_err(|e| ApiError(TtsError::Encoding(format!("synthesis task failed: {e}"))))??;

    Ok(outcome)
}

async fn speech(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<SpeechBody>,
) -> Result<Response, ApiError> {
    let validated = api::validate_speech(&body, ctx.synth.voices(), &ctx.config)?;
    let format = validated.request.format;
    let outcome = synthesize_blocking(&ctx, validated, None).await?;

    Ok(audio_response(&outcome, format.content_type(), format.as_str()))
}

async fn stream(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<SpeechBody>,
) -> Result<Response, ApiError> {
    let validated = api::validate_speech(&body, ctx.synth.voices(), &ctx.config)?;
    let format = validated.request.format;
    // Errors must surface before the first chunk: synthesis completes
    // first, then the bytes stream out.
    let outcome = synthesize_blocking(&ctx, validated, None).await?;

    let chunks = stream_chunks(&outcome.bytes, ctx.config.audio.stream_chunk_bytes);
    info!(chunks = chunks.len(), "streaming response");

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<axum::body::Bytes, std::io::Error>>(4);
    tokio::spawn(async move {
        for chunk in chunks {
            if tx.send(Ok(axum::body::Bytes::from(chunk))).await.is_err() {
                // Client went away; drop the rest.
                break;
            }
            tokio::time::sleep(STREAM_YIELD).await;
        }
    });

    let body = Body::from_stream(tokio_stream::wrappers::ReceiverStream::new(rx));
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=stream.{}", format.as_str()),
        )
        .body(body)
        .map_err(|e| ApiError(TtsError::Encoding(format!("response build failed: {e}"))))?;
    Ok(response)
}

async fn blend(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<BlendBody>,
) -> Result<Response, ApiError> {
    let (validated, pairs) = api::validate_blend(&body, ctx.synth.voices(), &ctx.config)?;
    let format = validated.request.format;
    let outcome = synthesize_blocking(&ctx, validated, Some(pairs)).await?;

    Ok(audio_response(&outcome, format.content_type(), format.as_str()))
}

async fn voices(State(ctx): State<Arc<AppContext>>) -> Json<Vec<VoiceInfo>> {
    let infos: Vec<VoiceInfo> = ctx
        .synth
        .voices()
        .list()
        .iter()
        .map(|name| VoiceInfo::from_name(name))
        .collect();
    Json(infos)
}

async fn models(State(ctx): State<Arc<AppContext>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list",
        data: vec![ModelInfo {
            id: ctx.model_id.clone(),
            object: "model",
            created: 0,
            owned_by: env!("CARGO_PKG_NAME").to_string(),
        }],
    })
}

async fn performance_stats(State(ctx): State<Arc<AppContext>>) -> Response {
    let summary = ctx.synth.monitor().summary();
    let cache = ctx.synth.cache().stats();
    Json(serde_json::json!({
        "performance": summary,
        "cache": {
            "entries": cache.entries,
            "hits": cache.hits,
            "misses": cache.misses,
            "hit_rate_percent": cache.hit_rate_percent(),
        },
        "recommended_threads": ctx.allocator.as_ref().map(|a| a.recommended_threads()),
    }))
    .into_response()
}

async fn warming_stats(State(ctx): State<Arc<AppContext>>) -> Response {
    Json(serde_json::json!(ctx.preloader.stats())).into_response()
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        model_loaded: true,
        voices_available: ctx.synth.voices().len(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn audio_response(outcome: &SynthesisOutcome, content_type: &str, extension: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=speech.{extension}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        outcome.bytes.as_ref().clone(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_shape() {
        let err = TtsError::VoiceNotFound {
            voice: "xx".into(),
            suggestions: vec!["af_heart".into()],
        };
        let body = ErrorBody::from_error(&err);
        assert_eq!(body.error, "voice_not_found");
        assert!(body.detail.contains("xx"));
        assert_eq!(body.suggestions, vec!["af_heart"]);

        let json = serde_json::to_value(&body).expect("serialize");
        assert!(json.get("error").is_some());
        assert!(json.get("detail").is_some());
    }

    #[test]
    fn validation_errors_map_to_400() {
        let err = ApiError(TtsError::validation("bad"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn server_errors_map_to_500_class() {
        let response = ApiError(TtsError::InvalidAudio).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = ApiError(TtsError::ModelNotLoaded("gone".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

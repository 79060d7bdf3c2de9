//! HTTP boundary: JSON job submission and diagnostics routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

use crate::adapters::aws::s3::S3Adapter;
use crate::adapters::engine::EngineAdapter;
use crate::application::health::{self, HealthState};
use crate::application::housekeeping;
use crate::application::postprocess::PostprocessService;
use crate::application::render::RenderService;
use crate::config::ServiceConfig;
use crate::domain::error::{PostprocessError, RenderError};
use crate::domain::postprocess::{PostprocessRequest, VariantResult};
use crate::domain::render::{RenderRequest, RenderResult};
use crate::media::cmd::RealFfmpegRunner;
use crate::ports::storage::StoragePort;

pub struct AppState {
    pub render: RenderService<EngineAdapter, S3Adapter, RealFfmpegRunner>,
    pub postprocess: PostprocessService<S3Adapter, RealFfmpegRunner>,
    pub storage: S3Adapter,
    pub ffmpeg: RealFfmpegRunner,
    pub config: ServiceConfig,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/render", post(submit_render))
        .route("/postprocess", post(submit_postprocess))
        .route("/health", get(health_check))
        .route("/presigned-url", get(presigned_url))
        .route("/render/cleanup", delete(cleanup_scratch))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderResponse {
    status: &'static str,
    output_path: Option<String>,
    duration_ms: u64,
    metadata: Option<RenderResult>,
    error_message: Option<String>,
    error_code: Option<&'static str>,
}

async fn submit_render(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return render_failure(
                started,
                &RenderError::InvalidRequest(rejection.body_text()),
            );
        }
    };

    match state.render.submit(request).await {
        Ok(completed) => (
            StatusCode::OK,
            Json(RenderResponse {
                status: "success",
                output_path: Some(completed.s3_key),
                duration_ms: started.elapsed().as_millis() as u64,
                metadata: Some(completed.result),
                error_message: None,
                error_code: None,
            }),
        )
            .into_response(),
        Err(err) => render_failure(started, &err),
    }
}

fn render_failure(started: Instant, err: &RenderError) -> Response {
    error!(code = err.code(), error = %err, "Render request failed");
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(RenderResponse {
            status: "error",
            output_path: None,
            duration_ms: started.elapsed().as_millis() as u64,
            metadata: None,
            error_message: Some(err.to_string()),
            error_code: Some(err.code()),
        }),
    )
        .into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostprocessResponse {
    status: &'static str,
    variants: Vec<VariantResult>,
    srt_s3_path: Option<String>,
    total_duration_ms: u64,
    error_message: Option<String>,
}

async fn submit_postprocess(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PostprocessRequest>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return postprocess_failure(
                started,
                &PostprocessError::InvalidRequest(rejection.body_text()),
            );
        }
    };

    match state.postprocess.postprocess(request).await {
        Ok(result) => (
            StatusCode::OK,
            Json(PostprocessResponse {
                status: "success",
                variants: result.variants,
                srt_s3_path: result.srt_s3_key,
                total_duration_ms: started.elapsed().as_millis() as u64,
                error_message: None,
            }),
        )
            .into_response(),
        Err(err) => postprocess_failure(started, &err),
    }
}

fn postprocess_failure(started: Instant, err: &PostprocessError) -> Response {
    error!(error = %err, "Post-process request failed");
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(PostprocessResponse {
            status: "error",
            variants: Vec::new(),
            srt_s3_path: None,
            total_duration_ms: started.elapsed().as_millis() as u64,
            error_message: Some(err.to_string()),
        }),
    )
        .into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: HealthState,
    ffmpeg_available: bool,
    chromium_available: bool,
    s3_connected: bool,
    timestamp: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let status = health::health(&state.storage, &state.ffmpeg, &state.config.engine_binary).await;
    let http_status = match status.status {
        HealthState::Ok | HealthState::Degraded => StatusCode::OK,
        HealthState::Error => StatusCode::SERVICE_UNAVAILABLE,
    };
    (
        http_status,
        Json(HealthResponse {
            status: status.status,
            ffmpeg_available: status.ffmpeg_available,
            chromium_available: status.engine_available,
            s3_connected: status.storage_connected,
            timestamp: Utc::now().to_rfc3339(),
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
struct PresignQuery {
    key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignResponse {
    url: String,
    expires_in: u64,
}

async fn presigned_url(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PresignQuery>, axum::extract::rejection::QueryRejection>,
) -> Response {
    let Ok(Query(query)) = query else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"errorMessage": "query parameter 'key' is required"})),
        )
            .into_response();
    };

    let ttl = Duration::from_secs(state.config.presign_ttl_secs);
    match state.storage.presign(&query.key, ttl).await {
        Ok(url) => (
            StatusCode::OK,
            Json(PresignResponse {
                url,
                expires_in: ttl.as_secs(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(key = %query.key, error = %e, "Presigning failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"errorMessage": "failed to presign key"})),
            )
                .into_response()
        }
    }
}

#[derive(Serialize)]
struct CleanupResponse {
    deleted: usize,
    timestamp: String,
}

async fn cleanup_scratch(State(state): State<Arc<AppState>>) -> Response {
    match housekeeping::cleanup_stale(&state.config.scratch_dir, state.config.scratch_max_age_ms)
        .await
    {
        Ok(deleted) => (
            StatusCode::OK,
            Json(CleanupResponse {
                deleted,
                timestamp: Utc::now().to_rfc3339(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Scratch cleanup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"errorMessage": "cleanup failed"})),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_error_envelope_serializes_with_camel_case_fields() {
        let response = RenderResponse {
            status: "error",
            output_path: None,
            duration_ms: 12,
            metadata: None,
            error_message: Some("busy".into()),
            error_code: Some("RENDER_PROCESS_FAILED"),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["errorCode"], "RENDER_PROCESS_FAILED");
        assert_eq!(value["outputPath"], serde_json::Value::Null);
        assert_eq!(value["durationMs"], 12);
    }

    #[test]
    fn health_envelope_uses_the_documented_field_names() {
        let response = HealthResponse {
            status: HealthState::Degraded,
            ffmpeg_available: true,
            chromium_available: true,
            s3_connected: false,
            timestamp: "2025-01-01T00:00:00Z".into(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "degraded");
        assert_eq!(value["chromiumAvailable"], true);
        assert_eq!(value["s3Connected"], false);
    }
}

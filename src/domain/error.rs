//! Classified error taxonomy for the render and post-process pipelines.
//!
//! Callers branch on the machine-readable code, never on raw messages, so
//! every failure mode must map onto exactly one variant here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Render capacity exhausted; the caller should retry with backoff.
    #[error("render capacity exhausted ({current}/{max} renders in flight)")]
    Busy { current: usize, max: usize },

    #[error("composition '{id}' not found; known compositions: {known:?}")]
    CompositionNotFound { id: String, known: Vec<String> },

    #[error("render process failed: {0}")]
    ProcessFailed(String),

    #[error("render timed out after {0}ms")]
    Timeout(u64),

    #[error("storage upload failed: {0}")]
    UploadFailed(String),

    #[error("rendered output file is empty")]
    OutputEmpty,

    #[error("rendered output is invalid: {0}")]
    OutputInvalid(String),
}

impl RenderError {
    /// Stable machine-readable code surfaced in HTTP responses.
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::InvalidRequest(_) => "INVALID_REQUEST",
            // Busy shares the process-failure code on the wire; occupancy
            // details live in the message and the 503 status.
            RenderError::Busy { .. } => "RENDER_PROCESS_FAILED",
            RenderError::CompositionNotFound { .. } => "COMPOSITION_NOT_FOUND",
            RenderError::ProcessFailed(_) => "RENDER_PROCESS_FAILED",
            RenderError::Timeout(_) => "RENDER_TIMEOUT",
            RenderError::UploadFailed(_) => "S3_UPLOAD_FAILED",
            RenderError::OutputEmpty => "OUTPUT_EMPTY",
            RenderError::OutputInvalid(_) => "OUTPUT_INVALID",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            RenderError::InvalidRequest(_) | RenderError::CompositionNotFound { .. } => 400,
            RenderError::Busy { .. } => 503,
            _ => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum PostprocessError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to fetch '{key}' from storage: {source}")]
    Fetch {
        key: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: &'static str, message: String },

    #[error("storage upload failed: {0}")]
    UploadFailed(String),
}

impl PostprocessError {
    pub fn http_status(&self) -> u16 {
        match self {
            PostprocessError::InvalidRequest(_) => 400,
            _ => 500,
        }
    }
}

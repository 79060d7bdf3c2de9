//! Render job requests and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

use super::error::RenderError;

pub const DEFAULT_COMPOSITION: &str = "Diagnostic";
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_FPS: u32 = 30;

/// Classification of the video being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoType {
    Short,
    Standard,
    Longform,
    Diagnostic,
}

impl Default for VideoType {
    fn default() -> Self {
        VideoType::Diagnostic
    }
}

fn default_composition() -> String {
    DEFAULT_COMPOSITION.to_string()
}

fn default_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

/// A unit of render work submitted by the upstream content system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub brief_id: String,
    /// Non-negative job identifier, used for idempotent artifact naming.
    pub execution_id: u64,
    #[serde(default)]
    pub video_type: VideoType,
    #[serde(default)]
    pub vertical: String,
    #[serde(default = "default_composition")]
    pub composition_id: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Explicit duration override in seconds; the composition default applies
    /// when absent.
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// Open property bag merged into the engine input.
    #[serde(default)]
    pub composition_props: HashMap<String, Value>,
}

impl RenderRequest {
    /// Shape validation; catalog membership is checked later against the
    /// live composition catalog.
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.brief_id.trim().is_empty() {
            return Err(RenderError::InvalidRequest("briefId must not be empty".into()));
        }
        if self.composition_id.trim().is_empty() {
            return Err(RenderError::InvalidRequest(
                "compositionId must not be empty".into(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidRequest(format!(
                "resolution {}x{} is not renderable",
                self.width, self.height
            )));
        }
        if !(1..=60).contains(&self.fps) {
            return Err(RenderError::InvalidRequest(format!(
                "fps must be between 1 and 60, got {}",
                self.fps
            )));
        }
        if let Some(duration) = self.duration_secs {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(RenderError::InvalidRequest(format!(
                    "durationSecs must be positive, got {}",
                    duration
                )));
            }
        }
        Ok(())
    }

    /// Merge base job fields with the caller-supplied property bag into the
    /// single input object passed opaquely to the engine.
    pub fn engine_input(&self) -> Value {
        let mut input = serde_json::Map::new();
        input.insert("briefId".into(), Value::String(self.brief_id.clone()));
        input.insert("executionId".into(), Value::from(self.execution_id));
        input.insert(
            "videoType".into(),
            serde_json::to_value(self.video_type).unwrap_or(Value::Null),
        );
        input.insert("vertical".into(), Value::String(self.vertical.clone()));
        for (key, value) in &self.composition_props {
            input.insert(key.clone(), value.clone());
        }
        Value::Object(input)
    }
}

/// A composition as declared by the engine's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionDescriptor {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_in_frames: u64,
}

/// Resolution/fps overrides applied on top of a composition's declared
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOverrides {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration_in_frames: Option<u64>,
}

/// A validated, checksummed local render artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    #[serde(skip)]
    pub local_path: PathBuf,
    pub codec: String,
    pub resolution: String,
    pub fps: u32,
    pub size_bytes: u64,
    pub composition_id: String,
    pub engine_version: String,
    /// Probed duration; `None` when the best-effort probe failed.
    pub duration_secs: Option<f64>,
    pub checksum_sha256: String,
}

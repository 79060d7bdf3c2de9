//! Post-process job requests and results.

use serde::{Deserialize, Serialize};

use super::error::PostprocessError;

pub const DEFAULT_LOUDNESS_TARGET: f64 = -14.0;

fn default_true() -> bool {
    true
}

fn default_loudness_target() -> f64 {
    DEFAULT_LOUDNESS_TARGET
}

/// Codec family for derivative variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantCodec {
    H264,
    H265,
}

impl VariantCodec {
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            VariantCodec::H264 => "libx264",
            VariantCodec::H265 => "libx265",
        }
    }
}

/// One requested derivative encoding of the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub codec: VariantCodec,
}

/// A timed subtitle segment; start and end are seconds from stream start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostprocessRequest {
    pub brief_id: String,
    pub execution_id: u64,
    /// Storage key of the source video.
    pub video_key: String,
    /// Storage key of a separate audio track to merge, if any.
    #[serde(default)]
    pub audio_key: Option<String>,
    pub variants: Vec<VariantSpec>,
    #[serde(default = "default_true")]
    pub normalize_loudness: bool,
    #[serde(default = "default_loudness_target")]
    pub loudness_target_lufs: f64,
    #[serde(default)]
    pub subtitle_segments: Option<Vec<SubtitleSegment>>,
}

impl PostprocessRequest {
    pub fn validate(&self) -> Result<(), PostprocessError> {
        if self.brief_id.trim().is_empty() {
            return Err(PostprocessError::InvalidRequest(
                "briefId must not be empty".into(),
            ));
        }
        if self.video_key.trim().is_empty() {
            return Err(PostprocessError::InvalidRequest(
                "videoKey must not be empty".into(),
            ));
        }
        if self.variants.is_empty() {
            return Err(PostprocessError::InvalidRequest(
                "at least one variant must be requested".into(),
            ));
        }
        for variant in &self.variants {
            if variant.name.trim().is_empty() {
                return Err(PostprocessError::InvalidRequest(
                    "variant name must not be empty".into(),
                ));
            }
            if variant.width == 0 || variant.height == 0 {
                return Err(PostprocessError::InvalidRequest(format!(
                    "variant '{}' has unusable resolution {}x{}",
                    variant.name, variant.width, variant.height
                )));
            }
        }
        if let Some(segments) = &self.subtitle_segments {
            for (i, segment) in segments.iter().enumerate() {
                if segment.start_secs < 0.0 || segment.end_secs < segment.start_secs {
                    return Err(PostprocessError::InvalidRequest(format!(
                        "subtitle segment {} has invalid timing {}..{}",
                        i, segment.start_secs, segment.end_secs
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Delivery record for one produced variant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantResult {
    pub name: String,
    pub s3_key: String,
    pub codec: VariantCodec,
    pub resolution: String,
    pub size_bytes: u64,
    pub duration_secs: Option<f64>,
}

/// Manifest returned by a completed post-process job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostprocessResult {
    pub variants: Vec<VariantResult>,
    pub srt_s3_key: Option<String>,
}

//! Post-processing pipeline: fetch, audio merge, two-pass loudness
//! normalization, variant rendering, subtitle generation, upload.
//!
//! Stages fail fast with a classified error, except loudness measurement,
//! which degrades to unmodified audio. Scratch files are removed
//! unconditionally at the end of the request.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::Output;
use tracing::{info, warn};

use crate::domain::error::PostprocessError;
use crate::domain::keys;
use crate::domain::postprocess::{
    PostprocessRequest, PostprocessResult, VariantResult, VariantSpec,
};
use crate::domain::subtitles;
use crate::media::cmd::{parse_probed_duration, summarize_stderr, FfmpegRunner};
use crate::media::loudness;
use crate::ports::storage::StoragePort;

pub struct PostprocessService<S, F> {
    storage: S,
    ffmpeg: F,
    scratch_dir: PathBuf,
}

struct ScratchSet {
    files: Vec<PathBuf>,
}

impl ScratchSet {
    fn new() -> Self {
        Self { files: Vec::new() }
    }

    fn track(&mut self, path: PathBuf) -> PathBuf {
        self.files.push(path.clone());
        path
    }

    async fn purge(self) {
        for file in self.files {
            let _ = tokio::fs::remove_file(file).await;
        }
    }
}

impl<S, F> PostprocessService<S, F>
where
    S: StoragePort,
    F: FfmpegRunner,
{
    pub fn new(storage: S, ffmpeg: F, scratch_dir: PathBuf) -> Self {
        Self {
            storage,
            ffmpeg,
            scratch_dir,
        }
    }

    pub async fn postprocess(
        &self,
        request: PostprocessRequest,
    ) -> Result<PostprocessResult, PostprocessError> {
        request.validate()?;

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| PostprocessError::Stage {
                stage: "setup",
                message: format!("scratch dir unusable: {}", e),
            })?;

        let mut scratch = ScratchSet::new();
        let outcome = self.run_stages(&request, &mut scratch).await;
        scratch.purge().await;
        outcome
    }

    async fn run_stages(
        &self,
        request: &PostprocessRequest,
        scratch: &mut ScratchSet,
    ) -> Result<PostprocessResult, PostprocessError> {
        let stamp = Utc::now().timestamp_millis();
        // Shares the render scratch prefix so the housekeeping sweep also
        // reclaims orphans left by a crashed post-process run.
        let scratch_name = |suffix: &str| {
            self.scratch_dir
                .join(keys::scratch_file_name(request.execution_id, stamp, suffix))
        };

        // 1. Fetch inputs
        let video_path = scratch.track(scratch_name("source.mp4"));
        self.fetch(&request.video_key, &video_path).await?;

        let mut master = video_path.clone();

        // 2. Optional audio merge
        if let Some(audio_key) = &request.audio_key {
            let audio_path = scratch.track(scratch_name("audio.m4a"));
            self.fetch(audio_key, &audio_path).await?;

            let merged = scratch.track(scratch_name("merged.mp4"));
            let started = std::time::Instant::now();
            let output = self
                .ffmpeg
                .run_audio_merge(&master, &audio_path, &merged)
                .await;
            check_stage("audio_merge", output)?;
            info!(stage = "audio_merge", elapsed_ms = started.elapsed().as_millis() as u64, "Stage complete");
            master = merged;
        }

        // 3. Optional two-pass loudness normalization (degrade, don't fail).
        // The output path is tracked up front so a partial file from a
        // failed apply pass is still purged.
        if request.normalize_loudness {
            let normalized = scratch.track(scratch_name("normalized.mp4"));
            if self
                .normalize_loudness(request, &master, &normalized)
                .await?
                .is_some()
            {
                master = normalized;
            }
        }

        // 4. Variant rendering (fail fast on the first broken variant)
        let mut variants = Vec::with_capacity(request.variants.len());
        for spec in &request.variants {
            let variant = self
                .render_variant(request, spec, &master, scratch, &scratch_name(&format!("variant-{}.mp4", spec.name)))
                .await?;
            variants.push(variant);
        }

        // 5. Optional subtitle generation
        let srt_s3_key = match &request.subtitle_segments {
            Some(segments) if !segments.is_empty() => {
                let srt_path = scratch.track(scratch_name("subtitles.srt"));
                tokio::fs::write(&srt_path, subtitles::to_srt(segments))
                    .await
                    .map_err(|e| PostprocessError::Stage {
                        stage: "subtitles",
                        message: e.to_string(),
                    })?;

                let key = keys::subtitles_key(&request.brief_id, request.execution_id);
                self.storage
                    .upload(&srt_path, &key, "application/x-subrip")
                    .await
                    .map_err(|e| PostprocessError::UploadFailed(e.to_string()))?;
                Some(key)
            }
            _ => None,
        };

        info!(
            brief_id = %request.brief_id,
            execution_id = request.execution_id,
            variants = variants.len(),
            subtitles = srt_s3_key.is_some(),
            "Post-processing complete"
        );

        Ok(PostprocessResult { variants, srt_s3_key })
    }

    async fn fetch(&self, key: &str, local_path: &Path) -> Result<(), PostprocessError> {
        if key.trim().is_empty() || key.starts_with('/') || key.contains("..") {
            return Err(PostprocessError::InvalidRequest(format!(
                "malformed storage key '{}'",
                key
            )));
        }
        self.storage
            .download(key, local_path)
            .await
            .map_err(|source| PostprocessError::Fetch {
                key: key.to_string(),
                source,
            })
    }

    /// Two-pass loudness normalization. Returns the normalized file, or
    /// `None` when the measurement pass produced nothing parseable and the
    /// unmodified stream should proceed.
    async fn normalize_loudness(
        &self,
        request: &PostprocessRequest,
        master: &Path,
        output_path: &Path,
    ) -> Result<Option<PathBuf>, PostprocessError> {
        let target = request.loudness_target_lufs;
        let measured = match self.ffmpeg.run_loudness_measure(master, target).await {
            Ok(out) => loudness::parse_measurement(&String::from_utf8_lossy(&out.stderr)),
            Err(e) => {
                warn!(error = %e, "Loudness measurement pass failed to run");
                None
            }
        };

        let measured = match measured {
            Some(m) => m,
            None => {
                warn!("Loudness measurement unparseable; proceeding with unmodified audio");
                return Ok(None);
            }
        };

        info!(
            input_i = measured.input_i,
            input_tp = measured.input_tp,
            input_lra = measured.input_lra,
            target_lufs = target,
            "Applying loudness normalization"
        );

        let output = self
            .ffmpeg
            .run_loudness_apply(master, output_path, target, &measured)
            .await;
        check_stage("loudness_apply", output)?;
        Ok(Some(output_path.to_path_buf()))
    }

    async fn render_variant(
        &self,
        request: &PostprocessRequest,
        spec: &VariantSpec,
        master: &Path,
        scratch: &mut ScratchSet,
        output_path: &Path,
    ) -> Result<VariantResult, PostprocessError> {
        let output_path = scratch.track(output_path.to_path_buf());
        let started = std::time::Instant::now();
        let output = self
            .ffmpeg
            .run_variant_encode(master, &output_path, spec)
            .await;
        check_stage("variant_encode", output)?;
        info!(
            stage = "variant_encode",
            variant = %spec.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage complete"
        );

        let size_bytes = tokio::fs::metadata(&output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size_bytes == 0 {
            return Err(PostprocessError::Stage {
                stage: "variant_encode",
                message: format!("variant '{}' produced an empty file", spec.name),
            });
        }

        let duration_secs =
            parse_probed_duration(&self.ffmpeg.run_ffprobe_for_duration(&output_path).await);

        let s3_key = keys::variant_key(&request.brief_id, request.execution_id, &spec.name);
        self.storage
            .upload(&output_path, &s3_key, "video/mp4")
            .await
            .map_err(|e| PostprocessError::UploadFailed(e.to_string()))?;

        Ok(VariantResult {
            name: spec.name.clone(),
            s3_key,
            codec: spec.codec,
            resolution: format!("{}x{}", spec.width, spec.height),
            size_bytes,
            duration_secs,
        })
    }
}

fn check_stage(stage: &'static str, output: std::io::Result<Output>) -> Result<(), PostprocessError> {
    match output {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => {
            let transcript = String::from_utf8_lossy(&out.stderr);
            // Full transcript goes to the log; responses get a masked
            // one-line summary with no local paths.
            warn!(stage, stderr = %transcript.trim(), "Stage subprocess failed");
            Err(PostprocessError::Stage {
                stage,
                message: summarize_stderr(&transcript),
            })
        }
        Err(e) => Err(PostprocessError::Stage {
            stage,
            message: e.to_string(),
        }),
    }
}

//! Render orchestration: admission control, engine invocation with a
//! deadline, output integrity validation, upload, guaranteed cleanup.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::error::RenderError;
use crate::domain::keys;
use crate::domain::render::{
    CompositionDescriptor, RenderOverrides, RenderRequest, RenderResult,
};
use crate::media::cmd::{parse_probed_duration, summarize_stderr, FfmpegRunner};
use crate::ports::engine::RenderEnginePort;
use crate::ports::storage::StoragePort;

/// Minimum playable duration accepted from the engine, seconds.
const MIN_PLAYABLE_SECS: f64 = 0.5;

/// A validated render delivered to storage.
#[derive(Debug, Clone)]
pub struct CompletedRender {
    pub s3_key: String,
    pub result: RenderResult,
}

pub struct RenderService<E, S, F> {
    engine: E,
    storage: S,
    ffmpeg: F,
    /// Admission gate; the owned permit is the guaranteed-decrement guard.
    gate: Arc<Semaphore>,
    max_renders: usize,
    scratch_dir: PathBuf,
    render_timeout: Duration,
}

impl<E, S, F> RenderService<E, S, F>
where
    E: RenderEnginePort,
    S: StoragePort,
    F: FfmpegRunner,
{
    pub fn new(
        engine: E,
        storage: S,
        ffmpeg: F,
        max_renders: usize,
        scratch_dir: PathBuf,
        render_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            storage,
            ffmpeg,
            gate: Arc::new(Semaphore::new(max_renders)),
            max_renders,
            scratch_dir,
            render_timeout,
        }
    }

    /// Submit a render job. Rejected immediately with a busy signal when at
    /// capacity; never queued or blocked.
    pub async fn submit(&self, request: RenderRequest) -> Result<CompletedRender, RenderError> {
        request.validate()?;

        let _permit = match self.gate.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                let current = self.max_renders - self.gate.available_permits();
                return Err(RenderError::Busy {
                    current,
                    max: self.max_renders,
                });
            }
        };

        let composition = self.resolve_composition(&request).await?;

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| RenderError::ProcessFailed(format!("scratch dir unusable: {}", e)))?;

        let timestamp_ms = Utc::now().timestamp_millis();
        let local_path = self.scratch_dir.join(keys::scratch_file_name(
            request.execution_id,
            timestamp_ms,
            "out.mp4",
        ));

        let outcome = self
            .execute(&request, &composition, &local_path, timestamp_ms)
            .await;

        // Scratch release on every exit path, success or failure.
        let _ = tokio::fs::remove_file(&local_path).await;

        outcome
    }

    async fn resolve_composition(
        &self,
        request: &RenderRequest,
    ) -> Result<CompositionDescriptor, RenderError> {
        let catalog = self
            .engine
            .compositions()
            .await
            .map_err(|e| RenderError::ProcessFailed(format!("catalog unavailable: {}", e)))?;

        match catalog.iter().find(|c| c.id == request.composition_id) {
            Some(composition) => Ok(composition.clone()),
            None => Err(RenderError::CompositionNotFound {
                id: request.composition_id.clone(),
                known: catalog.into_iter().map(|c| c.id).collect(),
            }),
        }
    }

    async fn execute(
        &self,
        request: &RenderRequest,
        composition: &CompositionDescriptor,
        local_path: &Path,
        timestamp_ms: i64,
    ) -> Result<CompletedRender, RenderError> {
        let overrides = RenderOverrides {
            width: request.width,
            height: request.height,
            fps: request.fps,
            duration_in_frames: request
                .duration_secs
                .map(|secs| (secs * request.fps as f64).round() as u64),
        };

        info!(
            brief_id = %request.brief_id,
            execution_id = request.execution_id,
            composition = %composition.id,
            width = overrides.width,
            height = overrides.height,
            fps = overrides.fps,
            "Starting render"
        );

        self.invoke_engine(request, composition, overrides, local_path)
            .await?;
        let result = self
            .validate_output(request, composition, overrides, local_path)
            .await?;

        let s3_key = keys::render_key(&request.brief_id, request.execution_id, timestamp_ms);
        self.storage
            .upload(local_path, &s3_key, "video/mp4")
            .await
            .map_err(|e| RenderError::UploadFailed(e.to_string()))?;

        info!(
            s3_key = %s3_key,
            size_bytes = result.size_bytes,
            duration_secs = ?result.duration_secs,
            "Render delivered"
        );

        Ok(CompletedRender { s3_key, result })
    }

    async fn invoke_engine(
        &self,
        request: &RenderRequest,
        composition: &CompositionDescriptor,
        overrides: RenderOverrides,
        local_path: &Path,
    ) -> Result<(), RenderError> {
        let cancel = CancellationToken::new();
        let timer = {
            let cancel = cancel.clone();
            let deadline = self.render_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                cancel.cancel();
            })
        };

        let input = request.engine_input();
        let rendered = self
            .engine
            .render(composition, &input, overrides, local_path, cancel.clone())
            .await;
        timer.abort();

        rendered.map_err(|e| {
            let message = e.to_string();
            if cancel.is_cancelled() || message.to_lowercase().contains("cancel") {
                RenderError::Timeout(self.render_timeout.as_millis() as u64)
            } else {
                // Engine transcripts carry scratch paths; log the full
                // message, surface a masked one-line summary.
                warn!(error = %message, "Engine invocation failed");
                RenderError::ProcessFailed(summarize_stderr(&message))
            }
        })
    }

    /// Never trust the engine's exit code alone: the file must exist, be
    /// non-empty and (when probing succeeds) at least half a second long.
    async fn validate_output(
        &self,
        request: &RenderRequest,
        composition: &CompositionDescriptor,
        overrides: RenderOverrides,
        local_path: &Path,
    ) -> Result<RenderResult, RenderError> {
        let size_bytes = match tokio::fs::metadata(local_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };
        if size_bytes == 0 {
            warn!(path = ?local_path, "Engine produced an empty output file");
            return Err(RenderError::OutputEmpty);
        }

        let duration_secs =
            parse_probed_duration(&self.ffmpeg.run_ffprobe_for_duration(local_path).await);
        if let Some(duration) = duration_secs {
            if duration < MIN_PLAYABLE_SECS {
                return Err(RenderError::OutputInvalid(format!(
                    "probed duration {:.3}s is below the {:.1}s minimum",
                    duration, MIN_PLAYABLE_SECS
                )));
            }
        }

        let checksum_sha256 = checksum_file(local_path)
            .await
            .map_err(|e| RenderError::OutputInvalid(format!("checksum failed: {}", e)))?;

        Ok(RenderResult {
            local_path: local_path.to_path_buf(),
            codec: String::from("h264"),
            resolution: format!("{}x{}", overrides.width, overrides.height),
            fps: request.fps,
            size_bytes,
            composition_id: composition.id.clone(),
            engine_version: self.engine.version().await,
            duration_secs,
            checksum_sha256,
        })
    }
}

async fn checksum_file(path: &Path) -> std::io::Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::render::VideoType;
    use crate::media::cmd::MockFfmpegRunner;
    use crate::ports::engine::MockRenderEnginePort;
    use crate::ports::storage::MockStoragePort;
    use std::collections::HashMap;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use tempfile::tempdir;
    use tokio::sync::Notify;

    fn catalog() -> Vec<CompositionDescriptor> {
        vec![CompositionDescriptor {
            id: "Diagnostic".into(),
            width: 1920,
            height: 1080,
            fps: 30,
            duration_in_frames: 300,
        }]
    }

    fn request() -> RenderRequest {
        RenderRequest {
            brief_id: "brief-1".into(),
            execution_id: 7,
            video_type: VideoType::Diagnostic,
            vertical: "news".into(),
            composition_id: "Diagnostic".into(),
            width: 1920,
            height: 1080,
            fps: 30,
            duration_secs: None,
            composition_props: HashMap::new(),
        }
    }

    fn probe_output(stdout: &str) -> std::io::Result<Output> {
        Ok(Output {
            status: ExitStatus::from_raw(0),
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        })
    }

    fn engine_with_catalog() -> MockRenderEnginePort {
        let mut engine = MockRenderEnginePort::new();
        engine
            .expect_compositions()
            .returning(|| Box::pin(async { Ok(catalog()) }));
        engine
            .expect_version()
            .returning(|| Box::pin(async { String::from("engine 4.2.0") }));
        engine
    }

    fn probing_ffmpeg(duration: &'static str) -> MockFfmpegRunner {
        let mut ffmpeg = MockFfmpegRunner::new();
        ffmpeg
            .expect_run_ffprobe_for_duration()
            .returning(move |_| Box::pin(async move { probe_output(duration) }));
        ffmpeg
    }

    fn accepting_storage() -> MockStoragePort {
        let mut storage = MockStoragePort::new();
        storage
            .expect_upload()
            .returning(|_, _, _| Box::pin(async { Ok(()) }));
        storage
    }

    #[tokio::test]
    async fn unknown_composition_is_rejected_with_known_ids() {
        let mut engine = MockRenderEnginePort::new();
        engine
            .expect_compositions()
            .returning(|| Box::pin(async { Ok(catalog()) }));
        engine.expect_render().times(0);

        let service = RenderService::new(
            engine,
            MockStoragePort::new(),
            MockFfmpegRunner::new(),
            1,
            tempdir().unwrap().path().to_path_buf(),
            Duration::from_secs(5),
        );

        let mut req = request();
        req.composition_id = "DoesNotExist".into();
        match service.submit(req).await {
            Err(RenderError::CompositionNotFound { id, known }) => {
                assert_eq!(id, "DoesNotExist");
                assert_eq!(known, vec!["Diagnostic".to_string()]);
            }
            other => panic!("expected CompositionNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn successful_render_uploads_and_cleans_scratch() {
        let scratch = tempdir().unwrap();
        let mut engine = engine_with_catalog();
        engine.expect_render().times(1).returning(|_, _, _, path, _| {
            let path = path.to_path_buf();
            Box::pin(async move {
                std::fs::write(&path, b"mp4 bytes")?;
                Ok(())
            })
        });

        let mut storage = MockStoragePort::new();
        storage
            .expect_upload()
            .withf(|_, key, content_type| {
                key.starts_with("renders/brief-1/7/") && content_type == "video/mp4"
            })
            .times(1)
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let service = RenderService::new(
            engine,
            storage,
            probing_ffmpeg("2.0\n"),
            1,
            scratch.path().to_path_buf(),
            Duration::from_secs(5),
        );

        let completed = service.submit(request()).await.unwrap();
        assert_eq!(completed.result.size_bytes, 9);
        assert_eq!(completed.result.duration_secs, Some(2.0));
        assert_eq!(completed.result.resolution, "1920x1080");
        assert_eq!(
            completed.result.checksum_sha256,
            format!("{:x}", Sha256::digest(b"mp4 bytes"))
        );
        // No scratch file referencing the execution survives the request.
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn empty_output_fails_and_is_deleted() {
        let scratch = tempdir().unwrap();
        let mut engine = engine_with_catalog();
        engine.expect_render().returning(|_, _, _, path, _| {
            let path = path.to_path_buf();
            Box::pin(async move {
                std::fs::write(&path, b"")?;
                Ok(())
            })
        });

        let service = RenderService::new(
            engine,
            MockStoragePort::new(),
            MockFfmpegRunner::new(),
            1,
            scratch.path().to_path_buf(),
            Duration::from_secs(5),
        );

        let result = service.submit(request()).await;
        assert!(matches!(result, Err(RenderError::OutputEmpty)));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn sub_half_second_output_is_invalid() {
        let scratch = tempdir().unwrap();
        let mut engine = engine_with_catalog();
        engine.expect_render().returning(|_, _, _, path, _| {
            let path = path.to_path_buf();
            Box::pin(async move {
                std::fs::write(&path, b"tiny")?;
                Ok(())
            })
        });

        let service = RenderService::new(
            engine,
            MockStoragePort::new(),
            probing_ffmpeg("0.2\n"),
            1,
            scratch.path().to_path_buf(),
            Duration::from_secs(5),
        );

        assert!(matches!(
            service.submit(request()).await,
            Err(RenderError::OutputInvalid(_))
        ));
    }

    #[tokio::test]
    async fn failed_duration_probe_degrades_to_none() {
        let scratch = tempdir().unwrap();
        let mut engine = engine_with_catalog();
        engine.expect_render().returning(|_, _, _, path, _| {
            let path = path.to_path_buf();
            Box::pin(async move {
                std::fs::write(&path, b"bytes")?;
                Ok(())
            })
        });

        let mut ffmpeg = MockFfmpegRunner::new();
        ffmpeg.expect_run_ffprobe_for_duration().returning(|_| {
            Box::pin(async {
                Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "ffprobe not found",
                ))
            })
        });

        let service = RenderService::new(
            engine,
            accepting_storage(),
            ffmpeg,
            1,
            scratch.path().to_path_buf(),
            Duration::from_secs(5),
        );

        let completed = service.submit(request()).await.unwrap();
        assert_eq!(completed.result.duration_secs, None);
    }

    #[tokio::test]
    async fn engine_failure_message_carries_no_local_paths() {
        let scratch = tempdir().unwrap();
        let mut engine = engine_with_catalog();
        engine.expect_render().returning(|_, _, _, _, _| {
            Box::pin(async {
                Err("engine exited with exit status: 1: cannot write /tmp/overture/render-7-1-out.mp4".into())
            })
        });

        let service = RenderService::new(
            engine,
            MockStoragePort::new(),
            MockFfmpegRunner::new(),
            1,
            scratch.path().to_path_buf(),
            Duration::from_secs(5),
        );

        match service.submit(request()).await {
            Err(err @ RenderError::ProcessFailed(_)) => {
                assert!(!err.to_string().contains("/tmp"));
            }
            other => panic!("expected ProcessFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn deadline_cancellation_surfaces_as_timeout() {
        let scratch = tempdir().unwrap();
        let mut engine = engine_with_catalog();
        engine.expect_render().returning(|_, _, _, _, cancel| {
            Box::pin(async move {
                tokio::select! {
                    _ = cancel.cancelled() => Err("render cancelled before the engine finished".into()),
                    _ = tokio::time::sleep(Duration::from_secs(60)) => Ok(()),
                }
            })
        });

        let service = RenderService::new(
            engine,
            MockStoragePort::new(),
            MockFfmpegRunner::new(),
            1,
            scratch.path().to_path_buf(),
            Duration::from_millis(50),
        );

        assert!(matches!(
            service.submit(request()).await,
            Err(RenderError::Timeout(50))
        ));
    }

    #[tokio::test]
    async fn over_capacity_submission_is_rejected_busy_then_freed() {
        let scratch = tempdir().unwrap();
        let release = Arc::new(Notify::new());

        let mut engine = engine_with_catalog();
        let gate = release.clone();
        engine.expect_render().returning(move |_, _, _, path, _| {
            let path = path.to_path_buf();
            let gate = gate.clone();
            Box::pin(async move {
                gate.notified().await;
                std::fs::write(&path, b"mp4 bytes")?;
                Ok(())
            })
        });

        let service = Arc::new(RenderService::new(
            engine,
            accepting_storage(),
            probing_ffmpeg("2.0\n"),
            1,
            scratch.path().to_path_buf(),
            Duration::from_secs(5),
        ));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.submit(request()).await })
        };
        // Let the first render reach the engine and hold the permit.
        tokio::time::sleep(Duration::from_millis(20)).await;

        match service.submit(request()).await {
            Err(RenderError::Busy { current, max }) => {
                assert_eq!((current, max), (1, 1));
            }
            other => panic!("expected Busy, got {:?}", other.map(|_| ())),
        }

        // Completion of the in-flight render frees the slot.
        release.notify_one();
        assert!(first.await.unwrap().is_ok());

        // Pre-arm the engine mock so the follow-up render does not block.
        release.notify_one();
        let again = service.submit(request()).await;
        // Either a fresh render succeeds or the engine mock is re-driven;
        // the admission gate must no longer reject.
        assert!(!matches!(again, Err(RenderError::Busy { .. })));
    }
}

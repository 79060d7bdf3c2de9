//! Process availability probe: encoding toolchain, rendering engine,
//! object storage. Read-only diagnostics, computed fresh on every request.

use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::media::cmd::FfmpegRunner;
use crate::ports::storage::StoragePort;

/// Upper bound on the ffmpeg version probe. Much shorter than the encode
/// timeout so a wedged toolchain cannot stall the probe endpoint.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    /// Core process dependencies present but storage unreachable: the
    /// service can still render, it just cannot deliver.
    Degraded,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub ffmpeg_available: bool,
    pub engine_available: bool,
    pub storage_connected: bool,
    pub status: HealthState,
}

/// Run the three sub-probes; each is independent and non-fatal to the
/// others.
pub async fn health<S, F>(storage: &S, ffmpeg: &F, engine_binary: &Path) -> HealthStatus
where
    S: StoragePort,
    F: FfmpegRunner,
{
    let ffmpeg_available = matches!(
        tokio::time::timeout(VERSION_PROBE_TIMEOUT, ffmpeg.run_version_check()).await,
        Ok(Ok(out)) if out.status.success()
    );
    let engine_available = executable_present(engine_binary);
    let storage_connected = storage.bucket_reachable().await;

    let status = match (ffmpeg_available, engine_available, storage_connected) {
        (true, true, true) => HealthState::Ok,
        (true, true, false) => HealthState::Degraded,
        _ => HealthState::Error,
    };

    HealthStatus {
        ffmpeg_available,
        engine_available,
        storage_connected,
        status,
    }
}

fn executable_present(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::cmd::MockFfmpegRunner;
    use crate::ports::storage::MockStoragePort;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};
    use tempfile::tempdir;

    fn version_output(success: bool) -> std::io::Result<Output> {
        Ok(Output {
            status: ExitStatus::from_raw(if success { 0 } else { 1 }),
            stdout: b"ffmpeg version 6.1".to_vec(),
            stderr: Vec::new(),
        })
    }

    fn executable(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("engine");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[tokio::test]
    async fn all_probes_passing_is_ok() {
        let dir = tempdir().unwrap();
        let engine = executable(dir.path());

        let mut storage = MockStoragePort::new();
        storage
            .expect_bucket_reachable()
            .returning(|| Box::pin(async { true }));
        let mut ffmpeg = MockFfmpegRunner::new();
        ffmpeg
            .expect_run_version_check()
            .returning(|| Box::pin(async { version_output(true) }));

        let status = health(&storage, &ffmpeg, &engine).await;
        assert_eq!(status.status, HealthState::Ok);
    }

    #[tokio::test]
    async fn unreachable_storage_degrades() {
        let dir = tempdir().unwrap();
        let engine = executable(dir.path());

        let mut storage = MockStoragePort::new();
        storage
            .expect_bucket_reachable()
            .returning(|| Box::pin(async { false }));
        let mut ffmpeg = MockFfmpegRunner::new();
        ffmpeg
            .expect_run_version_check()
            .returning(|| Box::pin(async { version_output(true) }));

        let status = health(&storage, &ffmpeg, &engine).await;
        assert_eq!(status.status, HealthState::Degraded);
        assert!(!status.storage_connected);
    }

    #[tokio::test]
    async fn missing_engine_is_an_error_even_with_storage() {
        let mut storage = MockStoragePort::new();
        storage
            .expect_bucket_reachable()
            .returning(|| Box::pin(async { true }));
        let mut ffmpeg = MockFfmpegRunner::new();
        ffmpeg
            .expect_run_version_check()
            .returning(|| Box::pin(async { version_output(true) }));

        let status = health(&storage, &ffmpeg, Path::new("/does/not/exist")).await;
        assert_eq!(status.status, HealthState::Error);
        assert!(!status.engine_available);
    }

    #[tokio::test(start_paused = true)]
    async fn wedged_ffmpeg_probe_times_out_as_unavailable() {
        let dir = tempdir().unwrap();
        let engine = executable(dir.path());

        let mut storage = MockStoragePort::new();
        storage
            .expect_bucket_reachable()
            .returning(|| Box::pin(async { true }));
        let mut ffmpeg = MockFfmpegRunner::new();
        ffmpeg.expect_run_version_check().returning(|| {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(600)).await;
                version_output(true)
            })
        });

        let status = health(&storage, &ffmpeg, &engine).await;
        assert!(!status.ffmpeg_available);
        assert_eq!(status.status, HealthState::Error);
    }

    #[tokio::test]
    async fn broken_ffmpeg_is_an_error() {
        let dir = tempdir().unwrap();
        let engine = executable(dir.path());

        let mut storage = MockStoragePort::new();
        storage
            .expect_bucket_reachable()
            .returning(|| Box::pin(async { true }));
        let mut ffmpeg = MockFfmpegRunner::new();
        ffmpeg
            .expect_run_version_check()
            .returning(|| Box::pin(async { version_output(false) }));

        let status = health(&storage, &ffmpeg, &engine).await;
        assert_eq!(status.status, HealthState::Error);
    }
}

//! Purging of orphaned scratch render files.

use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::info;

use crate::domain::keys::SCRATCH_PREFIX;

/// Delete scratch files matching the render-artifact prefix whose mtime is
/// older than `max_age_ms`. A missing scratch directory means a cold
/// process, not an error.
pub async fn cleanup_stale(scratch_dir: &Path, max_age_ms: u64) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(scratch_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let cutoff = SystemTime::now() - Duration::from_millis(max_age_ms);
    let mut deleted = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(SCRATCH_PREFIX) {
            continue;
        }

        let Ok(metadata) = entry.metadata().await else { continue };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else { continue };

        if modified < cutoff && tokio::fs::remove_file(entry.path()).await.is_ok() {
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(deleted, dir = ?scratch_dir, "Purged stale scratch files");
    }
    Ok(deleted)
}

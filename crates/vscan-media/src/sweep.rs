//! Removal of orphaned temp files.

use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;
use crate::fetch::TEMP_FILE_PREFIX;

/// Delete source temp files in `dir` older than `max_age`.
///
/// Only files carrying the source prefix are touched. Returns the number removed.
/// A missing directory counts as empty.
pub async fn sweep_stale_temp_files(dir: &Path, max_age: Duration) -> MediaResult<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(TEMP_FILE_PREFIX) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();

        if age < max_age {
            continue;
        }

        match fs::remove_file(entry.path()).await {
            Ok(()) => {
                debug!(path = %entry.path().display(), age_secs = age.as_secs(), "Removed stale temp file");
                removed += 1;
            }
            Err(e) => warn!(path = %entry.path().display(), "Failed to remove stale temp file: {}", e),
        }
    }

    Ok(removed)
}

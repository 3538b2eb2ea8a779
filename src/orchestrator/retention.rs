//! Startup sweep of stale channel working directories.
//!
//! Runs once, before any channel is served. Only directories directly under
//! the sessions root are considered; files are left alone. Pool entries in
//! memory are never touched.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use crate::{AppError, Result};

/// Delete every directory under `root` last modified more than
/// `max_age_days` ago. Returns how many were removed.
///
/// A missing `root` or `max_age_days == 0` removes nothing. Entries that
/// cannot be inspected or removed are logged and skipped.
///
/// # Errors
///
/// Returns `AppError::Io` if `root` exists but cannot be listed.
pub fn sweep_stale(root: &Path, max_age_days: u32) -> Result<usize> {
    let span = info_span!("retention_sweep", root = %root.display(), max_age_days);
    let _guard = span.enter();

    if max_age_days == 0 {
        debug!("retention sweep disabled");
        return Ok(0);
    }
    if !root.exists() {
        debug!("sessions root does not exist yet, nothing to sweep");
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(i64::from(max_age_days));
    let entries = std::fs::read_dir(root)
        .map_err(|err| AppError::Io(format!("failed to list {}: {err}", root.display())))?;

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let modified = match entry.metadata().and_then(|m| {
            if m.is_dir() {
                m.modified().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(modified)) => DateTime::<Utc>::from(modified),
            Ok(None) => continue,
            Err(err) => {
                warn!(path = %path.display(), %err, "cannot inspect entry, skipping");
                continue;
            }
        };

        if modified < cutoff {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), %modified, "removed stale channel directory");
                    removed += 1;
                }
                Err(err) => warn!(path = %path.display(), %err, "failed to remove stale directory"),
            }
        }
    }

    info!(removed, "retention sweep completed");
    Ok(removed)
}

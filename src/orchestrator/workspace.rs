//! Per-channel working directories.
//!
//! Every channel gets `<sessions_root>/<name>-<hash>`, where `<name>` is the
//! channel key reduced to filesystem-safe characters and `<hash>` is the
//! first 8 hex digits of the key's SHA-256. The hash keeps two keys that
//! sanitise to the same name apart. Directories are created empty.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::{AppError, Result};

/// Longest sanitised prefix kept in a directory name.
const MAX_NAME_CHARS: usize = 48;

/// Directory name for `channel_key`.
#[must_use]
pub fn channel_dir_name(channel_key: &str) -> String {
    let mut name: String = channel_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();
    let trimmed = name.trim_matches('_');
    if trimmed.is_empty() {
        name = "channel".to_owned();
    } else if trimmed.len() != name.len() {
        name = trimmed.to_owned();
    }

    let digest = Sha256::digest(channel_key.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    format!("{name}-{prefix:08x}")
}

/// Path of `channel_key`'s working directory under `root`.
#[must_use]
pub fn channel_dir(root: &Path, channel_key: &str) -> PathBuf {
    root.join(channel_dir_name(channel_key))
}

/// Create (if needed) and return `channel_key`'s working directory.
///
/// # Errors
///
/// Returns `AppError::Io` if the directory cannot be created.
pub fn ensure_channel_dir(root: &Path, channel_key: &str) -> Result<PathBuf> {
    let dir = channel_dir(root, channel_key);
    std::fs::create_dir_all(&dir).map_err(|err| {
        AppError::Io(format!(
            "failed to create working directory {}: {err}",
            dir.display()
        ))
    })?;
    Ok(dir)
}

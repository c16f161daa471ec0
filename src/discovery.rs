//! Ledger document discovery.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Prefix of the lock files Office leaves next to open documents.
const LOCK_FILE_PREFIX: &str = "~$";

/// Files in `dir` with `extension` (case-insensitive, without the dot),
/// sorted by name. Lock files and directories are skipped.
pub fn discover_batches(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let extension = extension.trim_start_matches('.');
    let mut batches = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(LOCK_FILE_PREFIX) {
            debug!(file = %name, "Skipping lock file");
            continue;
        }

        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches {
            batches.push(path);
        }
    }

    batches.sort();
    Ok(batches)
}

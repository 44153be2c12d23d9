//! Recursive disk usage.

use std::path::Path;

use walkdir::WalkDir;

/// Total size in bytes of the regular files under `path`.
///
/// `path` may be a single file. A nonexistent path is `0`. Entries that
/// disappear or cannot be read during the walk are skipped.
pub fn disk_usage_bytes(path: &Path) -> u64 {
    if !path.exists() {
        return 0;
    }

    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

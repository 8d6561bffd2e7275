//! Non-clobbering destination names.

use std::path::{Path, PathBuf};

/// Returns a path inside `target_dir` that does not exist yet.
///
/// If `target_dir/file_name` is free it is returned unchanged. Otherwise the
/// name is split on its final suffix and `_(1)`, `_(2)`, ... is appended to
/// the stem until a free name is found:
///
/// ```
/// # let dir = tempfile::TempDir::new().unwrap();
/// use autosort::collision::resolve_name;
///
/// std::fs::write(dir.path().join("report.pdf"), b"old").unwrap();
/// let path = resolve_name(dir.path(), "report.pdf");
/// assert_eq!(path, dir.path().join("report_(1).pdf"));
/// ```
///
/// The check is not atomic; a concurrent writer may take the name before the
/// caller uses it.
pub fn resolve_name(target_dir: &Path, file_name: &str) -> PathBuf {
    let candidate = target_dir.join(file_name);
    if !exists(&candidate) {
        return candidate;
    }

    let (stem, extension) = split_name(file_name);
    (1u64..)
        .map(|counter| target_dir.join(format!("{stem}_({counter}){extension}")))
        .find(|path| !exists(path))
        .unwrap_or(candidate)
}

/// Splits a file name into stem and extension (with its dot).
///
/// Only the final suffix is an extension, and a leading dot is part of the
/// stem: `a.tar.gz` -> (`a.tar`, `.gz`), `.env` -> (`.env`, ``).
fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < file_name.len() => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

// Broken symlinks count as taken.
fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

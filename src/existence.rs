use std::path::{Path, PathBuf};
use tokio::fs;

/// Returns the first location where `name` already exists as a regular file,
/// checking `output_dir` before each of `aux_dirs` in order.
pub async fn find_existing(output_dir: &Path, aux_dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    let dirs = std::iter::once(output_dir).chain(aux_dirs.iter().map(PathBuf::as_path));
    for dir in dirs {
        let candidate = dir.join(name);
        if let Ok(meta) = fs::metadata(&candidate).await {
            if meta.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

pub async fn exists(output_dir: &Path, aux_dirs: &[PathBuf], name: &str) -> bool {
    find_existing(output_dir, aux_dirs, name).await.is_some()
}

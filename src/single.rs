use crate::error::FetchError;
use log::debug;
use std::path::Path;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Downloads `url` in one request and writes it to `out_path`.
///
/// The body is buffered in memory and written to a sibling part file that is
/// renamed into place, so `out_path` only ever holds a complete body.
pub async fn fetch_whole(
    client: &reqwest::Client,
    url: &str,
    out_path: &Path,
) -> Result<u64, FetchError> {
    let resp = client.get(url).send().await?;

    if !resp.status().is_success() {
        return Err(FetchError::Status {
            status: resp.status(),
            url: url.to_string(),
        });
    }

    let body = resp.bytes().await?;
    debug!("Fetched {} bytes from {}", body.len(), url);

    write_atomic(out_path, &body).await?;
    Ok(body.len() as u64)
}

/// Creates a uniquely named `.name.XXXXXX.part` file next to `out_path`.
///
/// The returned path deletes the file when dropped; call `persist_part` to move the
/// finished file onto `out_path`. Two jobs writing the same name never share one.
pub fn create_part_file(out_path: &Path) -> std::io::Result<(File, TempPath)> {
    let dir = out_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = out_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (file, path) = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".part")
        .tempfile_in(dir)?
        .into_parts();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    Ok((File::from_std(file), path))
}

/// Moves a finished part file onto `out_path`.
pub fn persist_part(part: TempPath, out_path: &Path) -> Result<(), FetchError> {
    part.persist(out_path).map_err(|e| FetchError::Io(e.error))
}

async fn write_atomic(out_path: &Path, contents: &[u8]) -> Result<(), FetchError> {
    let (mut file, part) = create_part_file(out_path)?;
    file.write_all(contents).await?;
    file.flush().await?;
    drop(file);
    persist_part(part, out_path)
}

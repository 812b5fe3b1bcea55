use crate::error::FetchError;
use log::debug;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

pub async fn read_url_list(path: &Path) -> Result<Vec<String>, FetchError> {
    let mut file = File::open(path).await?;

    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;

    let urls = parse_url_list(&contents);
    debug!("Read {} URLs from {}", urls.len(), path.display());
    Ok(urls)
}

/// One URL per line; surrounding whitespace is trimmed, blank and `#` lines are skipped.
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

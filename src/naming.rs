use crate::error::FetchError;
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingPolicy {
    pub use_full_path: bool,
    pub prefix: String,
    pub suffix: String,
}

/// Derives the output file name for `url` under `policy`.
///
/// Full-path mode flattens the URL path into one name (`/a/b/c.jpg` -> `a-b-c.jpg`);
/// otherwise the last path segment is used. Prefix and suffix are only added when
/// missing, so resolving an already-resolved name is a no-op.
pub fn resolve(url: &str, policy: &NamingPolicy) -> Result<String, FetchError> {
    let base = if policy.use_full_path {
        full_path_name(url)?
    } else {
        last_segment(url).to_string()
    };

    if base.is_empty() {
        return Err(FetchError::InvalidUrl(format!("no file name in {}", url)));
    }

    Ok(apply_affixes(base, policy))
}

fn full_path_name(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;
    Ok(parsed.path().replace('/', "-").trim_matches('-').to_string())
}

fn last_segment(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    path.rsplit('/').next().unwrap_or(path)
}

fn apply_affixes(mut name: String, policy: &NamingPolicy) -> String {
    if !policy.prefix.is_empty() && !name.starts_with(&policy.prefix) {
        name.insert_str(0, &policy.prefix);
    }
    if !policy.suffix.is_empty() && !name.ends_with(&policy.suffix) {
        name.push_str(&policy.suffix);
    }
    name
}

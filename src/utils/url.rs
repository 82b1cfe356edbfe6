//! URL canonicalization for candidate dedup keys.

use url::Url;

/// Normalize an absolute URL into the form used as a dedup key:
/// lowercase scheme/host/path, no fragment, no query, no trailing slash
/// (other than the root path). Unparseable input is lowercased as-is.
pub fn canonicalize(url: &str) -> String {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return url.trim().to_lowercase(),
    };

    let scheme = parsed.scheme().to_lowercase();
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let mut path = parsed.path().to_lowercase();
    if path.len() > 1 && path.ends_with('/') {
        path.pop();
    }

    format!("{}://{}{}", scheme, host, path)
}

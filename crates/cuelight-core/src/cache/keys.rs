//! URL -> cache file name mapping

/// Name used for URLs that address a directory (`https://host/path/`)
pub const DIRECTORY_INDEX: &str = "index.html";

/// Derive the cache file name for a URL.
///
/// Query string and fragment are dropped, a trailing slash maps to
/// [`DIRECTORY_INDEX`], then the result goes through [`sanitize`].
pub fn cache_key_for_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let resource = &url[..end];
    if resource.ends_with('/') {
        sanitize(&format!("{resource}{DIRECTORY_INDEX}"))
    } else {
        sanitize(resource)
    }
}

/// Replace everything outside `[0-9a-zA-Z.-]` with `_` and lower-case
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Short identifier for log lines: the part after the last `_`
pub fn shorten(file_name: &str) -> &str {
    file_name.rsplit('_').next().unwrap_or(file_name)
}

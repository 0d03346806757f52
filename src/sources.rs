//! Source URL clean-up for documents fed into the knowledge store.

use url::Url;

/// Known host typos and their corrections. The first match wins.
const HOST_FIXES: &[(&str, &str)] = &[
    ("github.ioposts", "github.io/posts"),
    ("github.iopost", "github.io/posts"),
    ("github.io/posts/posts", "github.io/posts"),
    ("www.github.io", "github.io"),
    ("docs.python.org/docs", "docs.python.org"),
];

/// Add a missing `https://` scheme and repair well-known host typos.
///
/// When a typo is repaired the URL is rebuilt from scheme, host and path,
/// dropping any query or fragment. Unparseable input is returned with only
/// the scheme added.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    };

    let Ok(parsed) = Url::parse(&url) else {
        return url;
    };
    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return url;
    };
    for (typo, fix) in HOST_FIXES {
        if host.contains(typo) {
            let fixed = format!(
                "{}://{}{}",
                parsed.scheme(),
                host.replace(typo, fix),
                parsed.path()
            );
            tracing::info!(original = %url, fixed = %fixed, "Fixed URL typo");
            return fixed;
        }
    }
    url
}

/// True when `url` parses and has both a scheme and a host.
pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url.trim()).is_ok_and(|u| !u.scheme().is_empty() && u.has_host())
}

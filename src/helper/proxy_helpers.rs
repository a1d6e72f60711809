use percent_encoding::percent_decode_str;
use url::form_urlencoded;

pub const PROXY_ROUTE: &str = "/api/proxy-file";

/// `/api/proxy-file?path=<encoded>` for a path relative to the uploads root.
pub fn proxy_url(relative: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(relative.trim_start_matches('/').as_bytes()).collect();
    format!("{}?path={}", PROXY_ROUTE, encoded)
}

/// Rewrites a media URL of the upload host (`.../uploads/<rel>`) into the proxy
/// scheme. URLs already in proxy form are kept; anything else is passed through.
pub fn to_proxy_url(remote_url: &str) -> String {
    if remote_url.starts_with(PROXY_ROUTE) {
        return remote_url.to_string();
    }
    match remote_url.split_once("/uploads/") {
        Some((_, relative)) => {
            let relative = relative.split(['?', '#']).next().unwrap_or(relative);
            let decoded = percent_decode_str(relative).decode_utf8_lossy();
            proxy_url(&decoded)
        }
        None => remote_url.to_string(),
    }
}

fn decode_once(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn strip_prefixes(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('/');
    trimmed.strip_prefix("uploads/").unwrap_or(trimmed).to_string()
}

/// Path candidates for a `proxy-file` request, in lookup order: as received,
/// decoded once, decoded twice, and each of those with a leading `/` and
/// `uploads/` removed. Duplicates and empty strings are dropped.
pub fn decoding_candidates(raw: &str) -> Vec<String> {
    let once = decode_once(raw);
    let twice = decode_once(&once);
    let mut candidates: Vec<String> = Vec::new();
    for candidate in [
        raw.to_string(),
        once.clone(),
        twice.clone(),
        strip_prefixes(raw),
        strip_prefixes(&once),
        strip_prefixes(&twice),
    ] {
        if !candidate.trim().is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

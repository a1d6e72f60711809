use actix_web::web;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::helper::api_error::ApiError;
use crate::models::db_operations::gallery_file_operations::{is_media_file, write_gallery_cache};
use crate::models::db_operations::remote_operations::{
    endpoint_url, uploads_url, RemoteError, RemoteHost, FILE_LISTING_ENDPOINT,
};
use crate::models::gallery_store::GalleryStoreError;
use crate::models::{iso_now, GalleryCache, SyncReport};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("SERVER_BASE_URL is not configured; there is nothing to sync from")]
    NotConfigured,
    #[error("File listing {0} was not found on the remote host")]
    MissingListing(String),
    #[error("File listing has an unexpected shape")]
    UnexpectedListing,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] GalleryStoreError),
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotConfigured => ApiError::BadRequest(e.to_string()),
            SyncError::Remote(remote) => remote.into(),
            SyncError::Store(store) => store.into(),
            other => ApiError::Upstream { message: other.to_string(), body: None },
        }
    }
}

/// `list-files.php` answers with a list of paths or `{files: [...]}`, where
/// each file is a string or an object with a `path`.
pub fn extract_listing_paths(value: &Value) -> Result<Vec<String>, SyncError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("files")
            .and_then(Value::as_array)
            .ok_or(SyncError::UnexpectedListing)?,
        _ => return Err(SyncError::UnexpectedListing),
    };
    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::String(path) => Some(path.clone()),
            other => other.get("path").and_then(Value::as_str).map(str::to_string),
        })
        .collect())
}

/// Groups media paths by `year/subfolder` as absolute upload URLs. Paths
/// need at least `year/subfolder/file`; anything else is skipped.
pub fn group_listing(base_url: &str, paths: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut galleries: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for raw in paths {
        let trimmed = raw.trim().trim_start_matches('/');
        let relative = trimmed.strip_prefix("uploads/").unwrap_or(trimmed);
        let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 3 || segments.iter().any(|s| *s == "..") {
            continue;
        }
        let Some(file) = segments.last() else {
            continue;
        };
        if !is_media_file(file) {
            continue;
        }
        let key = format!("{}/{}", segments[0], segments[1]);
        galleries
            .entry(key)
            .or_default()
            .push(uploads_url(base_url, &segments.join("/")));
    }
    for media in galleries.values_mut() {
        media.sort();
        media.dedup();
    }
    galleries
}

pub async fn sync_remote_galleries(
    host: &RemoteHost,
    base_url: Option<&str>,
    cache_path: &Path,
) -> Result<SyncReport, SyncError> {
    let base_url = base_url.ok_or(SyncError::NotConfigured)?;
    let url = endpoint_url(base_url, FILE_LISTING_ENDPOINT);
    let listing = host
        .get_json(&url, &[])
        .await?
        .ok_or_else(|| SyncError::MissingListing(url.clone()))?;
    let paths = extract_listing_paths(&listing)?;
    let galleries = group_listing(base_url, &paths);

    let cache = GalleryCache {
        synced_at: iso_now(),
        source: url,
        galleries,
    };
    let gallery_count = cache.galleries.len();
    let file_count = cache.galleries.values().map(Vec::len).sum();
    let synced_at = cache.synced_at.clone();

    let target: PathBuf = cache_path.to_path_buf();
    web::block(move || write_gallery_cache(&target, &cache))
        .await
        .map_err(|_| GalleryStoreError::Blocking)??;

    log::info!(
        "Gallery sync finished: {} galleries, {} files -> {}",
        gallery_count,
        file_count,
        cache_path.display()
    );
    Ok(SyncReport {
        gallery_count,
        file_count,
        synced_at,
        cache_path: cache_path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn listing_shapes() {
        let bare = extract_listing_paths(&json!(["a/b/c.jpg", { "path": "d/e/f.png" }, 5])).unwrap();
        assert_eq!(bare, vec!["a/b/c.jpg".to_string(), "d/e/f.png".to_string()]);
        let wrapped = extract_listing_paths(&json!({ "files": ["x/y/z.mp4"] })).unwrap();
        assert_eq!(wrapped.len(), 1);
        assert!(matches!(extract_listing_paths(&json!({ "nope": 1 })), Err(SyncError::UnexpectedListing)));
    }

    #[test]
    fn grouping_needs_three_segments_and_media() {
        let paths: Vec<String> = [
            "/uploads/2024/Hochzeit Anna/b.jpg",
            "uploads/2024/Hochzeit Anna/a.jpg",
            "2024/Hochzeit Anna/meta.json",
            "2024/loose.jpg",
            "2023/Club/night/x.MP4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let grouped = group_listing("https://tubox.de", &paths);
        assert_eq!(grouped.len(), 2);
        assert_eq!(
            grouped["2024/Hochzeit Anna"],
            vec![
                "https://tubox.de/uploads/2024/Hochzeit%20Anna/a.jpg".to_string(),
                "https://tubox.de/uploads/2024/Hochzeit%20Anna/b.jpg".to_string(),
            ]
        );
        assert_eq!(grouped["2023/Club"], vec!["https://tubox.de/uploads/2023/Club/night/x.MP4".to_string()]);
    }
}

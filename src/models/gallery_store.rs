use actix_web::web;
use async_trait::async_trait;
use reqwest::multipart;
use serde_json::{json, Value};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::helper::proxy_helpers::{proxy_url, to_proxy_url};
use crate::models::db_operations::gallery_file_operations as files;
use crate::models::db_operations::remote_operations::{
    endpoint_url, uploads_url, RemoteError, RemoteHost, DELETE_ENDPOINT, GALLERY_LISTING_ENDPOINT,
    GALLERY_META_ENDPOINT, UPLOAD_ENDPOINT,
};
use crate::models::{Gallery, GalleryCache, GalleryKey, GalleryMeta};

pub const PLACEHOLDER_IMAGE: &str = "/images/placeholder-gallery.jpg";
const PLACEHOLDER_GALLERIES: [(&str, &str); 3] = [("2024", "Portraits"), ("2024", "Landschaften"), ("2023", "Events")];

#[derive(Error, Debug)]
pub enum GalleryStoreError {
    #[error("Gallery storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Gallery data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not walk the uploads directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Rejected(String),
    #[error("Blocking task was cancelled")]
    Blocking,
}

/// A file resolved for `proxy-file`: a path on local disk or an open
/// response from the upload host.
pub enum ProxiedFile {
    Local(PathBuf),
    Remote(reqwest::Response),
}

#[async_trait]
pub trait GalleryStore: Send + Sync {
    fn backend_name(&self) -> &'static str;
    async fn list_galleries(&self) -> Result<Vec<Gallery>, GalleryStoreError>;
    async fn read_meta(&self, key: &GalleryKey) -> Result<Option<GalleryMeta>, GalleryStoreError>;
    async fn write_meta(&self, key: &GalleryKey, meta: &GalleryMeta) -> Result<(), GalleryStoreError>;
    async fn delete_gallery(&self, relative: &str) -> Result<(), GalleryStoreError>;
    async fn delete_file(&self, relative: &str) -> Result<(), GalleryStoreError>;
    /// Returns the stored path relative to the uploads root.
    async fn save_upload(&self, folder: &str, filename: &str, bytes: web::Bytes) -> Result<String, GalleryStoreError>;
    async fn open_file(&self, relative: &str) -> Result<Option<ProxiedFile>, GalleryStoreError>;
}

async fn run_blocking<T, F>(f: F) -> Result<T, GalleryStoreError>
where
    F: FnOnce() -> Result<T, GalleryStoreError> + Send + 'static,
    T: Send + 'static,
{
    web::block(f).await.map_err(|_| GalleryStoreError::Blocking)?
}

pub struct LocalGalleryStore {
    root: PathBuf,
}

impl LocalGalleryStore {
    pub fn new(root: PathBuf) -> Self {
        LocalGalleryStore { root }
    }
}

#[async_trait]
impl GalleryStore for LocalGalleryStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn list_galleries(&self) -> Result<Vec<Gallery>, GalleryStoreError> {
        let root = self.root.clone();
        run_blocking(move || files::list_galleries(&root)).await
    }

    async fn read_meta(&self, key: &GalleryKey) -> Result<Option<GalleryMeta>, GalleryStoreError> {
        let root = self.root.clone();
        let key = key.clone();
        run_blocking(move || files::read_meta(&root, &key)).await
    }

    async fn write_meta(&self, key: &GalleryKey, meta: &GalleryMeta) -> Result<(), GalleryStoreError> {
        let root = self.root.clone();
        let key = key.clone();
        let meta = meta.clone();
        run_blocking(move || files::write_meta(&root, &key, &meta)).await
    }

    async fn delete_gallery(&self, relative: &str) -> Result<(), GalleryStoreError> {
        let root = self.root.clone();
        let relative = relative.to_string();
        run_blocking(move || files::delete_gallery(&root, &relative)).await
    }

    async fn delete_file(&self, relative: &str) -> Result<(), GalleryStoreError> {
        let root = self.root.clone();
        let relative = relative.to_string();
        run_blocking(move || files::delete_file(&root, &relative)).await
    }

    async fn save_upload(&self, folder: &str, filename: &str, bytes: web::Bytes) -> Result<String, GalleryStoreError> {
        let root = self.root.clone();
        let folder = folder.to_string();
        let filename = filename.to_string();
        run_blocking(move || files::save_upload(&root, &folder, &filename, &bytes)).await
    }

    async fn open_file(&self, relative: &str) -> Result<Option<ProxiedFile>, GalleryStoreError> {
        let root = self.root.clone();
        let relative = relative.to_string();
        let located = run_blocking(move || Ok(files::locate_file(&root, &relative))).await?;
        Ok(located.map(ProxiedFile::Local))
    }
}

/// Galleries hosted on `SERVER_BASE_URL`.
pub struct RemoteGalleryStore {
    host: RemoteHost,
    base_url: String,
    cache_path: PathBuf,
}

impl RemoteGalleryStore {
    pub fn new(host: RemoteHost, base_url: String, cache_path: PathBuf) -> Self {
        RemoteGalleryStore { host, base_url, cache_path }
    }

    async fn fetch_listing(&self) -> Result<Vec<Gallery>, GalleryStoreError> {
        let url = endpoint_url(&self.base_url, GALLERY_LISTING_ENDPOINT);
        match self.host.get_json(&url, &[]).await? {
            Some(value) => Ok(galleries_from_listing(value)),
            None => Ok(Vec::new()),
        }
    }

    async fn cached_listing(&self) -> Vec<Gallery> {
        let path = self.cache_path.clone();
        match run_blocking(move || files::read_gallery_cache(&path)).await {
            Ok(Some(cache)) => galleries_from_cache(&cache),
            Ok(None) => Vec::new(),
            Err(e) => {
                log::warn!("Gallery cache {} is unreadable: {}", self.cache_path.display(), e);
                Vec::new()
            }
        }
    }
}

/// Media entries come as absolute upload URLs, `uploads/...` paths or plain
/// relative paths; all end up in the proxy scheme.
fn normalize_media_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("/uploads/") {
        to_proxy_url(raw)
    } else if let Some(relative) = raw.strip_prefix("uploads/") {
        proxy_url(relative)
    } else if raw.starts_with("http://") || raw.starts_with("https://") || raw.starts_with('/') {
        raw.to_string()
    } else {
        proxy_url(raw)
    }
}

fn first_str<'a>(item: &'a Value, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| match item.get(*name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    })
}

fn media_list(item: &Value) -> Vec<String> {
    let list = ["media", "images", "files"]
        .iter()
        .find_map(|name| item.get(*name).and_then(Value::as_array));
    let Some(list) = list else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.as_str()),
            other => first_str(other, &["url", "path", "src"]),
        })
        .map(normalize_media_url)
        .collect()
}

fn gallery_from_item(item: &Value) -> Option<Gallery> {
    let key = match (first_str(item, &["year", "jahr"]), first_str(item, &["name", "galerie", "gallery"])) {
        (Some(year), Some(name)) => GalleryKey::new(year, name),
        _ => first_str(item, &["key", "path"]).and_then(GalleryKey::parse),
    }
    .or_else(|| {
        // Numeric years are common in hand-written listings.
        let year = item.get("year").or_else(|| item.get("jahr")).and_then(Value::as_i64)?;
        GalleryKey::new(&year.to_string(), first_str(item, &["name", "galerie", "gallery"])?)
    })?;
    let meta = item
        .get("meta")
        .filter(|m| m.is_object())
        .and_then(|m| serde_json::from_value::<GalleryMeta>(m.clone()).ok());
    Some(Gallery::new(&key, media_list(item), meta))
}

fn galleries_from_map(map: &serde_json::Map<String, Value>) -> Vec<Gallery> {
    map.iter()
        .filter_map(|(key, media)| {
            let key = GalleryKey::parse(key)?;
            let media = media
                .as_array()
                .map(|list| list.iter().filter_map(Value::as_str).map(normalize_media_url).collect())
                .unwrap_or_default();
            Some(Gallery::new(&key, media, None))
        })
        .collect()
}

/// Accepts a bare list of galleries, `{galleries: [...]}`, or the cache
/// format `{galleries: {"year/name": [urls]}}`.
pub fn galleries_from_listing(value: Value) -> Vec<Gallery> {
    let mut galleries = match &value {
        Value::Array(items) => items.iter().filter_map(gallery_from_item).collect(),
        Value::Object(map) => match map.get("galleries") {
            Some(Value::Array(items)) => items.iter().filter_map(gallery_from_item).collect(),
            Some(Value::Object(inner)) => galleries_from_map(inner),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    sort_galleries(&mut galleries);
    galleries
}

pub fn galleries_from_cache(cache: &GalleryCache) -> Vec<Gallery> {
    let mut galleries: Vec<Gallery> = cache
        .galleries
        .iter()
        .filter_map(|(key, media)| {
            let key = GalleryKey::parse(key)?;
            Some(Gallery::new(&key, media.iter().map(|m| normalize_media_url(m)).collect(), None))
        })
        .collect();
    sort_galleries(&mut galleries);
    galleries
}

pub fn placeholder_galleries() -> Vec<Gallery> {
    PLACEHOLDER_GALLERIES
        .iter()
        .filter_map(|(year, name)| GalleryKey::new(year, name))
        .map(|key| Gallery {
            placeholder: true,
            ..Gallery::new(&key, vec![PLACEHOLDER_IMAGE.to_string()], None)
        })
        .collect()
}

fn sort_galleries(galleries: &mut [Gallery]) {
    galleries.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.name.cmp(&b.name)));
}

#[async_trait]
impl GalleryStore for RemoteGalleryStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    /// Remote listing, then the sync cache, then placeholders. Never fails.
    async fn list_galleries(&self) -> Result<Vec<Gallery>, GalleryStoreError> {
        match self.fetch_listing().await {
            Ok(galleries) if !galleries.is_empty() => return Ok(galleries),
            Ok(_) => log::warn!("Remote gallery listing is empty, trying the sync cache"),
            Err(e) => log::warn!("Remote gallery listing failed, trying the sync cache: {}", e),
        }
        let cached = self.cached_listing().await;
        if !cached.is_empty() {
            return Ok(cached);
        }
        log::warn!("No gallery cache available, serving placeholder galleries");
        Ok(placeholder_galleries())
    }

    async fn read_meta(&self, key: &GalleryKey) -> Result<Option<GalleryMeta>, GalleryStoreError> {
        let url = uploads_url(&self.base_url, &format!("{}/{}", key.as_path(), files::META_FILE));
        match self.host.get_json(&url, &[]).await? {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    async fn write_meta(&self, key: &GalleryKey, meta: &GalleryMeta) -> Result<(), GalleryStoreError> {
        let url = endpoint_url(&self.base_url, GALLERY_META_ENDPOINT);
        let body = json!({
            "gallery": key.as_path(),
            "year": key.year,
            "name": key.name,
            "meta": meta,
        });
        self.host.post_json(&url, &body).await?;
        log::info!("Wrote meta for remote gallery {}", key);
        Ok(())
    }

    async fn delete_gallery(&self, relative: &str) -> Result<(), GalleryStoreError> {
        let path = files::clean_relative(relative)?;
        let url = endpoint_url(&self.base_url, DELETE_ENDPOINT);
        self.host
            .post_json(&url, &json!({ "action": "deleteGallery", "path": path }))
            .await?;
        log::info!("Deleted remote gallery {}", path);
        Ok(())
    }

    async fn delete_file(&self, relative: &str) -> Result<(), GalleryStoreError> {
        let path = files::clean_relative(relative)?;
        let url = endpoint_url(&self.base_url, DELETE_ENDPOINT);
        self.host
            .post_json(&url, &json!({ "action": "deleteFile", "path": path }))
            .await?;
        log::info!("Deleted remote file {}", path);
        Ok(())
    }

    async fn save_upload(&self, folder: &str, filename: &str, bytes: web::Bytes) -> Result<String, GalleryStoreError> {
        let (year, gallery) = files::upload_folder(folder)?;
        let name = files::upload_file_name(filename)?;
        let folder = format!("{}/{}", year, gallery);
        let size = bytes.len();
        let form = multipart::Form::new()
            .text("folder", folder.clone())
            .part("file", multipart::Part::bytes(bytes.to_vec()).file_name(name.clone()));
        let url = endpoint_url(&self.base_url, UPLOAD_ENDPOINT);
        let response = self.host.post_multipart(&url, form).await?;
        let stored = first_str(&response, &["path", "file"])
            .and_then(|p| files::clean_relative(p.trim_start_matches("uploads/")).ok())
            .unwrap_or_else(|| format!("{}/{}", folder, name));
        log::info!("Uploaded {} ({} bytes) to the remote host", stored, size);
        Ok(stored)
    }

    async fn open_file(&self, relative: &str) -> Result<Option<ProxiedFile>, GalleryStoreError> {
        let Ok(path) = files::clean_relative(relative) else {
            return Ok(None);
        };
        let url = uploads_url(&self.base_url, &path);
        Ok(self.host.get_stream(&url).await?.map(ProxiedFile::Remote))
    }
}

pub fn select_gallery_store(config: &Config, host: &RemoteHost) -> Arc<dyn GalleryStore> {
    match (config.galleries_use_remote(), &config.server_base_url) {
        (true, Some(base_url)) => {
            log::info!("Gallery store: external ({})", base_url);
            Arc::new(RemoteGalleryStore::new(host.clone(), base_url.clone(), config.gallery_cache_path()))
        }
        _ => {
            log::info!("Gallery store: local ({})", config.uploads_root().display());
            Arc::new(LocalGalleryStore::new(config.uploads_root()))
        }
    }
}

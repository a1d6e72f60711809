use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{
    http::header::{self, HeaderValue},
    web, HttpRequest, HttpResponse,
};
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::helper::api_error::ApiError;
use crate::helper::proxy_helpers::{decoding_candidates, proxy_url};
use crate::helper::sync_helpers::sync_remote_galleries;
use crate::middleware::{is_admin_request, AuthenticatedAdmin};
use crate::models::gallery_store::ProxiedFile;
use crate::models::{GalleryKey, GalleryMeta, GalleryMetaUpdate};
use crate::AppState;

const PROXY_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Deserialize)]
pub struct GalleryQuery {
    gallery: Option<String>,
}

#[derive(Deserialize)]
pub struct GalleryAccessRequest {
    gallery: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryMetaRequest {
    gallery: String,
    #[serde(flatten)]
    update: GalleryMetaUpdate,
}

/// `path` or, for gallery deletes, `gallery`.
#[derive(Deserialize)]
pub struct PathRequest {
    path: Option<String>,
    gallery: Option<String>,
}

impl PathRequest {
    fn target(&self) -> Result<&str, ApiError> {
        self.path
            .as_deref()
            .or(self.gallery.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ApiError::BadRequest("path is required".to_string()))
    }
}

#[derive(Deserialize)]
pub struct ProxyQuery {
    path: Option<String>,
}

pub fn config_gallery(cfg: &mut web::ServiceConfig) {
    cfg.route("/galleries", web::get().to(list_galleries))
        .route("/gallery-access", web::post().to(unlock_gallery))
        .route("/gallery-meta", web::get().to(get_gallery_meta))
        .route("/gallery-meta", web::post().to(update_gallery_meta))
        .route("/delete-gallery", web::post().to(delete_gallery))
        .route("/delete-file", web::post().to(delete_file))
        .route("/proxy-file", web::get().to(proxy_file))
        .route("/upload", web::post().to(upload))
        .route("/sync-tubox-galleries", web::post().to(sync_galleries));
}

fn parse_key(raw: &str) -> Result<GalleryKey, ApiError> {
    GalleryKey::parse(raw).ok_or_else(|| ApiError::BadRequest("gallery must have the form year/name".to_string()))
}

async fn list_galleries(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let galleries = match state.gallery_store.list_galleries().await {
        Ok(galleries) => galleries,
        Err(e) => {
            log::error!("Gallery listing failed: {}", e);
            Vec::new()
        }
    };
    let galleries: Vec<_> = if is_admin_request(&req) {
        galleries
    } else {
        galleries.into_iter().map(|g| g.for_public()).collect()
    };
    HttpResponse::Ok().json(json!({
        "galleries": galleries,
        "backend": state.gallery_store.backend_name(),
    }))
}

async fn unlock_gallery(
    state: web::Data<AppState>,
    body: web::Json<GalleryAccessRequest>,
) -> Result<HttpResponse, ApiError> {
    let key = parse_key(&body.gallery)?;
    let gallery = state
        .gallery_store
        .list_galleries()
        .await?
        .into_iter()
        .find(|g| g.key == key.as_path())
        .ok_or_else(|| ApiError::NotFound(format!("Gallery '{}' not found", key)))?;

    if gallery.is_protected() {
        let matches = gallery.meta.as_ref().map_or(false, |m| m.password_matches(&body.password));
        if !matches {
            log::warn!("Wrong password for gallery {}", key);
            return Err(ApiError::Unauthorized("Wrong password".to_string()));
        }
    }
    let meta = gallery.meta.as_ref().map(GalleryMeta::redacted);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "gallery": gallery.key,
        "media": gallery.media,
        "cover": gallery.cover,
        "meta": meta,
    })))
}

/// Missing or unreadable meta answers with defaults; the password is only
/// shown to admins.
async fn get_gallery_meta(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<GalleryQuery>,
) -> Result<HttpResponse, ApiError> {
    let key = parse_key(query.gallery.as_deref().unwrap_or_default())?;
    let meta = match state.gallery_store.read_meta(&key).await {
        Ok(Some(meta)) => meta,
        Ok(None) => GalleryMeta::defaults_for(&key),
        Err(e) => {
            log::warn!("Could not read meta for gallery {}: {}", key, e);
            GalleryMeta::defaults_for(&key)
        }
    };
    let meta = if is_admin_request(&req) { meta } else { meta.redacted() };
    Ok(HttpResponse::Ok().json(json!({ "gallery": key.as_path(), "meta": meta })))
}

async fn update_gallery_meta(
    _admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    body: web::Json<GalleryMetaRequest>,
) -> Result<HttpResponse, ApiError> {
    let GalleryMetaRequest { gallery, update } = body.into_inner();
    let key = parse_key(&gallery)?;
    let mut meta = state
        .gallery_store
        .read_meta(&key)
        .await?
        .unwrap_or_else(|| GalleryMeta::defaults_for(&key));
    update.apply_to(&mut meta);
    if meta.jahr.is_empty() {
        meta.jahr = key.year.clone();
    }
    if meta.galerie.is_empty() {
        meta.galerie = key.name.clone();
    }
    state.gallery_store.write_meta(&key, &meta).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "gallery": key.as_path(), "meta": meta })))
}

async fn delete_gallery(
    admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    body: web::Json<PathRequest>,
) -> Result<HttpResponse, ApiError> {
    let target = body.target()?;
    state.gallery_store.delete_gallery(target).await?;
    log::info!("Admin '{}' deleted gallery {}", admin.0.username, target);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "deleted": target })))
}

async fn delete_file(
    admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    body: web::Json<PathRequest>,
) -> Result<HttpResponse, ApiError> {
    let target = body.target()?;
    state.gallery_store.delete_file(target).await?;
    log::info!("Admin '{}' deleted file {}", admin.0.username, target);
    Ok(HttpResponse::Ok().json(json!({ "success": true, "deleted": target })))
}

fn remote_content_type(response: &reqwest::Response, candidate: &str) -> String {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let ext = candidate.rsplit('.').next().unwrap_or_default();
            actix_files::file_extension_to_mime(ext).to_string()
        })
}

/// Serves a media file from the active gallery backend. Each decoding
/// candidate of `path` is tried in order.
async fn proxy_file(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ProxyQuery>,
) -> Result<HttpResponse, ApiError> {
    let raw = query.path.as_deref().unwrap_or_default();
    let candidates = decoding_candidates(raw);
    if candidates.is_empty() {
        return Err(ApiError::BadRequest("path is required".to_string()));
    }

    for candidate in &candidates {
        match state.gallery_store.open_file(candidate).await {
            Ok(Some(ProxiedFile::Local(path))) => {
                let file = NamedFile::open_async(&path)
                    .await
                    .map_err(|e| ApiError::Internal(format!("Could not open file: {}", e)))?;
                let mut response = file.into_response(&req);
                response
                    .headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static(PROXY_CACHE_CONTROL));
                return Ok(response);
            }
            Ok(Some(ProxiedFile::Remote(upstream))) => {
                let content_type = remote_content_type(&upstream, candidate);
                return Ok(HttpResponse::Ok()
                    .content_type(content_type)
                    .insert_header((header::CACHE_CONTROL, PROXY_CACHE_CONTROL))
                    .streaming(upstream.bytes_stream()));
            }
            Ok(None) => {}
            Err(e) => log::warn!("Proxy candidate '{}' failed: {}", candidate, e),
        }
    }
    log::debug!("No proxy candidate resolved for '{}'", raw);
    Err(ApiError::NotFound("File not found".to_string()))
}

struct UploadedFile {
    filename: String,
    bytes: web::BytesMut,
}

/// Multipart upload: a `folder` field (`year/gallery`) and one or more
/// `file` fields. `MAX_UPLOAD_SIZE_MB` caps the whole request, not each file.
async fn upload(
    admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    config: web::Data<Config>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let max_bytes = config.max_upload_size_bytes() as usize;
    let mut folder: Option<String> = None;
    let mut uploads: Vec<UploadedFile> = Vec::new();
    let mut received = 0usize;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().to_string();
        let filename = field.content_disposition().get_filename().map(str::to_string);
        let mut bytes = web::BytesMut::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
        {
            received += chunk.len();
            if received > max_bytes {
                return Err(ApiError::BadRequest(format!(
                    "Upload exceeds the limit of {} MB",
                    config.max_upload_size_mb
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        match (name.as_str(), filename) {
            ("folder", _) => folder = Some(String::from_utf8_lossy(&bytes).trim().to_string()),
            (_, Some(filename)) => uploads.push(UploadedFile { filename, bytes }),
            _ => log::debug!("Ignoring multipart field '{}'", name),
        }
    }

    let folder = folder
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::BadRequest("folder is required".to_string()))?;
    if uploads.is_empty() {
        return Err(ApiError::BadRequest("No file uploaded".to_string()));
    }

    let mut stored = Vec::with_capacity(uploads.len());
    for file in uploads {
        let path = state
            .gallery_store
            .save_upload(&folder, &file.filename, file.bytes.freeze())
            .await?;
        stored.push(path);
    }
    log::info!("Admin '{}' uploaded {} file(s) to {}", admin.0.username, stored.len(), folder);
    let urls: Vec<String> = stored.iter().map(|p| proxy_url(p)).collect();
    Ok(HttpResponse::Ok().json(json!({ "success": true, "files": stored, "urls": urls })))
}

async fn sync_galleries(
    _admin: AuthenticatedAdmin,
    state: web::Data<AppState>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let report = sync_remote_galleries(
        &state.remote,
        config.server_base_url.as_deref(),
        &config.gallery_cache_path(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "report": report })))
}

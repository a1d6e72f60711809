use serde::Deserialize;
use serde_json::{Map, Value};

use crate::helper::api_error::ApiError;
use crate::helper::form_helpers::{deserialize_optional_tags, deserialize_tags, lenient_id};
use crate::helper::sanitization_helpers::{sanitize_post_html, strip_all_html};
use crate::helper::session_helpers::now_ms;
use crate::helper::slug_helpers::{is_valid_slug, normalize_slug, resolve_slug};
use crate::models::blog_store::BlogStore;
use crate::models::{iso_now, BlogIndex, BlogIndexEntry, BlogPost, DraftFlag};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub title: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub content: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub featured_image: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_draft: Option<DraftFlag>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

/// Body of `POST /api/blog-data`. Only provided fields change.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub original_slug: Option<String>,
    pub slug: Option<String>,
    pub id: Option<Value>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub featured_image: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_tags")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_draft: Option<DraftFlag>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeletePostRequest {
    pub id: Option<Value>,
    pub slug: Option<String>,
}

/// A post reference as given by a client: a numeric id or a slug.
#[derive(Debug, Clone, PartialEq)]
pub enum PostKey {
    Id(i64),
    Slug(String),
}

impl PostKey {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Some(PostKey::Id(id));
        }
        let slug = normalize_slug(raw);
        (!slug.is_empty()).then_some(PostKey::Slug(slug))
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => PostKey::parse(s),
            other => lenient_id(other).map(PostKey::Id),
        }
    }
}

fn clean_text(value: Option<&str>) -> String {
    value.map(strip_all_html).unwrap_or_default()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Slug of the post a key points to. Ids are resolved through the index; an
/// all-digit key that is not a known id is tried as a slug.
pub async fn resolve_slug_for(store: &dyn BlogStore, key: &PostKey) -> Result<Option<String>, ApiError> {
    match key {
        PostKey::Slug(slug) => Ok(Some(slug.clone())),
        PostKey::Id(id) => {
            let index = store.load_index().await?;
            if let Some(entry) = index.find_by_id(*id) {
                return Ok(Some(entry.normalized_slug()));
            }
            let as_slug = id.to_string();
            if is_valid_slug(&as_slug) && store.slug_exists(&as_slug).await? {
                return Ok(Some(as_slug));
            }
            Ok(None)
        }
    }
}

pub async fn create_post(
    store: &dyn BlogStore,
    request: CreatePostRequest,
    default_author: &str,
) -> Result<BlogPost, ApiError> {
    let title = strip_all_html(&request.title);
    let content = sanitize_post_html(&request.content);
    if title.is_empty() || content.trim().is_empty() {
        return Err(ApiError::BadRequest("Title and content are required".to_string()));
    }
    let slug = resolve_slug(request.slug.as_deref(), &title);
    if slug.is_empty() {
        return Err(ApiError::BadRequest("Could not derive a slug from the title".to_string()));
    }
    if store.slug_exists(&slug).await? {
        return Err(ApiError::Conflict(format!("A post with slug '{}' already exists", slug)));
    }

    let now = iso_now();
    let is_draft = request.is_draft.unwrap_or_default();
    let author = clean_text(request.author.as_deref());
    let post = BlogPost {
        id: now_ms(),
        title,
        slug,
        content,
        excerpt: clean_text(request.excerpt.as_deref()),
        cover_image: clean_optional(request.cover_image),
        featured_image: clean_optional(request.featured_image),
        author: if author.is_empty() { default_author.to_string() } else { author },
        category: clean_text(request.category.as_deref()),
        tags: request.tags.iter().map(|t| strip_all_html(t)).filter(|t| !t.is_empty()).collect(),
        is_draft,
        seo_title: clean_text(request.seo_title.as_deref()),
        seo_description: clean_text(request.seo_description.as_deref()),
        created_at: now.clone(),
        updated_at: now.clone(),
        published_at: if is_draft.0 { None } else { Some(now) },
        extra: Map::new(),
    };
    store.create_post(&post).await?;
    Ok(post)
}

/// Provided fields overwrite, the slug never changes. `publishedAt` is set
/// when a draft goes live and cleared when a post goes back to draft.
pub fn apply_update(mut post: BlogPost, request: UpdatePostRequest) -> Result<BlogPost, ApiError> {
    if let Some(title) = request.title {
        let title = strip_all_html(&title);
        if title.is_empty() {
            return Err(ApiError::BadRequest("Title must not be empty".to_string()));
        }
        post.title = title;
    }
    if let Some(content) = request.content {
        let content = sanitize_post_html(&content);
        if content.trim().is_empty() {
            return Err(ApiError::BadRequest("Content must not be empty".to_string()));
        }
        post.content = content;
    }
    if let Some(excerpt) = request.excerpt {
        post.excerpt = strip_all_html(&excerpt);
    }
    if let Some(cover) = request.cover_image {
        post.cover_image = clean_optional(Some(cover));
    }
    if let Some(featured) = request.featured_image {
        post.featured_image = clean_optional(Some(featured));
    }
    if let Some(author) = request.author {
        post.author = strip_all_html(&author);
    }
    if let Some(category) = request.category {
        post.category = strip_all_html(&category);
    }
    if let Some(tags) = request.tags {
        post.tags = tags.iter().map(|t| strip_all_html(t)).filter(|t| !t.is_empty()).collect();
    }
    if let Some(seo_title) = request.seo_title {
        post.seo_title = strip_all_html(&seo_title);
    }
    if let Some(seo_description) = request.seo_description {
        post.seo_description = strip_all_html(&seo_description);
    }

    let now = iso_now();
    if let Some(is_draft) = request.is_draft {
        match (post.is_draft.0, is_draft.0) {
            (true, false) => post.published_at = Some(now.clone()),
            (false, true) => post.published_at = None,
            (false, false) if post.published_at.is_none() => post.published_at = Some(now.clone()),
            _ => {}
        }
        post.is_draft = is_draft;
    }
    post.updated_at = now;
    Ok(post)
}

pub async fn update_post(store: &dyn BlogStore, request: UpdatePostRequest) -> Result<BlogPost, ApiError> {
    let key = request
        .original_slug
        .as_deref()
        .or(request.slug.as_deref())
        .and_then(PostKey::parse)
        .map(|key| match key {
            // Slug fields always name a slug, even when all digits.
            PostKey::Id(id) => PostKey::Slug(id.to_string()),
            slug => slug,
        })
        .or_else(|| request.id.as_ref().and_then(PostKey::from_value))
        .ok_or_else(|| ApiError::BadRequest("originalSlug, slug or id is required".to_string()))?;

    let slug = resolve_slug_for(store, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    let existing = store
        .fetch_post(&slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Post '{}' not found", slug)))?;

    let mut updated = apply_update(existing, request)?;
    updated.slug = slug;
    store.update_post(&updated).await?;
    Ok(updated)
}

pub async fn fetch_post(store: &dyn BlogStore, raw_key: &str) -> Result<BlogPost, ApiError> {
    let key = PostKey::parse(raw_key).ok_or_else(|| ApiError::BadRequest("id is required".to_string()))?;
    let slug = resolve_slug_for(store, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    store
        .fetch_post(&slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Post '{}' not found", slug)))
}

/// Deletes by slug, or by id resolved through the index. Returns the slug.
pub async fn delete_post(store: &dyn BlogStore, request: DeletePostRequest) -> Result<String, ApiError> {
    let id = request.id.as_ref().and_then(lenient_id);
    let slug = match request.slug.as_deref().map(normalize_slug).filter(|s| !s.is_empty()) {
        Some(slug) => slug,
        None => {
            let key = request
                .id
                .as_ref()
                .and_then(PostKey::from_value)
                .ok_or_else(|| ApiError::BadRequest("id or slug is required".to_string()))?;
            resolve_slug_for(store, &key)
                .await?
                .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?
        }
    };
    store.delete_post(&slug, id).await?;
    Ok(slug)
}

pub fn published_entries(index: &BlogIndex) -> Vec<BlogIndexEntry> {
    index.entries.iter().filter(|e| !e.is_draft.0).cloned().collect()
}

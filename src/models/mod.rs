use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::helper::form_helpers::{
    deserialize_lenient_id, deserialize_lenient_string, deserialize_null_default,
    deserialize_optional_tags, deserialize_tag_string, deserialize_tags, join_tags,
};
use crate::helper::slug_helpers::normalize_slug;

/// Current time in the ISO format used by every stored timestamp.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_iso(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value.trim()).ok()
}

/// Draft status. Stored as the strings `"0"` / `"1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DraftFlag(pub bool);

impl Serialize for DraftFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if self.0 { "1" } else { "0" })
    }
}

impl<'de> Deserialize<'de> for DraftFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(DraftFlag(match Value::deserialize(deserializer)? {
            Value::Bool(b) => b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            _ => false,
        }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub slug: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub content: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub author: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub category: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_draft: DraftFlag,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub seo_title: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub seo_description: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub updated_at: String,
    #[serde(default)]
    pub published_at: Option<String>,
    /// Fields written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogIndexEntry {
    #[serde(default, deserialize_with = "deserialize_lenient_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub slug: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub title: String,
    #[serde(default)]
    pub is_draft: DraftFlag,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub category: String,
    #[serde(default, deserialize_with = "deserialize_tag_string")]
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlogIndexEntry {
    pub fn from_post(post: &BlogPost) -> Self {
        BlogIndexEntry {
            id: post.id,
            slug: post.slug.clone(),
            title: post.title.clone(),
            is_draft: post.is_draft,
            updated_at: Some(post.updated_at.clone()).filter(|s| !s.is_empty()),
            category: post.category.clone(),
            tags: join_tags(&post.tags),
            excerpt: Some(post.excerpt.clone()).filter(|s| !s.is_empty()),
            cover_image: post.cover_image.clone().or_else(|| post.featured_image.clone()),
            created_at: Some(post.created_at.clone()).filter(|s| !s.is_empty()),
            published_at: post.published_at.clone(),
            extra: Map::new(),
        }
    }

    pub fn normalized_slug(&self) -> String {
        normalize_slug(&self.slug)
    }

    pub fn updated_at_parsed(&self) -> Option<DateTime<FixedOffset>> {
        self.updated_at.as_deref().and_then(parse_iso)
    }
}

/// `index.json` exactly as found on disk: a bare list or a `{posts: [...]}` wrapper.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlogIndexFile {
    Bare(Vec<BlogIndexEntry>),
    Wrapped {
        posts: Vec<BlogIndexEntry>,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexShape {
    Bare,
    Wrapped,
}

/// Canonical in-memory index. The on-disk shape is remembered so writes
/// reproduce it.
#[derive(Debug, Clone)]
pub struct BlogIndex {
    pub shape: IndexShape,
    pub entries: Vec<BlogIndexEntry>,
    wrapper_extra: Map<String, Value>,
}

impl From<BlogIndexFile> for BlogIndex {
    fn from(file: BlogIndexFile) -> Self {
        match file {
            BlogIndexFile::Bare(entries) => BlogIndex {
                shape: IndexShape::Bare,
                entries,
                wrapper_extra: Map::new(),
            },
            BlogIndexFile::Wrapped { posts, extra } => BlogIndex {
                shape: IndexShape::Wrapped,
                entries: posts,
                wrapper_extra: extra,
            },
        }
    }
}

impl From<BlogIndex> for BlogIndexFile {
    fn from(index: BlogIndex) -> Self {
        match index.shape {
            IndexShape::Bare => BlogIndexFile::Bare(index.entries),
            IndexShape::Wrapped => BlogIndexFile::Wrapped {
                posts: index.entries,
                extra: index.wrapper_extra,
            },
        }
    }
}

impl BlogIndex {
    pub fn empty() -> Self {
        BlogIndex {
            shape: IndexShape::Bare,
            entries: Vec::new(),
            wrapper_extra: Map::new(),
        }
    }

    pub fn with_entries(shape: IndexShape, entries: Vec<BlogIndexEntry>) -> Self {
        BlogIndex { shape, entries, wrapper_extra: Map::new() }
    }

    /// Keeps shape and wrapper keys, swaps the entry list.
    pub fn replace_entries(&self, entries: Vec<BlogIndexEntry>) -> Self {
        BlogIndex {
            shape: self.shape,
            entries,
            wrapper_extra: self.wrapper_extra.clone(),
        }
    }

    pub fn find_by_id(&self, id: i64) -> Option<&BlogIndexEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<&BlogIndexEntry> {
        let wanted = normalize_slug(slug);
        self.entries.iter().find(|e| e.normalized_slug() == wanted)
    }

    /// Replaces the entry with the same normalized slug in place, or puts a
    /// new entry at the front.
    pub fn upsert(&mut self, entry: BlogIndexEntry) {
        let wanted = entry.normalized_slug();
        match self.entries.iter_mut().find(|e| e.normalized_slug() == wanted) {
            Some(existing) => {
                let extra = std::mem::take(&mut existing.extra);
                *existing = BlogIndexEntry { extra, ..entry };
            }
            None => self.entries.insert(0, entry),
        }
    }

    /// Removes the first entry whose normalized slug matches. Duplicates are
    /// left for `cleanupBlogIndex`.
    pub fn remove_slug(&mut self, slug: &str) -> bool {
        let wanted = normalize_slug(slug);
        match self.entries.iter().position(|e| e.normalized_slug() == wanted) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub original_count: usize,
    pub cleaned_count: usize,
    pub removed_count: usize,
    pub shape: IndexShape,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexCheckReport {
    pub path: String,
    pub exists: bool,
    pub valid: bool,
    pub shape: Option<IndexShape>,
    pub post_count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub added_slugs: Vec<String>,
    pub removed_slugs: Vec<String>,
    pub post_count: usize,
}

fn default_access_type() -> String {
    "public".to_string()
}

/// Per-gallery `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryMeta {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub jahr: String,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub galerie: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub kategorie: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default = "default_access_type")]
    pub access_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_protected: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GalleryMeta {
    pub fn defaults_for(key: &GalleryKey) -> Self {
        GalleryMeta {
            jahr: key.year.clone(),
            galerie: key.name.clone(),
            kategorie: String::new(),
            tags: Vec::new(),
            access_type: default_access_type(),
            password: None,
            password_protected: None,
            extra: Map::new(),
        }
    }

    pub fn is_protected(&self) -> bool {
        let wants_password = self.access_type.eq_ignore_ascii_case("password")
            || self.password_protected == Some(true);
        wants_password && self.password.as_deref().map_or(false, |p| !p.is_empty())
    }

    pub fn password_matches(&self, candidate: &str) -> bool {
        self.is_protected() && self.password.as_deref() == Some(candidate)
    }

    /// Copy safe for public responses: no password, explicit protection flag.
    pub fn redacted(&self) -> Self {
        GalleryMeta {
            password: None,
            password_protected: Some(self.is_protected()),
            ..self.clone()
        }
    }
}

/// Partial update for `POST /api/gallery-meta`; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryMetaUpdate {
    pub kategorie: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_tags")]
    pub tags: Option<Vec<String>>,
    pub access_type: Option<String>,
    pub password: Option<String>,
    pub password_protected: Option<bool>,
}

impl GalleryMetaUpdate {
    pub fn apply_to(self, meta: &mut GalleryMeta) {
        if let Some(kategorie) = self.kategorie {
            meta.kategorie = kategorie.trim().to_string();
        }
        if let Some(tags) = self.tags {
            meta.tags = tags;
        }
        if let Some(access_type) = self.access_type {
            meta.access_type = access_type.trim().to_lowercase();
        }
        if let Some(password) = self.password {
            meta.password = Some(password).filter(|p| !p.is_empty());
        }
        if let Some(flag) = self.password_protected {
            meta.password_protected = Some(flag);
        }
    }
}

/// `year/galleryName` composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GalleryKey {
    pub year: String,
    pub name: String,
}

impl GalleryKey {
    pub fn new(year: &str, name: &str) -> Option<Self> {
        let year = year.trim().trim_matches('/');
        let name = name.trim().trim_matches('/');
        let bad_segment = |s: &str| s.is_empty() || s.contains(['/', '\\']) || s.chars().all(|c| c == '.');
        if bad_segment(year) || bad_segment(name) {
            return None;
        }
        Some(GalleryKey { year: year.to_string(), name: name.to_string() })
    }

    pub fn parse(key: &str) -> Option<Self> {
        let (year, name) = key.trim().trim_matches('/').split_once('/')?;
        GalleryKey::new(year, name)
    }

    pub fn as_path(&self) -> String {
        format!("{}/{}", self.year, self.name)
    }
}

impl std::fmt::Display for GalleryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.year, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gallery {
    pub key: String,
    pub year: String,
    pub name: String,
    pub media: Vec<String>,
    pub cover: Option<String>,
    pub meta: Option<GalleryMeta>,
    pub locked: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

impl Gallery {
    pub fn new(key: &GalleryKey, media: Vec<String>, meta: Option<GalleryMeta>) -> Self {
        Gallery {
            key: key.as_path(),
            year: key.year.clone(),
            name: key.name.clone(),
            cover: media.first().cloned(),
            media,
            meta,
            locked: false,
            placeholder: false,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.meta.as_ref().map_or(false, GalleryMeta::is_protected)
    }

    /// Public view: password stripped, media hidden for protected galleries.
    pub fn for_public(mut self) -> Self {
        if self.is_protected() {
            self.media.clear();
            self.cover = None;
            self.locked = true;
        }
        self.meta = self.meta.as_ref().map(GalleryMeta::redacted);
        self
    }
}

/// Output of the remote file-listing sync, persisted as the gallery cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryCache {
    pub synced_at: String,
    pub source: String,
    pub galleries: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub gallery_count: usize,
    pub file_count: usize,
    pub synced_at: String,
    pub cache_path: String,
}

/// Identity carried by a valid `tubox_session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub username: String,
    pub email: String,
    pub role: String,
    pub session_id: String,
    pub timestamp: i64,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

pub mod blog_store;
pub mod gallery_store;
pub mod db_operations;
pub mod visitor_stats;

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(slug: &str) -> BlogIndexEntry {
        serde_json::from_value(serde_json::json!({ "id": 1, "slug": slug, "title": slug })).unwrap()
    }

    #[test]
    fn index_shape_survives_round_trip() {
        let wrapped: BlogIndexFile = serde_json::from_str(
            r#"{"posts": [{"id": 1, "slug": "a", "tags": ["x", "y"], "isDraft": true}], "version": 2}"#,
        )
        .unwrap();
        let index = BlogIndex::from(wrapped);
        assert_eq!(index.shape, IndexShape::Wrapped);
        assert_eq!(index.entries[0].tags, "x;y");
        assert_eq!(index.entries[0].is_draft, DraftFlag(true));

        let back = serde_json::to_value(BlogIndexFile::from(index)).unwrap();
        assert_eq!(back["version"], 2);
        assert_eq!(back["posts"][0]["isDraft"], "1");

        let bare: BlogIndexFile = serde_json::from_str(r#"[{"id": "7", "slug": "b"}]"#).unwrap();
        let index = BlogIndex::from(bare);
        assert_eq!(index.shape, IndexShape::Bare);
        assert_eq!(index.entries[0].id, 7);
        assert!(serde_json::to_value(BlogIndexFile::from(index)).unwrap().is_array());
    }

    #[test]
    fn upsert_replaces_by_normalized_slug_and_prepends_new() {
        let mut index = BlogIndex::with_entries(IndexShape::Bare, vec![entry("first"), entry("Second")]);
        let mut updated = entry("second");
        updated.title = "changed".to_string();
        index.upsert(updated);
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[1].title, "changed");

        index.upsert(entry("third"));
        assert_eq!(index.entries[0].slug, "third");
        assert!(index.remove_slug("THIRD"));
        assert_eq!(index.entries.len(), 2);
    }

    #[test]
    fn gallery_meta_protection_and_redaction() {
        let key = GalleryKey::parse("2024/Hochzeit").unwrap();
        let mut meta = GalleryMeta::defaults_for(&key);
        assert!(!meta.is_protected());

        GalleryMetaUpdate {
            access_type: Some("Password".to_string()),
            password: Some("geheim".to_string()),
            ..Default::default()
        }
        .apply_to(&mut meta);
        assert!(meta.is_protected());
        assert!(meta.password_matches("geheim"));
        assert!(!meta.password_matches("falsch"));

        let public = Gallery::new(&key, vec!["/a.jpg".to_string()], Some(meta)).for_public();
        assert!(public.locked);
        assert!(public.media.is_empty());
        let meta = public.meta.unwrap();
        assert_eq!(meta.password, None);
        assert_eq!(meta.password_protected, Some(true));
    }

    #[test]
    fn gallery_key_parsing() {
        assert_eq!(GalleryKey::parse("/2023/Portraits/").unwrap().as_path(), "2023/Portraits");
        assert!(GalleryKey::parse("2023").is_none());
        assert!(GalleryKey::parse("2023/a/b").is_none());
        assert!(GalleryKey::new("", "x").is_none());
        assert!(GalleryKey::parse("2024/..").is_none());
        assert!(GalleryKey::parse("../x").is_none());
        assert!(GalleryKey::new(".", "x").is_none());
        assert!(GalleryKey::new("2024", "..\\etc").is_none());
        assert_eq!(GalleryKey::new("2024", "v1.2").unwrap().name, "v1.2");
    }
}

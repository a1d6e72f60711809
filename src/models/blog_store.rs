use actix_web::web;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::models::db_operations::blog_file_operations;
use crate::models::db_operations::remote_operations::{RemoteError, RemoteHost};
use crate::models::{BlogIndex, BlogIndexFile, BlogPost};

#[derive(Error, Debug)]
pub enum BlogStoreError {
    #[error("Blog storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Blog data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Blocking task was cancelled")]
    Blocking,
}

/// Storage backend for blog posts and the blog index. Exactly one
/// implementation is chosen at startup.
#[async_trait]
pub trait BlogStore: Send + Sync {
    fn backend_name(&self) -> &'static str;
    async fn load_index(&self) -> Result<BlogIndex, BlogStoreError>;
    async fn fetch_post(&self, slug: &str) -> Result<Option<BlogPost>, BlogStoreError>;
    async fn slug_exists(&self, slug: &str) -> Result<bool, BlogStoreError>;
    async fn create_post(&self, post: &BlogPost) -> Result<(), BlogStoreError>;
    async fn update_post(&self, post: &BlogPost) -> Result<(), BlogStoreError>;
    async fn delete_post(&self, slug: &str, id: Option<i64>) -> Result<(), BlogStoreError>;
}

async fn run_blocking<T, F>(f: F) -> Result<T, BlogStoreError>
where
    F: FnOnce() -> Result<T, BlogStoreError> + Send + 'static,
    T: Send + 'static,
{
    web::block(f).await.map_err(|_| BlogStoreError::Blocking)?
}

/// `<DATA_PATH>/blog/<slug>.json` plus `index.json`.
pub struct LocalBlogStore {
    dir: PathBuf,
}

impl LocalBlogStore {
    pub fn new(dir: PathBuf) -> Self {
        LocalBlogStore { dir }
    }
}

#[async_trait]
impl BlogStore for LocalBlogStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn load_index(&self) -> Result<BlogIndex, BlogStoreError> {
        let dir = self.dir.clone();
        run_blocking(move || blog_file_operations::read_index(&dir)).await
    }

    async fn fetch_post(&self, slug: &str) -> Result<Option<BlogPost>, BlogStoreError> {
        let dir = self.dir.clone();
        let slug = slug.to_string();
        run_blocking(move || blog_file_operations::read_post(&dir, &slug)).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, BlogStoreError> {
        let dir = self.dir.clone();
        let slug = slug.to_string();
        run_blocking(move || blog_file_operations::slug_exists(&dir, &slug)).await
    }

    async fn create_post(&self, post: &BlogPost) -> Result<(), BlogStoreError> {
        let dir = self.dir.clone();
        let post = post.clone();
        run_blocking(move || blog_file_operations::create_post(&dir, &post)).await
    }

    async fn update_post(&self, post: &BlogPost) -> Result<(), BlogStoreError> {
        let dir = self.dir.clone();
        let post = post.clone();
        run_blocking(move || blog_file_operations::update_post(&dir, &post)).await
    }

    async fn delete_post(&self, slug: &str, _id: Option<i64>) -> Result<(), BlogStoreError> {
        let dir = self.dir.clone();
        let slug = slug.to_string();
        run_blocking(move || blog_file_operations::delete_post(&dir, &slug)).await
    }
}

/// Reads from `EXTERNAL_BLOG_URL`, writes through `UPDATE_BLOG_PHP_URL`.
pub struct RemoteBlogStore {
    host: RemoteHost,
    read_url: String,
    update_url: String,
}

impl RemoteBlogStore {
    pub fn new(host: RemoteHost, read_url: String, update_url: String) -> Self {
        RemoteBlogStore { host, read_url, update_url }
    }
}

/// A single-post answer is either `{post: {...}}` or the post object itself.
fn post_from_value(value: Value) -> Result<Option<BlogPost>, BlogStoreError> {
    let Value::Object(mut map) = value else {
        return Ok(None);
    };
    if let Some(post) = map.remove("post") {
        if post.is_null() {
            return Ok(None);
        }
        return Ok(Some(serde_json::from_value(post)?));
    }
    if map.contains_key("slug") {
        return Ok(Some(serde_json::from_value(Value::Object(map))?));
    }
    Ok(None)
}

#[async_trait]
impl BlogStore for RemoteBlogStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    async fn load_index(&self) -> Result<BlogIndex, BlogStoreError> {
        match self.host.get_json(&self.read_url, &[]).await? {
            None | Some(Value::Null) => Ok(BlogIndex::empty()),
            Some(value) => {
                let file: BlogIndexFile = serde_json::from_value(value)?;
                Ok(BlogIndex::from(file))
            }
        }
    }

    async fn fetch_post(&self, slug: &str) -> Result<Option<BlogPost>, BlogStoreError> {
        match self.host.get_json(&self.read_url, &[("slug", slug)]).await? {
            Some(value) => post_from_value(value),
            None => Ok(None),
        }
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, BlogStoreError> {
        if self.fetch_post(slug).await?.is_some() {
            return Ok(true);
        }
        Ok(self.load_index().await?.find_by_slug(slug).is_some())
    }

    async fn create_post(&self, post: &BlogPost) -> Result<(), BlogStoreError> {
        self.host
            .post_json(&self.update_url, &json!({ "action": "create", "post": post }))
            .await?;
        log::info!("Created blog post '{}' on the external host", post.slug);
        Ok(())
    }

    async fn update_post(&self, post: &BlogPost) -> Result<(), BlogStoreError> {
        self.host
            .post_json(&self.update_url, &json!({ "action": "update", "post": post }))
            .await?;
        log::info!("Updated blog post '{}' on the external host", post.slug);
        Ok(())
    }

    async fn delete_post(&self, slug: &str, id: Option<i64>) -> Result<(), BlogStoreError> {
        self.host
            .post_json(&self.update_url, &json!({ "action": "delete", "slug": slug, "id": id }))
            .await?;
        log::info!("Deleted blog post '{}' on the external host", slug);
        Ok(())
    }
}

pub fn select_blog_store(config: &Config, host: &RemoteHost) -> Arc<dyn BlogStore> {
    match (config.blog_uses_remote(), &config.external_blog_url, &config.update_blog_php_url) {
        (true, Some(read_url), Some(update_url)) => {
            log::info!("Blog store: external ({} / {})", read_url, update_url);
            Arc::new(RemoteBlogStore::new(host.clone(), read_url.clone(), update_url.clone()))
        }
        _ => {
            log::info!("Blog store: local ({})", config.blog_dir().display());
            Arc::new(LocalBlogStore::new(config.blog_dir()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_post_payload_shapes() {
        let wrapped = post_from_value(json!({ "success": true, "post": { "id": 3, "slug": "a", "title": "A" } }))
            .unwrap()
            .unwrap();
        assert_eq!(wrapped.slug, "a");
        let bare = post_from_value(json!({ "id": "4", "slug": "b" })).unwrap().unwrap();
        assert_eq!(bare.id, 4);
        assert!(post_from_value(json!({ "post": null })).unwrap().is_none());
        assert!(post_from_value(json!([])).unwrap().is_none());
    }

    #[actix_web::test]
    async fn local_store_round_trips_through_blocking_pool() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlogStore::new(dir.path().to_path_buf());
        let post: BlogPost = serde_json::from_value(json!({ "id": 1, "slug": "hallo", "title": "Hallo" })).unwrap();

        store.create_post(&post).await.unwrap();
        assert!(store.slug_exists("hallo").await.unwrap());
        assert_eq!(store.load_index().await.unwrap().entries.len(), 1);
        store.delete_post("hallo", Some(1)).await.unwrap();
        assert!(store.fetch_post("hallo").await.unwrap().is_none());
    }
}

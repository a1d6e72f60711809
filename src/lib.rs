use std::sync::Arc;

use crate::config::Config;
use crate::models::blog_store::{select_blog_store, BlogStore};
use crate::models::db_operations::remote_operations::{RemoteError, RemoteHost};
use crate::models::gallery_store::{select_gallery_store, GalleryStore};
use crate::models::visitor_stats::VisitorStats;

/// Shared per-process state. Both stores are chosen once, at startup.
pub struct AppState {
    pub blog_store: Arc<dyn BlogStore>,
    pub gallery_store: Arc<dyn GalleryStore>,
    pub remote: RemoteHost,
    pub visitor_stats: VisitorStats,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let remote = RemoteHost::new(config.remote_timeout_secs)?;
        Ok(AppState {
            blog_store: select_blog_store(config, &remote),
            gallery_store: select_gallery_store(config, &remote),
            remote,
            visitor_stats: VisitorStats::new(),
        })
    }
}

pub mod config;
pub mod helper;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod setup;
pub mod tasks;

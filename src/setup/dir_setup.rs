use std::fs;
use std::io;
use std::path::PathBuf;

use crate::config::Config;
use crate::models::db_operations::blog_file_operations::{index_path, write_index};
use crate::models::BlogIndex;

/// Creates the data and uploads layout. Existing directories and an existing
/// `index.json` are left alone. Returns what was newly created.
pub fn setup_directories(config: &Config) -> io::Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    let cache_dir = config
        .gallery_cache_path()
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&config.data_path));

    for dir in [config.blog_dir(), cache_dir, config.uploads_root()] {
        if !dir.is_dir() {
            println!("- Creating '{}'...", dir.display());
            fs::create_dir_all(&dir)?;
            created.push(dir);
        }
    }

    let index = index_path(&config.blog_dir());
    if !index.exists() {
        println!("- Creating empty blog index '{}'...", index.display());
        write_index(&config.blog_dir(), &BlogIndex::empty())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        created.push(index);
    }
    Ok(created)
}

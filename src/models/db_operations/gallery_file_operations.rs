use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::helper::proxy_helpers::proxy_url;
use crate::helper::sanitization_helpers::sanitize_path_segment;
use crate::models::db_operations::write_json_atomic;
use crate::models::gallery_store::GalleryStoreError;
use crate::models::{Gallery, GalleryCache, GalleryKey, GalleryMeta};

pub const MEDIA_EXTENSIONS: [&str; 9] = ["jpg", "jpeg", "png", "gif", "webp", "mp4", "mov", "webm", "mkv"];
pub const META_FILE: &str = "meta.json";

pub fn is_media_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Normalizes a client-supplied path relative to the uploads root without
/// touching the filesystem. `..`, absolute and prefix components are rejected
/// outright, as is a path that names the root itself.
pub fn clean_relative(relative: &str) -> Result<String, GalleryStoreError> {
    let trimmed = relative.trim().trim_start_matches('/');
    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => {
                return Err(GalleryStoreError::Rejected(format!(
                    "Path '{}' escapes the uploads directory",
                    relative
                )))
            }
        }
    }
    if parts.is_empty() {
        return Err(GalleryStoreError::Rejected("Path must not be empty".to_string()));
    }
    Ok(parts.join("/"))
}

pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, GalleryStoreError> {
    Ok(root.join(clean_relative(relative)?))
}

/// Canonical check on an existing path: it must lie strictly below `root`.
/// Catches symlinks that lexical resolution cannot see.
pub fn ensure_strictly_inside(root: &Path, target: &Path) -> Result<PathBuf, GalleryStoreError> {
    let root = root.canonicalize()?;
    let target = match target.canonicalize() {
        Ok(target) => target,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(GalleryStoreError::NotFound(format!("'{}' does not exist", target.display())))
        }
        Err(e) => return Err(e.into()),
    };
    if target == root || !target.starts_with(&root) {
        return Err(GalleryStoreError::Rejected(format!(
            "'{}' is not inside the uploads directory",
            target.display()
        )));
    }
    Ok(target)
}

fn visible_children(dir: &Path, want_dirs: bool) -> Result<Vec<String>, GalleryStoreError> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let is_match = if want_dirs { entry.file_type().is_dir() } else { entry.file_type().is_file() };
        if !is_match {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !is_hidden(name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Media proxy URLs of one gallery directory, sorted by file name.
pub fn list_media(root: &Path, key: &GalleryKey) -> Result<Vec<String>, GalleryStoreError> {
    let dir = resolve_within(root, &key.as_path())?;
    let mut files: Vec<String> = visible_children(&dir, false)?
        .into_iter()
        .filter(|name| is_media_file(name))
        .collect();
    files.sort();
    Ok(files
        .iter()
        .map(|file| proxy_url(&format!("{}/{}", key.as_path(), file)))
        .collect())
}

/// Walks `<root>/<year>/<gallery>`. Years newest first, galleries by name.
pub fn list_galleries(root: &Path) -> Result<Vec<Gallery>, GalleryStoreError> {
    if !root.is_dir() {
        log::warn!("Uploads directory {} does not exist", root.display());
        return Ok(Vec::new());
    }
    let mut years = visible_children(root, true)?;
    years.sort_by(|a, b| b.cmp(a));

    let mut galleries = Vec::new();
    for year in years {
        let mut names = visible_children(&root.join(&year), true)?;
        names.sort();
        for name in names {
            let Some(key) = GalleryKey::new(&year, &name) else {
                continue;
            };
            let media = list_media(root, &key)?;
            let meta = match read_meta(root, &key) {
                Ok(meta) => meta,
                Err(e) => {
                    log::warn!("Ignoring unreadable meta for gallery {}: {}", key, e);
                    None
                }
            };
            galleries.push(Gallery::new(&key, media, meta));
        }
    }
    Ok(galleries)
}

pub fn read_meta(root: &Path, key: &GalleryKey) -> Result<Option<GalleryMeta>, GalleryStoreError> {
    let path = resolve_within(root, &key.as_path())?.join(META_FILE);
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn write_meta(root: &Path, key: &GalleryKey, meta: &GalleryMeta) -> Result<(), GalleryStoreError> {
    let dir = resolve_within(root, &key.as_path())?;
    if !dir.is_dir() {
        return Err(GalleryStoreError::NotFound(format!("Gallery '{}' not found", key)));
    }
    ensure_strictly_inside(root, &dir)?;
    write_json_atomic(&dir.join(META_FILE), meta)?;
    log::info!("Wrote meta for gallery {}", key);
    Ok(())
}

pub fn delete_gallery(root: &Path, relative: &str) -> Result<(), GalleryStoreError> {
    let dir = ensure_strictly_inside(root, &resolve_within(root, relative)?)?;
    if !dir.is_dir() {
        return Err(GalleryStoreError::Rejected(format!("'{}' is not a gallery directory", relative)));
    }
    fs::remove_dir_all(&dir)?;
    log::info!("Deleted gallery directory {}", dir.display());
    Ok(())
}

pub fn delete_file(root: &Path, relative: &str) -> Result<(), GalleryStoreError> {
    let file = ensure_strictly_inside(root, &resolve_within(root, relative)?)?;
    if !file.is_file() {
        return Err(GalleryStoreError::Rejected(format!("'{}' is not a file", relative)));
    }
    fs::remove_file(&file)?;
    log::info!("Deleted file {}", file.display());
    Ok(())
}

/// Splits an upload folder into exactly `year/gallery`, each segment sanitized.
pub fn upload_folder(folder: &str) -> Result<(String, String), GalleryStoreError> {
    let segments: Vec<&str> = folder.split('/').filter(|s| !s.trim().is_empty()).collect();
    let [year, gallery] = segments.as_slice() else {
        return Err(GalleryStoreError::Rejected(format!(
            "Upload folder '{}' must have the form year/gallery",
            folder
        )));
    };
    let sanitize = |segment: &str| {
        sanitize_path_segment(segment)
            .ok_or_else(|| GalleryStoreError::Rejected(format!("Invalid folder segment '{}'", segment)))
    };
    Ok((sanitize(*year)?, sanitize(*gallery)?))
}

/// Sanitized, allow-listed file name for an upload.
pub fn upload_file_name(filename: &str) -> Result<String, GalleryStoreError> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let name = sanitize_path_segment(name)
        .ok_or_else(|| GalleryStoreError::Rejected(format!("Invalid file name '{}'", filename)))?;
    if !is_media_file(&name) {
        return Err(GalleryStoreError::Rejected(format!(
            "File type not allowed. Allowed: {}",
            MEDIA_EXTENSIONS.join(", ")
        )));
    }
    Ok(name)
}

fn free_file_name(dir: &Path, name: &str) -> String {
    if !dir.join(name).exists() {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let mut counter = 1;
    loop {
        let candidate = format!("{}-{}.{}", stem, counter, ext);
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Stores an upload below `<root>/<year>/<gallery>/` without overwriting
/// existing files. Returns the path relative to `root`.
pub fn save_upload(root: &Path, folder: &str, filename: &str, bytes: &[u8]) -> Result<String, GalleryStoreError> {
    let (year, gallery) = upload_folder(folder)?;
    let name = upload_file_name(filename)?;
    let dir = root.join(&year).join(&gallery);
    fs::create_dir_all(&dir)?;
    let dir = ensure_strictly_inside(root, &dir)?;
    let name = free_file_name(&dir, &name);
    fs::write(dir.join(&name), bytes)?;
    let relative = format!("{}/{}/{}", year, gallery, name);
    log::info!("Stored upload {} ({} bytes)", relative, bytes.len());
    Ok(relative)
}

pub fn read_gallery_cache(path: &Path) -> Result<Option<GalleryCache>, GalleryStoreError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn write_gallery_cache(path: &Path, cache: &GalleryCache) -> Result<(), GalleryStoreError> {
    write_json_atomic(path, cache)?;
    Ok(())
}

/// Resolves a proxy candidate to an existing file inside `root`. Candidates
/// that escape the root or do not exist yield `None`.
pub fn locate_file(root: &Path, relative: &str) -> Option<PathBuf> {
    let path = resolve_within(root, relative).ok()?;
    let path = ensure_strictly_inside(root, &path).ok()?;
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn lists_years_descending_and_media_sorted() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("2023/Events/b.JPG"));
        touch(&root.path().join("2023/Events/a.png"));
        touch(&root.path().join("2023/Events/notes.txt"));
        touch(&root.path().join("2024/Portraits/p.webp"));
        touch(&root.path().join("2024/.hidden/x.jpg"));
        fs::write(
            root.path().join("2024/Portraits/meta.json"),
            r#"{"jahr": 2024, "galerie": "Portraits", "kategorie": "People", "tags": "a;b"}"#,
        )
        .unwrap();

        let galleries = list_galleries(root.path()).unwrap();
        let keys: Vec<&str> = galleries.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["2024/Portraits", "2023/Events"]);
        assert_eq!(
            galleries[1].media,
            vec![proxy_url("2023/Events/a.png"), proxy_url("2023/Events/b.JPG")]
        );
        let meta = galleries[0].meta.as_ref().unwrap();
        assert_eq!(meta.jahr, "2024");
        assert_eq!(meta.tags, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(meta.access_type, "public");
    }

    #[test]
    fn traversal_is_rejected_before_mutation() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        touch(&outside.path().join("keep.jpg"));
        touch(&root.path().join("2024/A/a.jpg"));

        let escape = format!("../{}", outside.path().file_name().unwrap().to_str().unwrap());
        assert!(matches!(delete_gallery(root.path(), &escape), Err(GalleryStoreError::Rejected(_))));
        assert!(matches!(delete_gallery(root.path(), "/"), Err(GalleryStoreError::Rejected(_))));
        assert!(matches!(delete_file(root.path(), "2024/../../x"), Err(GalleryStoreError::Rejected(_))));
        assert!(outside.path().join("keep.jpg").exists());
        assert!(root.path().join("2024/A/a.jpg").exists());

        delete_file(root.path(), "2024/A/a.jpg").unwrap();
        assert!(!root.path().join("2024/A/a.jpg").exists());
        delete_gallery(root.path(), "2024/A").unwrap();
        assert!(!root.path().join("2024/A").exists());
        assert!(root.path().exists());
    }

    #[test]
    fn uploads_are_sanitized_and_never_overwrite() {
        let root = tempfile::tempdir().unwrap();
        let first = save_upload(root.path(), "2024/Hochzeit Anna", "Bild 1.jpg", b"one").unwrap();
        assert_eq!(first, "2024/Hochzeit_Anna/Bild_1.jpg");
        let second = save_upload(root.path(), "2024/Hochzeit Anna", "Bild 1.jpg", b"two").unwrap();
        assert_eq!(second, "2024/Hochzeit_Anna/Bild_1-1.jpg");
        assert_eq!(fs::read(root.path().join(&first)).unwrap(), b"one");

        assert!(matches!(
            save_upload(root.path(), "2024", "a.jpg", b""),
            Err(GalleryStoreError::Rejected(_))
        ));
        assert!(matches!(
            save_upload(root.path(), "2024/A", "evil.php", b""),
            Err(GalleryStoreError::Rejected(_))
        ));
        assert!(matches!(
            save_upload(root.path(), "../..", "a.jpg", b""),
            Err(GalleryStoreError::Rejected(_))
        ));
    }

    #[test]
    fn locate_file_only_finds_files_inside_root() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("2024/A/a.jpg"));
        assert!(locate_file(root.path(), "2024/A/a.jpg").is_some());
        assert!(locate_file(root.path(), "/2024/A/a.jpg").is_some());
        assert!(locate_file(root.path(), "2024/A").is_none());
        assert!(locate_file(root.path(), "../etc/passwd").is_none());
        assert!(locate_file(root.path(), "2024/A/missing.jpg").is_none());
    }
}

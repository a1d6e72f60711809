use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::helper::slug_helpers::{is_valid_slug, normalize_slug};
use crate::models::blog_store::BlogStoreError;
use crate::models::db_operations::write_json_atomic;
use crate::models::{
    BlogIndex, BlogIndexEntry, BlogIndexFile, BlogPost, CleanupReport, IndexCheckReport, RepairReport,
};

pub const INDEX_FILE: &str = "index.json";

pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// `<dir>/<slug>.json`. Only canonical slugs are accepted, which also keeps
/// the path inside `dir`.
pub fn post_path(dir: &Path, slug: &str) -> Result<PathBuf, BlogStoreError> {
    if !is_valid_slug(slug) || slug == "index" {
        return Err(BlogStoreError::Invalid(format!("Invalid slug '{}'", slug)));
    }
    Ok(dir.join(format!("{}.json", slug)))
}

/// Reads the index. A missing file is an empty bare index.
pub fn read_index(dir: &Path) -> Result<BlogIndex, BlogStoreError> {
    let path = index_path(dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BlogIndex::empty()),
        Err(e) => return Err(e.into()),
    };
    if raw.trim().is_empty() {
        return Ok(BlogIndex::empty());
    }
    let file: BlogIndexFile = serde_json::from_str(&raw)?;
    Ok(BlogIndex::from(file))
}

pub fn write_index(dir: &Path, index: &BlogIndex) -> Result<(), BlogStoreError> {
    let file = BlogIndexFile::from(index.clone());
    write_json_atomic(&index_path(dir), &file)?;
    Ok(())
}

pub fn read_post(dir: &Path, slug: &str) -> Result<Option<BlogPost>, BlogStoreError> {
    let path = post_path(dir, &normalize_slug(slug))?;
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// A slug is taken when either its post file or an index entry exists.
pub fn slug_exists(dir: &Path, slug: &str) -> Result<bool, BlogStoreError> {
    let slug = normalize_slug(slug);
    if post_path(dir, &slug)?.exists() {
        return Ok(true);
    }
    Ok(read_index(dir)?.find_by_slug(&slug).is_some())
}

fn write_post_file(dir: &Path, post: &BlogPost) -> Result<(), BlogStoreError> {
    let path = post_path(dir, &post.slug)?;
    write_json_atomic(&path, post)?;
    Ok(())
}

/// Post file first, index second: a crash in between leaves an orphan file
/// that `repair_index` picks up, never an index entry without a file.
pub fn create_post(dir: &Path, post: &BlogPost) -> Result<(), BlogStoreError> {
    if slug_exists(dir, &post.slug)? {
        return Err(BlogStoreError::Conflict(format!(
            "A post with slug '{}' already exists",
            post.slug
        )));
    }
    fs::create_dir_all(dir)?;
    write_post_file(dir, post)?;
    let mut index = read_index(dir)?;
    index.upsert(BlogIndexEntry::from_post(post));
    write_index(dir, &index)?;
    log::info!("Created blog post '{}' (id {})", post.slug, post.id);
    Ok(())
}

pub fn update_post(dir: &Path, post: &BlogPost) -> Result<(), BlogStoreError> {
    if !post_path(dir, &post.slug)?.exists() {
        return Err(BlogStoreError::NotFound(format!("Post '{}' not found", post.slug)));
    }
    write_post_file(dir, post)?;
    let mut index = read_index(dir)?;
    index.upsert(BlogIndexEntry::from_post(post));
    write_index(dir, &index)?;
    log::info!("Updated blog post '{}'", post.slug);
    Ok(())
}

/// Index entry first, post file second, mirroring `create_post`.
pub fn delete_post(dir: &Path, slug: &str) -> Result<(), BlogStoreError> {
    let slug = normalize_slug(slug);
    let path = post_path(dir, &slug)?;
    let mut index = read_index(dir)?;
    let removed_entry = index.remove_slug(&slug);
    let file_exists = path.exists();

    if !removed_entry && !file_exists {
        return Err(BlogStoreError::NotFound(format!("Post '{}' not found", slug)));
    }
    if removed_entry {
        write_index(dir, &index)?;
    }
    if file_exists {
        fs::remove_file(&path)?;
    }
    log::info!(
        "Deleted blog post '{}' (index entry {}, file {})",
        slug,
        if removed_entry { "removed" } else { "was already missing" },
        if file_exists { "removed" } else { "was already missing" }
    );
    Ok(())
}

/// Slugs of every post file in `dir`, sorted.
pub fn list_post_slugs(dir: &Path) -> Result<Vec<String>, BlogStoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut slugs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if stem != "index" && is_valid_slug(stem) {
                slugs.push(stem.to_string());
            }
        }
    }
    slugs.sort();
    Ok(slugs)
}

fn should_replace(candidate: &BlogIndexEntry, current: &BlogIndexEntry) -> bool {
    if candidate.is_draft != current.is_draft {
        return candidate.is_draft.0;
    }
    match (candidate.updated_at_parsed(), current.updated_at_parsed()) {
        (Some(new), Some(old)) => new > old,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Collapses entries sharing a normalized slug. Winner: draft over published,
/// then newest `updatedAt`, then first seen. Group order follows first
/// occurrence and the winner carries the normalized slug.
pub fn dedupe_entries(entries: Vec<BlogIndexEntry>) -> Vec<BlogIndexEntry> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<BlogIndexEntry> = Vec::new();
    for mut entry in entries {
        let slug = entry.normalized_slug();
        entry.slug = slug.clone();
        match positions.get(&slug) {
            Some(&pos) => {
                if should_replace(&entry, &kept[pos]) {
                    kept[pos] = entry;
                }
            }
            None => {
                positions.insert(slug, kept.len());
                kept.push(entry);
            }
        }
    }
    kept
}

pub fn cleanup_index(dir: &Path) -> Result<CleanupReport, BlogStoreError> {
    let index = read_index(dir)?;
    let original_count = index.entries.len();
    let cleaned = index.replace_entries(dedupe_entries(index.entries.clone()));
    let cleaned_count = cleaned.entries.len();
    write_index(dir, &cleaned)?;
    log::info!("Blog index cleanup: {} -> {} entries", original_count, cleaned_count);
    Ok(CleanupReport {
        original_count,
        cleaned_count,
        removed_count: original_count - cleaned_count,
        shape: cleaned.shape,
    })
}

/// Read-only health report of `index.json`.
pub fn check_index(dir: &Path) -> IndexCheckReport {
    let path = index_path(dir);
    let mut report = IndexCheckReport {
        path: path.display().to_string(),
        exists: path.exists(),
        valid: false,
        shape: None,
        post_count: 0,
        error: None,
    };
    if !report.exists {
        return report;
    }
    let parsed = fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<BlogIndexFile>(&raw).map_err(|e| e.to_string()));
    match parsed {
        Ok(file) => {
            let index = BlogIndex::from(file);
            report.valid = true;
            report.shape = Some(index.shape);
            report.post_count = index.entries.len();
        }
        Err(e) => report.error = Some(e),
    }
    report
}

/// Brings the index in line with the post files: orphan files get an entry,
/// entries without a file are dropped.
pub fn repair_index(dir: &Path) -> Result<RepairReport, BlogStoreError> {
    let mut index = read_index(dir)?;
    let on_disk: HashSet<String> = list_post_slugs(dir)?.into_iter().collect();

    let mut removed_slugs = Vec::new();
    index.entries.retain(|entry| {
        let keep = on_disk.contains(&entry.normalized_slug());
        if !keep {
            removed_slugs.push(entry.slug.clone());
        }
        keep
    });

    let indexed: HashSet<String> = index.entries.iter().map(BlogIndexEntry::normalized_slug).collect();
    let mut added_slugs = Vec::new();
    let mut orphans: Vec<&String> = on_disk.iter().filter(|slug| !indexed.contains(*slug)).collect();
    orphans.sort();
    for slug in orphans {
        match read_post(dir, slug) {
            Ok(Some(mut post)) => {
                post.slug = slug.clone();
                index.upsert(BlogIndexEntry::from_post(&post));
                added_slugs.push(slug.clone());
            }
            Ok(None) => {}
            Err(e) => log::warn!("Skipping unreadable post file '{}': {}", slug, e),
        }
    }

    if !added_slugs.is_empty() || !removed_slugs.is_empty() {
        write_index(dir, &index)?;
    }
    log::info!(
        "Blog index repair: {} added, {} removed",
        added_slugs.len(),
        removed_slugs.len()
    );
    Ok(RepairReport {
        added_slugs,
        removed_slugs,
        post_count: index.entries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{iso_now, DraftFlag, IndexShape};
    use serde_json::{json, Map};

    fn post(slug: &str, id: i64) -> BlogPost {
        BlogPost {
            id,
            title: format!("Title {}", slug),
            slug: slug.to_string(),
            content: "<p>Hallo</p>".to_string(),
            excerpt: String::new(),
            cover_image: None,
            featured_image: None,
            author: "admin".to_string(),
            category: "Musik".to_string(),
            tags: vec!["techno".to_string(), "live".to_string()],
            is_draft: DraftFlag(false),
            seo_title: String::new(),
            seo_description: String::new(),
            created_at: iso_now(),
            updated_at: iso_now(),
            published_at: Some(iso_now()),
            extra: Map::new(),
        }
    }

    fn entry(value: serde_json::Value) -> BlogIndexEntry {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn create_writes_file_and_index_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        create_post(dir.path(), &post("erster-beitrag", 1)).unwrap();

        assert!(dir.path().join("erster-beitrag.json").exists());
        let index = read_index(dir.path()).unwrap();
        assert_eq!(index.entries.len(), 1);
        assert_eq!(index.entries[0].tags, "techno;live");

        let err = create_post(dir.path(), &post("erster-beitrag", 2)).unwrap_err();
        assert!(matches!(err, BlogStoreError::Conflict(_)));
        let stored = read_post(dir.path(), "erster-beitrag").unwrap().unwrap();
        assert_eq!(stored.id, 1);
    }

    #[test]
    fn delete_removes_exactly_one_file_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        create_post(dir.path(), &post("a", 1)).unwrap();
        create_post(dir.path(), &post("b", 2)).unwrap();

        delete_post(dir.path(), "a").unwrap();
        assert!(!dir.path().join("a.json").exists());
        assert!(dir.path().join("b.json").exists());
        let index = read_index(dir.path()).unwrap();
        assert_eq!(index.entries.len(), 1);
        assert_eq!(index.entries[0].slug, "b");

        assert!(read_post(dir.path(), "a").unwrap().is_none());
        assert!(matches!(delete_post(dir.path(), "a"), Err(BlogStoreError::NotFound(_))));
    }

    #[test]
    fn delete_with_duplicate_entries_removes_only_one() {
        let dir = tempfile::tempdir().unwrap();
        create_post(dir.path(), &post("mix", 1)).unwrap();
        let mut index = read_index(dir.path()).unwrap();
        index.entries.push(entry(json!({"id": 2, "slug": "Mix", "title": "copy"})));
        write_index(dir.path(), &index).unwrap();

        delete_post(dir.path(), "mix").unwrap();
        let index = read_index(dir.path()).unwrap();
        assert_eq!(index.entries.len(), 1);
        assert_eq!(index.entries[0].title, "copy");
        assert!(!dir.path().join("mix.json").exists());
    }

    #[test]
    fn post_path_rejects_traversal() {
        let dir = Path::new("/tmp/blog");
        assert!(post_path(dir, "../secret").is_err());
        assert!(post_path(dir, "index").is_err());
        assert!(post_path(dir, "").is_err());
        assert_eq!(post_path(dir, "ok-1").unwrap(), dir.join("ok-1.json"));
    }

    #[test]
    fn cleanup_prefers_draft_then_newest_and_keeps_shape() {
        let dir = tempfile::tempdir().unwrap();
        let raw = json!({
            "posts": [
                {"id": 1, "slug": "mix", "isDraft": "0", "updatedAt": "2024-05-01T10:00:00.000Z", "title": "published"},
                {"id": 2, "slug": "Mix", "isDraft": "1", "updatedAt": "2024-01-01T10:00:00.000Z", "title": "draft"},
                {"id": 3, "slug": "other", "isDraft": "0", "updatedAt": "2024-01-01T10:00:00.000Z", "title": "old"},
                {"id": 4, "slug": "other", "isDraft": "0", "updatedAt": "2024-02-01T10:00:00.000Z", "title": "new"}
            ],
            "generatedBy": "admin"
        });
        fs::write(index_path(dir.path()), raw.to_string()).unwrap();

        let report = cleanup_index(dir.path()).unwrap();
        assert_eq!(report.original_count, 4);
        assert_eq!(report.cleaned_count, 2);
        assert_eq!(report.removed_count, report.original_count - report.cleaned_count);
        assert_eq!(report.shape, IndexShape::Wrapped);

        let index = read_index(dir.path()).unwrap();
        assert_eq!(index.shape, IndexShape::Wrapped);
        assert_eq!(index.entries[0].title, "draft");
        assert_eq!(index.entries[0].slug, "mix");
        assert_eq!(index.entries[1].title, "new");

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(index_path(dir.path())).unwrap()).unwrap();
        assert_eq!(on_disk["generatedBy"], "admin");
    }

    #[test]
    fn dedupe_keeps_first_on_full_tie() {
        let kept = dedupe_entries(vec![
            entry(json!({"id": 1, "slug": "x", "title": "first"})),
            entry(json!({"id": 2, "slug": "x", "title": "second"})),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "first");
    }

    #[test]
    fn null_fields_written_by_php_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            index_path(dir.path()),
            r#"[{"id": 1, "slug": "a", "title": "A", "category": null}, {"id": 2, "slug": "b", "title": null}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b.json"),
            r#"{"id": 2, "slug": "b", "title": null, "content": null, "excerpt": null, "author": null,
                "category": null, "seoTitle": null, "seoDescription": null, "createdAt": null,
                "updatedAt": null, "tags": null, "isDraft": null}"#,
        )
        .unwrap();

        let index = read_index(dir.path()).unwrap();
        assert_eq!(index.entries.len(), 2);
        assert_eq!(index.entries[0].category, "");
        assert_eq!(index.entries[1].title, "");

        let post = read_post(dir.path(), "b").unwrap().unwrap();
        assert_eq!(post.excerpt, "");
        assert_eq!(post.content, "");
        assert!(post.tags.is_empty());

        let report = repair_index(dir.path()).unwrap();
        assert_eq!(report.removed_slugs, vec!["a".to_string()]);
        assert_eq!(cleanup_index(dir.path()).unwrap().cleaned_count, 1);
    }

    #[test]
    fn check_reports_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let report = check_index(dir.path());
        assert!(!report.exists);
        assert!(!report.valid);

        fs::write(index_path(dir.path()), "{ not json").unwrap();
        let report = check_index(dir.path());
        assert!(report.exists);
        assert!(!report.valid);
        assert!(report.error.is_some());
        assert_eq!(fs::read_to_string(index_path(dir.path())).unwrap(), "{ not json");

        fs::write(index_path(dir.path()), r#"[{"id": 1, "slug": "a"}, {"id": 2, "slug": "b"}]"#).unwrap();
        let report = check_index(dir.path());
        assert!(report.valid);
        assert_eq!(report.shape, Some(IndexShape::Bare));
        assert_eq!(report.post_count, 2);
    }

    #[test]
    fn repair_adds_orphans_and_drops_phantoms() {
        let dir = tempfile::tempdir().unwrap();
        let orphan = post("verwaist", 5);
        write_json_atomic(&dir.path().join("verwaist.json"), &orphan).unwrap();
        fs::write(
            index_path(dir.path()),
            r#"[{"id": 9, "slug": "phantom", "title": "gone"}]"#,
        )
        .unwrap();

        let report = repair_index(dir.path()).unwrap();
        assert_eq!(report.added_slugs, vec!["verwaist".to_string()]);
        assert_eq!(report.removed_slugs, vec!["phantom".to_string()]);

        let index = read_index(dir.path()).unwrap();
        assert_eq!(index.entries.len(), 1);
        assert_eq!(index.entries[0].id, 5);
        assert_eq!(list_post_slugs(dir.path()).unwrap(), vec!["verwaist".to_string()]);
    }
}

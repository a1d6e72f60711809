use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

pub mod blog_file_operations;
pub mod gallery_file_operations;
pub mod remote_operations;

/// Writes pretty JSON next to the target and renames it into place, so a
/// reader never sees a half-written file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)
}

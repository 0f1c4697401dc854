//! Path utilities for storage keys and derived image files.
//!
//! Storage keys are relative, `/`-separated paths such as `2024/05/cat.jpg`.
//! The same key addresses a file in the uploads directory and in the remote
//! bucket.

use std::path::Path;

use crate::{Error, Result};

/// List of image file extensions the service knows how to resize.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Normalise a relative storage key.
///
/// Leading and trailing slashes are trimmed and backslashes become forward
/// slashes. Empty keys and keys containing `.` or `..` segments are rejected.
///
/// # Examples
///
/// ```
/// use mediamirror_common::paths::normalize_key;
///
/// assert_eq!(normalize_key("/2024/05/cat.jpg").unwrap(), "2024/05/cat.jpg");
/// assert!(normalize_key("../etc/passwd").is_err());
/// ```
pub fn normalize_key(path: &str) -> Result<String> {
    let unified = path.replace('\\', "/");
    let trimmed = unified.trim_matches('/');

    if trimmed.is_empty() {
        return Err(Error::invalid_input("empty storage key"));
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(Error::invalid_input(format!(
                    "storage key may not contain '{}': {}",
                    segment, path
                )))
            }
            s => segments.push(s),
        }
    }

    Ok(segments.join("/"))
}

/// Directory part of a storage key, without a trailing slash.
///
/// Returns an empty string for keys at the root.
///
/// # Examples
///
/// ```
/// use mediamirror_common::paths::key_dirname;
///
/// assert_eq!(key_dirname("2024/05/cat.jpg"), "2024/05");
/// assert_eq!(key_dirname("cat.jpg"), "");
/// ```
pub fn key_dirname(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..idx],
        None => "",
    }
}

/// Join a directory key and a file name.
///
/// # Examples
///
/// ```
/// use mediamirror_common::paths::join_key;
///
/// assert_eq!(join_key("2024/05", "cat-150x150.jpg"), "2024/05/cat-150x150.jpg");
/// assert_eq!(join_key("", "cat.jpg"), "cat.jpg");
/// ```
pub fn join_key(dir: &str, file: &str) -> String {
    let dir = dir.trim_matches('/');
    let file = file.trim_start_matches('/');
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", dir, file)
    }
}

/// File name of a derived size: `{stem}-{width}x{height}.{ext}`.
///
/// # Examples
///
/// ```
/// use mediamirror_common::paths::sized_file_name;
///
/// assert_eq!(sized_file_name("2024/05/cat.jpg", 150, 100), "cat-150x100.jpg");
/// ```
pub fn sized_file_name(original_key: &str, width: u32, height: u32) -> String {
    let path = Path::new(original_key);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}-{}x{}.{}", stem, width, height, ext),
        None => format!("{}-{}x{}", stem, width, height),
    }
}

/// Check if a path has an image file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use mediamirror_common::paths::is_image_file;
///
/// assert!(is_image_file(Path::new("poster.JPG")));
/// assert!(!is_image_file(Path::new("clip.mp4")));
/// ```
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Guess a MIME type from a file extension.
///
/// Unknown extensions map to `application/octet-stream`.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

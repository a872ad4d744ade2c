use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Extensions treated as video when a row carries no explicit `media_type`.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "avi", "mkv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Kind guessed from a URL's extension, ignoring any `?query` suffix.
    pub fn from_url(url: &str) -> Self {
        let path = url.split('?').next().unwrap_or(url);
        match extension(path) {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
                MediaKind::Video
            }
            _ => MediaKind::Image,
        }
    }

    /// Kind of a freshly selected file, if its MIME type names one.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let content_type = content_type.trim().to_ascii_lowercase();
        if content_type.starts_with("video/") {
            Some(MediaKind::Video)
        } else if content_type.starts_with("image/") {
            Some(MediaKind::Image)
        } else {
            None
        }
    }

    pub fn is_video(self) -> bool {
        self == MediaKind::Video
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "IMAGE",
            MediaKind::Video => "VIDEO",
        }
    }
}

/// A media URL together with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaRef {
    pub fn new(url: impl Into<String>, kind: Option<MediaKind>) -> Self {
        let url = url.into();
        let kind = kind.unwrap_or_else(|| MediaKind::from_url(&url));
        Self { url, kind }
    }
}

/// Text after the last dot of the last path segment.
pub fn extension(name: &str) -> Option<&str> {
    let segment = name.rsplit('/').next().unwrap_or(name);
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Collision-resistant object path that keeps the original extension.
pub fn unique_object_path(folder: &str, original_name: &str) -> String {
    let name = match extension(original_name) {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    };
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name
    } else {
        format!("{folder}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_urls_are_detected_by_extension() {
        assert_eq!(MediaKind::from_url("https://cdn.test/a/clip.MP4"), MediaKind::Video);
        assert_eq!(MediaKind::from_url("https://cdn.test/clip.webm?t=12"), MediaKind::Video);
        assert_eq!(MediaKind::from_url("https://cdn.test/clip.mkv"), MediaKind::Video);
        assert_eq!(MediaKind::from_url("https://cdn.test/photo.jpg"), MediaKind::Image);
        assert_eq!(MediaKind::from_url("https://cdn.test/mp4/photo"), MediaKind::Image);
    }

    #[test]
    fn mime_prefix_decides_local_files() {
        assert_eq!(MediaKind::from_mime("video/quicktime"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_mime("image/png"), Some(MediaKind::Image));
        assert_eq!(MediaKind::from_mime("application/octet-stream"), None);
    }

    #[test]
    fn explicit_kind_wins_over_extension() {
        let media = MediaRef::new("https://cdn.test/stream", Some(MediaKind::Video));
        assert!(media.kind.is_video());
        let media = MediaRef::new("https://cdn.test/clip.mov", None);
        assert!(media.kind.is_video());
    }

    #[test]
    fn object_paths_keep_extension_and_differ() {
        let first = unique_object_path("product_images", "sample.jpg");
        let second = unique_object_path("product_images/", "sample.jpg");
        assert!(first.starts_with("product_images/"));
        assert!(first.ends_with(".jpg"));
        assert_ne!(first, second);
        assert!(!unique_object_path("", "README").contains('.'));
    }
}

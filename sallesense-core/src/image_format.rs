//! Magic-byte sniffing for stored photo blobs.

use std::path::Path;

/// File extensions accepted as photos, compared case-insensitively.
pub const PHOTO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Unknown,
}

impl ImageFormat {
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(&[0xFF, 0xD8]) {
            ImageFormat::Jpeg
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            ImageFormat::Png
        } else if bytes.starts_with(b"GIF") {
            ImageFormat::Gif
        } else if bytes.starts_with(b"BM") {
            ImageFormat::Bmp
        } else {
            ImageFormat::Unknown
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Unknown => "UNKNOWN",
        }
    }

    /// Content type served for a blob. Anything not recognised as PNG is served as JPEG.
    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            _ => "image/jpeg",
        }
    }
}

pub fn is_photo_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PHOTO_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
        .unwrap_or(false)
}

/// Photo files directly inside `dir`, sorted by path.
pub fn list_photo_files(dir: &Path) -> std::io::Result<Vec<std::path::PathBuf>> {
    let mut photos = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_photo_path(&path) {
            photos.push(path);
        }
    }
    photos.sort();
    Ok(photos)
}

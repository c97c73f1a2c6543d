use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

/// URL prefix the server mounts the media root under.
pub const MEDIA_URL: &str = "/media";

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")]
    NotAnImage,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Uploaded images on disk.
///
/// Each image lands at `{root}/{kind}/{uuid}.{ext}`; the database keeps the
/// path relative to `root` and responses expose it under [`MEDIA_URL`].
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub async fn new(root: PathBuf) -> anyhow::Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Media directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decode a base64 image (bare or as a `data:` URL), check it really is
    /// an image, and write it. Returns the stored relative path.
    pub async fn save_image(&self, kind: &str, encoded: &str) -> Result<String, MediaError> {
        let bytes = decode_image(encoded).ok_or(MediaError::NotAnImage)?;
        let ext = sniff_extension(&bytes).ok_or(MediaError::NotAnImage)?;

        let dir = self.root.join(kind);
        fs::create_dir_all(&dir).await?;
        let name = format!("{}.{}", Uuid::new_v4(), ext);
        fs::write(dir.join(&name), &bytes).await?;

        let stored = format!("{}/{}", kind, name);
        debug!("Stored {} byte image at {}", bytes.len(), stored);
        Ok(stored)
    }

    /// Public URL for a stored path. Absolute URLs pass through untouched.
    pub fn url(&self, stored: &str) -> String {
        if stored.starts_with("http://") || stored.starts_with("https://") {
            stored.to_string()
        } else {
            format!("{}/{}", MEDIA_URL, stored.trim_start_matches('/'))
        }
    }
}

fn decode_image(encoded: &str) -> Option<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    B64.decode(payload).ok()
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Smallest valid PNG signature plus padding; enough for sniffing.
    fn png_base64() -> String {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        B64.encode(bytes)
    }

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_extension(b"\x89PNG\r\n\x1a\nrest"), Some("png"));
        assert_eq!(sniff_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
        assert_eq!(sniff_extension(b"GIF89a...."), Some("gif"));
        assert_eq!(sniff_extension(b"RIFF\0\0\0\0WEBPVP8 "), Some("webp"));
        assert_eq!(sniff_extension(b"plain text"), None);
    }

    #[test]
    fn accepts_data_urls() {
        let url = format!("data:image/png;base64,{}", png_base64());
        assert!(decode_image(&url).is_some());
        assert!(decode_image("%%%not base64%%%").is_none());
    }

    #[tokio::test]
    async fn saves_under_kind_directory() {
        let root = std::env::temp_dir().join(format!("reloop-media-{}", Uuid::new_v4()));
        let store = MediaStore::new(root.clone()).await.unwrap();

        let stored = store.save_image("product_images", &png_base64()).await.unwrap();
        assert!(stored.starts_with("product_images/") && stored.ends_with(".png"));
        assert!(root.join(&stored).exists());
        assert_eq!(store.url(&stored), format!("/media/{stored}"));

        let err = store.save_image("product_images", &B64.encode("hello")).await.unwrap_err();
        assert!(matches!(err, MediaError::NotAnImage));

        std::fs::remove_dir_all(root).ok();
    }
}

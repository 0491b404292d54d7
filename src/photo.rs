//! User-supplied photos.
//!
//! A [`Photo`] is the raw file bytes plus a sniffed MIME type.  The bytes go
//! to the vision model untouched (base64 inline data); [`Photo::decode_rgba`]
//! is only used to draw the photo behind the overlay card.

use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use image::ImageFormat;
use thiserror::Error;

/// MIME type used when the format cannot be sniffed.
pub const FALLBACK_MIME: &str = "image/jpeg";

// ---------------------------------------------------------------------------
// PhotoError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum PhotoError {
    #[error("could not read {path}: {message}")]
    Read { path: String, message: String },

    #[error("the selected file is empty")]
    Empty,

    #[error("could not decode image: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Photo
// ---------------------------------------------------------------------------

/// An immutable, cheaply clonable photo handle.
#[derive(Clone)]
pub struct Photo {
    bytes: Arc<[u8]>,
    mime_type: String,
    label: String,
}

impl std::fmt::Debug for Photo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Photo")
            .field("label", &self.label)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Photo {
    /// Wrap in-memory image bytes.  `label` is shown in logs and the UI.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, label: impl Into<String>) -> Result<Self, PhotoError> {
        let bytes: Arc<[u8]> = bytes.into();
        if bytes.is_empty() {
            return Err(PhotoError::Empty);
        }
        let mime_type = sniff_mime(&bytes).to_string();
        Ok(Self {
            bytes,
            mime_type,
            label: label.into(),
        })
    }

    /// Read a photo from disk.
    pub fn load(path: &Path) -> Result<Self, PhotoError> {
        let bytes = std::fs::read(path).map_err(|e| PhotoError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(bytes, label)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Standard base64 of the raw bytes, as sent in `inlineData`.
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Decode to `(width, height, rgba8)` for display.
    pub fn decode_rgba(&self) -> Result<(u32, u32, Vec<u8>), PhotoError> {
        let img = image::load_from_memory(&self.bytes).map_err(|e| PhotoError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        Ok((w, h, rgba.into_raw()))
    }
}

/// Best-effort MIME type from the leading magic bytes.
fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(other) => {
            log::debug!("photo: unmapped format {other:?}, sending as {FALLBACK_MIME}");
            FALLBACK_MIME
        }
        Err(_) => FALLBACK_MIME,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    /// A 2×1 PNG encoded in memory.
    pub(crate) fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_raw(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 255]).unwrap();
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn png_is_sniffed() {
        let photo = Photo::from_bytes(tiny_png(), "tiny.png").unwrap();
        assert_eq!(photo.mime_type(), "image/png");
        assert_eq!(photo.label(), "tiny.png");
    }

    #[test]
    fn jpeg_magic_is_sniffed() {
        let photo = Photo::from_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0], "x").unwrap();
        assert_eq!(photo.mime_type(), "image/jpeg");
    }

    #[test]
    fn unknown_bytes_fall_back_to_jpeg() {
        let photo = Photo::from_bytes(b"hello".to_vec(), "x").unwrap();
        assert_eq!(photo.mime_type(), FALLBACK_MIME);
    }

    #[test]
    fn empty_bytes_rejected() {
        assert!(matches!(Photo::from_bytes(Vec::new(), "x"), Err(PhotoError::Empty)));
    }

    #[test]
    fn base64_round_trips_bytes() {
        let photo = Photo::from_bytes(vec![1, 2, 3, 4], "x").unwrap();
        assert_eq!(photo.to_base64(), "AQIDBA==");
    }

    #[test]
    fn decode_rgba_dimensions() {
        let photo = Photo::from_bytes(tiny_png(), "tiny.png").unwrap();
        let (w, h, rgba) = photo.decode_rgba().unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(rgba.len(), 8);
        assert_eq!(&rgba[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn decode_garbage_fails() {
        let photo = Photo::from_bytes(b"not an image".to_vec(), "x").unwrap();
        assert!(matches!(photo.decode_rgba(), Err(PhotoError::Decode(_))));
    }

    #[test]
    fn load_uses_file_name_as_label() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("eiffel.png");
        std::fs::write(&path, tiny_png()).unwrap();

        let photo = Photo::load(&path).unwrap();
        assert_eq!(photo.label(), "eiffel.png");
        assert_eq!(photo.bytes().len(), tiny_png().len());
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let dir = tempdir().expect("temp dir");
        let err = Photo::load(&dir.path().join("missing.jpg")).unwrap_err();
        assert!(matches!(err, PhotoError::Read { .. }));
    }
}

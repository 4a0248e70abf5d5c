//! Input capture: turn a user-supplied file into an immutable [`SourceFile`].
//!
//! The orchestrator never re-reads the filesystem; a `SourceFile` holds the
//! bytes behind an `Arc` so cloning it into an in-flight conversion is cheap
//! and the original stays untouched for the item's whole lifetime.

use crate::error::ConvertError;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One user-supplied file: name, declared media type and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    media_type: String,
    bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Build a source whose media type is guessed from the file name.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let media_type = guess_media_type(&name).to_string();
        Self::new(name, media_type, bytes)
    }

    /// Read a local file. Missing, unreadable and empty files are rejected.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| ConvertError::Input {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Err(ConvertError::Input {
                path: path.to_path_buf(),
                reason: "file is empty".into(),
            });
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        debug!("Read input {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name without its last extension (`photo.tar.png` → `photo.tar`).
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(0) | None => &self.name,
            Some(i) => &self.name[..i],
        }
    }

    /// Last extension, lower-cased, if any.
    pub fn extension(&self) -> Option<String> {
        match self.name.rfind('.') {
            Some(i) if i > 0 && i + 1 < self.name.len() => {
                Some(self.name[i + 1..].to_ascii_lowercase())
            }
            _ => None,
        }
    }
}

/// Guess a media type from a file name's extension.
pub fn guess_media_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "dng" => "image/x-adobe-dng",
        "cr2" => "image/x-canon-cr2",
        "nef" => "image/x-nikon-nef",
        "arw" => "image/x-sony-arw",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_and_extension() {
        let f = SourceFile::from_bytes("holiday.photo.JPG", vec![1u8]);
        assert_eq!(f.stem(), "holiday.photo");
        assert_eq!(f.extension().as_deref(), Some("jpg"));
        assert_eq!(f.media_type(), "image/jpeg");

        let f = SourceFile::from_bytes(".hidden", vec![1u8]);
        assert_eq!(f.stem(), ".hidden");
        assert_eq!(f.extension(), None);
    }

    #[test]
    fn guesses_known_types() {
        assert_eq!(guess_media_type("a.pdf"), "application/pdf");
        assert_eq!(guess_media_type("clip.MOV"), "video/quicktime");
        assert_eq!(guess_media_type("IMG_0001.HEIC"), "image/heic");
        assert_eq!(guess_media_type("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn from_path_rejects_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        assert!(matches!(
            SourceFile::from_path(&empty).await,
            Err(ConvertError::Input { .. })
        ));
        assert!(SourceFile::from_path(dir.path().join("missing.png")).await.is_err());

        let ok = dir.path().join("doc.pdf");
        std::fs::write(&ok, b"%PDF-1.5").unwrap();
        let f = SourceFile::from_path(&ok).await.unwrap();
        assert_eq!(f.name(), "doc.pdf");
        assert_eq!(f.len(), 8);
    }
}

//! Conversion results and the result-delivery collaborator.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One produced file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub suggested_name: String,
}

impl Artifact {
    pub fn new(
        bytes: Vec<u8>,
        media_type: impl Into<String>,
        suggested_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            suggested_name: suggested_name.into(),
        }
    }
}

/// Everything a successful conversion produced.
///
/// Most tools emit exactly one artifact; page-to-image export emits one per
/// rasterised page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub artifacts: Vec<Artifact>,
}

impl ConversionResult {
    pub fn single(artifact: Artifact) -> Self {
        Self {
            artifacts: vec![artifact],
        }
    }

    /// Media type of the first artifact, used for history bookkeeping.
    pub fn media_type(&self) -> &str {
        self.artifacts
            .first()
            .map(|a| a.media_type.as_str())
            .unwrap_or("application/octet-stream")
    }

    /// Total size across all artifacts.
    pub fn byte_size(&self) -> u64 {
        self.artifacts.iter().map(|a| a.bytes.len() as u64).sum()
    }
}

/// Receives produced bytes for the user (download, save, upload …).
///
/// Fire-and-forget: the return value is ignored and implementations must not
/// panic. Called once per artifact.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, bytes: &[u8], suggested_name: &str);
}

/// Writes every delivered artifact into a directory.
///
/// Names are unique per sink: when two artifacts suggest the same name (say
/// `a.png` and `a.jpg` both converted to `a.webp`), the later one is written
/// as `a (1).webp`, then `a (2).webp` and so on. Clones share the record of
/// names already used.
#[derive(Debug, Clone)]
pub struct DirectoryDelivery {
    dir: PathBuf,
    used: Arc<Mutex<HashSet<OsString>>>,
}

impl DirectoryDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            used: Arc::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Claim `name`, or the first free `stem (n).ext` variant of it.
    fn claim(&self, name: &Path) -> OsString {
        let mut used = self.used.lock().unwrap_or_else(|e| e.into_inner());
        let mut candidate = name.as_os_str().to_owned();
        let mut n = 1;
        while used.contains(&candidate) {
            let stem = name.file_stem().unwrap_or(name.as_os_str()).to_string_lossy();
            candidate = match name.extension() {
                Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()).into(),
                None => format!("{stem} ({n})").into(),
            };
            n += 1;
        }
        used.insert(candidate.clone());
        candidate
    }
}

impl ResultSink for DirectoryDelivery {
    fn deliver(&self, bytes: &[u8], suggested_name: &str) {
        // Only the final path component is honoured.
        let file_name = Path::new(suggested_name)
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| "output".into());
        let path = self.dir.join(self.claim(Path::new(&file_name)));

        let written = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, bytes));
        match written {
            Ok(()) => debug!("Delivered {} ({} bytes)", path.display(), bytes.len()),
            Err(e) => warn!("Failed to deliver {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_size_sums_artifacts() {
        let r = ConversionResult {
            artifacts: vec![
                Artifact::new(vec![0; 10], "image/png", "a_page001.png"),
                Artifact::new(vec![0; 5], "image/png", "a_page002.png"),
            ],
        };
        assert_eq!(r.byte_size(), 15);
        assert_eq!(r.media_type(), "image/png");
    }

    #[test]
    fn directory_delivery_strips_path_components() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryDelivery::new(dir.path().join("out"));
        sink.deliver(b"hello", "../../escape.txt");
        let written = std::fs::read(dir.path().join("out").join("escape.txt")).unwrap();
        assert_eq!(written, b"hello");
    }

    #[test]
    fn directory_delivery_keeps_colliding_names_apart() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectoryDelivery::new(dir.path());
        let shared = sink.clone();
        sink.deliver(b"first", "a.webp");
        shared.deliver(b"second", "a.webp");
        sink.deliver(b"third", "sub/a.webp");
        sink.deliver(b"plain", "README");
        sink.deliver(b"plain again", "README");

        let read = |name: &str| std::fs::read(dir.path().join(name)).unwrap();
        assert_eq!(read("a.webp"), b"first");
        assert_eq!(read("a (1).webp"), b"second");
        assert_eq!(read("a (2).webp"), b"third");
        assert_eq!(read("README"), b"plain");
        assert_eq!(read("README (1)"), b"plain again");
    }
}

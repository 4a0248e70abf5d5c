//! Pre-decode normalisation for image containers the bundled decoders
//! cannot read (HEIC, camera RAW …).
//!
//! A normaliser turns the source bytes into an intermediate the raster engine
//! does read, usually PNG. It is optional: with none registered, such inputs
//! fail with a decode error like any other unreadable file.

use crate::error::ConvertError;
use crate::input::SourceFile;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Converts a non-native source into bytes the raster engine can decode.
pub trait FormatNormalizer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether this normaliser handles `media_type`.
    fn accepts(&self, media_type: &str) -> bool;

    /// Produce an intermediate encoding of `source`.
    fn normalize(&self, source: &SourceFile) -> Result<Vec<u8>, ConvertError>;
}

/// Runs an external program to normalise a file.
///
/// `args` may contain the placeholders `{input}` and `{output}`, which are
/// replaced with paths inside a private temporary directory. The program must
/// write its result to `{output}`.
///
/// ```rust
/// use file_converter::engine::normalize::ExternalToolNormalizer;
///
/// let heif = ExternalToolNormalizer::new("heif-convert", ["{input}", "{output}"])
///     .for_types(["image/heic", "image/heif"]);
/// ```
#[derive(Debug, Clone)]
pub struct ExternalToolNormalizer {
    program: PathBuf,
    args: Vec<String>,
    media_types: Vec<String>,
    output_extension: String,
}

impl ExternalToolNormalizer {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            media_types: Vec::new(),
            output_extension: "png".into(),
        }
    }

    pub fn for_types<I, S>(mut self, media_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.media_types = media_types.into_iter().map(Into::into).collect();
        self
    }

    /// Extension of the file the tool writes. Default: `png`.
    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.output_extension = ext.into();
        self
    }

    fn expand_args(&self, input: &std::path::Path, output: &std::path::Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|a| match a.as_str() {
                "{input}" => input.as_os_str().to_owned(),
                "{output}" => output.as_os_str().to_owned(),
                other => OsString::from(other),
            })
            .collect()
    }
}

impl FormatNormalizer for ExternalToolNormalizer {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("external")
    }

    fn accepts(&self, media_type: &str) -> bool {
        self.media_types.iter().any(|t| t.eq_ignore_ascii_case(media_type))
    }

    fn normalize(&self, source: &SourceFile) -> Result<Vec<u8>, ConvertError> {
        let fail = |detail: String| ConvertError::Decode {
            name: source.name().to_string(),
            detail,
        };

        let dir = tempfile::tempdir()?;
        let ext = source.extension().unwrap_or_else(|| "bin".into());
        let input = dir.path().join(format!("input.{ext}"));
        let output = dir.path().join(format!("output.{}", self.output_extension));
        std::fs::write(&input, source.bytes())?;

        debug!("Running {} for {}", self.program.display(), source.name());
        let result = Command::new(&self.program)
            .args(self.expand_args(&input, &output))
            .output()
            .map_err(|e| fail(format!("cannot run {}: {e}", self.program.display())))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(fail(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }

        std::fs::read(&output).map_err(|e| fail(format!("no output produced: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_registered_types_only() {
        let n = ExternalToolNormalizer::new("heif-convert", ["{input}", "{output}"])
            .for_types(["image/heic"]);
        assert!(n.accepts("image/heic"));
        assert!(n.accepts("IMAGE/HEIC"));
        assert!(!n.accepts("image/png"));
        assert_eq!(n.name(), "heif-convert");
    }

    #[test]
    fn missing_program_is_decode_error() {
        let n = ExternalToolNormalizer::new("/nonexistent/normaliser-tool", ["{input}", "{output}"])
            .for_types(["image/heic"]);
        let src = SourceFile::new("photo.heic", "image/heic", b"ftypheic".to_vec());
        let err = n.normalize(&src).unwrap_err();
        assert!(matches!(err, ConvertError::Decode { .. }), "got: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn copies_through_shell_tool() {
        // `cp {input} {output}` stands in for a real converter.
        let n =
            ExternalToolNormalizer::new("cp", ["{input}", "{output}"]).for_types(["image/heic"]);
        let src = SourceFile::new("photo.heic", "image/heic", b"payload".to_vec());
        assert_eq!(n.normalize(&src).unwrap(), b"payload");
    }
}

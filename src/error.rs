//! Error types for the file-converter library.
//!
//! Two types reflect two audiences:
//!
//! * [`ConvertError`] — **Detailed**: what actually went wrong, with the
//!   underlying cause (decoder message, ffmpeg stderr, PDF parser error).
//!   Returned by engines and converters and logged for diagnostics.
//!
//! * [`ErrorKind`] — **Generic**: the coarse category stored on a failed
//!   [`crate::orchestrator::ConversionItem`]. Callers inspect the kind; the
//!   cause never leaves the orchestrator boundary except through `tracing`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse failure category recorded on an item in the `Error` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transform parameters were malformed or out of range.
    InvalidSpec,
    /// Source bytes could not be interpreted as the declared type.
    DecodeError,
    /// The requested output encoding is not available.
    EncodeUnsupported,
    /// Document metadata could not be read.
    CorruptDocument,
    /// A page copy, merge or extraction failed partway.
    DocumentOperationFailed,
    /// A shared engine failed to initialise or is not ready.
    EngineUnavailable,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidSpec => "invalid spec",
            ErrorKind::DecodeError => "decode error",
            ErrorKind::EncodeUnsupported => "encoding unsupported",
            ErrorKind::CorruptDocument => "corrupt document",
            ErrorKind::DocumentOperationFailed => "document operation failed",
            ErrorKind::EngineUnavailable => "engine unavailable",
            ErrorKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// All errors produced by engines, converters and configuration.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Spec errors ───────────────────────────────────────────────────────
    /// Transform parameters rejected before any engine call.
    #[error("Invalid transform spec: {0}")]
    InvalidSpec(String),

    // ── Raster errors ─────────────────────────────────────────────────────
    /// The source image could not be decoded (including normalisation failures).
    #[error("Could not decode '{name}': {detail}")]
    Decode { name: String, detail: String },

    /// The requested output encoding is not compiled into this build.
    #[error("Output encoding '{encoding}' is not supported by this build")]
    EncodeUnsupported { encoding: String },

    /// Encoding started but failed for another reason.
    #[error("Encoding to '{encoding}' failed: {detail}")]
    EncodeFailed { encoding: String, detail: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("Document is corrupt: {0}")]
    CorruptDocument(String),

    /// A page copy or page-tree rebuild failed.
    #[error("Document operation failed: {0}")]
    DocumentOperation(String),

    /// PDFium rendering returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// A shared engine (ffmpeg core, PDFium) is not available.
    #[error("Engine '{engine}' is unavailable: {detail}")]
    EngineUnavailable { engine: String, detail: String },

    /// The transcoding core ran but reported failure.
    #[error("Transcode failed: {0}")]
    Transcode(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found, unreadable or empty.
    #[error("Cannot read input '{path}': {reason}")]
    Input { path: PathBuf, reason: String },

    /// Filesystem failure while staging or delivering bytes.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Collapse this error into the generic kind stored on a failed item.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::InvalidSpec(_) => ErrorKind::InvalidSpec,
            ConvertError::Decode { .. } => ErrorKind::DecodeError,
            ConvertError::EncodeUnsupported { .. } => ErrorKind::EncodeUnsupported,
            ConvertError::CorruptDocument(_) => ErrorKind::CorruptDocument,
            ConvertError::DocumentOperation(_) | ConvertError::RasterisationFailed { .. } => {
                ErrorKind::DocumentOperationFailed
            }
            ConvertError::EngineUnavailable { .. } => ErrorKind::EngineUnavailable,
            ConvertError::EncodeFailed { .. }
            | ConvertError::Transcode(_)
            | ConvertError::Input { .. }
            | ConvertError::Io(_)
            | ConvertError::InvalidConfig(_)
            | ConvertError::Internal(_) => ErrorKind::Unknown,
        }
    }

    pub(crate) fn invalid_spec(msg: impl Into<String>) -> Self {
        ConvertError::InvalidSpec(msg.into())
    }

    pub(crate) fn engine_unavailable(engine: &str, detail: impl Into<String>) -> Self {
        ConvertError::EngineUnavailable {
            engine: engine.to_string(),
            detail: detail.into(),
        }
    }
}

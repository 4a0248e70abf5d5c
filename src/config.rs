//! Configuration shared by the converters and the CLI.
//!
//! All tunable behaviour is collected in [`ConverterConfig`], built via its
//! [`ConverterConfigBuilder`]. Per-item transform parameters live in the
//! specs ([`crate::spec`]); the config only supplies their defaults and the
//! engine-level knobs (binary locations, render scale, history size).

use crate::engine::document::{MAX_RENDER_SCALE, MIN_RENDER_SCALE};
use crate::error::ConvertError;
use crate::spec::{ImageSpec, OutputEncoding, MIN_QUALITY};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a converter session.
///
/// # Example
/// ```rust
/// use file_converter::{ConverterConfig, OutputEncoding};
///
/// let config = ConverterConfig::builder()
///     .image_encoding(OutputEncoding::Webp)
///     .quality(0.8)
///     .render_scale(1.5)
///     .build()
///     .unwrap();
/// assert_eq!(config.history_capacity, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Encoding new image items start with. Default: PNG.
    pub image_encoding: OutputEncoding,

    /// Quality new image items start with. Range: 0.1–1.0. Default: 0.9.
    ///
    /// Only lossy encodings honour it.
    pub quality: f32,

    /// Scale factor when rasterising PDF pages. Range: 0.25–8.0. Default: 2.0.
    pub render_scale: f32,

    /// Explicit ffmpeg binary. If None, `FFMPEG_PATH` and then `PATH` are tried.
    pub ffmpeg_path: Option<PathBuf>,

    /// Explicit PDFium library file. If None, `PDFIUM_LIB_PATH` and then the
    /// system library are tried.
    pub pdfium_path: Option<PathBuf>,

    /// Number of history records kept in memory. Default: 50.
    pub history_capacity: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            image_encoding: OutputEncoding::Png,
            quality: 0.9,
            render_scale: 2.0,
            ffmpeg_path: None,
            pdfium_path: None,
            history_capacity: 50,
        }
    }
}

impl ConverterConfig {
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }

    /// Image spec new items start with.
    pub fn default_image_spec(&self) -> ImageSpec {
        ImageSpec {
            encoding: self.image_encoding,
            quality: self.quality,
            ..ImageSpec::default()
        }
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn image_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.config.image_encoding = encoding;
        self
    }

    pub fn quality(mut self, q: f32) -> Self {
        self.config.quality = q.clamp(MIN_QUALITY, 1.0);
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(MIN_RENDER_SCALE, MAX_RENDER_SCALE);
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = Some(path.into());
        self
    }

    pub fn pdfium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_path = Some(path.into());
        self
    }

    pub fn history_capacity(mut self, n: usize) -> Self {
        self.config.history_capacity = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConvertError> {
        let c = &self.config;
        if !c.quality.is_finite() {
            return Err(ConvertError::InvalidConfig("quality must be a number".into()));
        }
        if !c.render_scale.is_finite() {
            return Err(ConvertError::InvalidConfig(
                "render scale must be a number".into(),
            ));
        }
        if c.history_capacity == 0 {
            return Err(ConvertError::InvalidConfig(
                "history capacity must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps() {
        let c = ConverterConfig::builder()
            .quality(3.0)
            .render_scale(0.01)
            .build()
            .unwrap();
        assert_eq!(c.quality, 1.0);
        assert_eq!(c.render_scale, 0.25);
    }

    #[test]
    fn zero_history_rejected() {
        let r = ConverterConfig::builder().history_capacity(0).build();
        assert!(matches!(r, Err(ConvertError::InvalidConfig(_))));
    }

    #[test]
    fn default_image_spec_uses_config() {
        let c = ConverterConfig::builder()
            .image_encoding(OutputEncoding::Jpeg)
            .quality(0.5)
            .build()
            .unwrap();
        let s = c.default_image_spec();
        assert_eq!(s.encoding, OutputEncoding::Jpeg);
        assert_eq!(s.quality, 0.5);
    }
}

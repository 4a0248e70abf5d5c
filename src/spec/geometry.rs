//! Geometric transform spec for raster images and its size resolution.
//!
//! [`GeometricTransformSpec::resolve`] is the single place where crop,
//! resize and rotation combine into output dimensions. The raster engine
//! renders exactly what `resolve` reports, so every dimension property can be
//! checked here without decoding a pixel.

use super::Rotation;
use crate::error::ConvertError;
use serde::{Deserialize, Serialize};

/// Largest image, in pixels, any transform may produce. At four bytes per
/// pixel this is 512 MiB, the same ceiling the `image` decoders apply to
/// their own allocations.
pub const MAX_OUTPUT_PIXELS: u64 = 128 * 1024 * 1024;

/// Crop rectangle in source-pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
}

/// How the cropped region is scaled before rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Keep the cropped region's size. (default)
    #[default]
    None,
    /// Scale to this width in pixels, keeping aspect ratio.
    ByWidth(u32),
    /// Scale both dimensions by this percentage.
    ByPercent(u32),
}

/// Crop, rotation, flips and resize for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeometricTransformSpec {
    /// Region to keep. `None` keeps the full image.
    pub crop: Option<CropRect>,
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub resize: ResizeMode,
}

/// Output of [`GeometricTransformSpec::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedGeometry {
    /// Source region that is drawn.
    pub crop: CropRect,
    /// Size the cropped region is stretched to, before rotation.
    pub resized_width: u32,
    pub resized_height: u32,
    /// Final canvas size, transposed for quarter turns.
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl GeometricTransformSpec {
    /// Check parameters that do not depend on the source size.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if let Some(c) = self.crop {
            if c.width == 0 || c.height == 0 {
                return Err(ConvertError::invalid_spec(format!(
                    "crop must have a non-zero area, got {}x{}",
                    c.width, c.height
                )));
            }
        }
        match self.resize {
            ResizeMode::ByWidth(0) => Err(ConvertError::invalid_spec("resize width must be > 0")),
            ResizeMode::ByPercent(0) => {
                Err(ConvertError::invalid_spec("resize percentage must be > 0"))
            }
            _ => Ok(()),
        }
    }

    /// Resolve crop, resize and canvas size against a `width × height` source.
    ///
    /// Resize is applied to the **cropped** region, never to the full source.
    /// Fractional results are rounded to the nearest pixel; anything that
    /// rounds to zero, or exceeds [`MAX_OUTPUT_PIXELS`], is rejected.
    pub fn resolve(&self, width: u32, height: u32) -> Result<ResolvedGeometry, ConvertError> {
        self.validate()?;
        if width == 0 || height == 0 {
            return Err(ConvertError::invalid_spec("source image has zero area"));
        }

        let crop = self.crop.unwrap_or(CropRect::full(width, height));
        let right = u64::from(crop.x) + u64::from(crop.width);
        let bottom = u64::from(crop.y) + u64::from(crop.height);
        if right > u64::from(width) || bottom > u64::from(height) {
            return Err(ConvertError::invalid_spec(format!(
                "crop {}x{}+{}+{} exceeds source bounds {}x{}",
                crop.width, crop.height, crop.x, crop.y, width, height
            )));
        }

        let (cw, ch) = (f64::from(crop.width), f64::from(crop.height));
        let (rw, rh) = match self.resize {
            ResizeMode::None => (cw, ch),
            ResizeMode::ByWidth(w) => (f64::from(w), ch * f64::from(w) / cw),
            ResizeMode::ByPercent(p) => {
                let f = f64::from(p) / 100.0;
                (cw * f, ch * f)
            }
        };
        let (rw, rh) = (rw.round(), rh.round());
        if rw < 1.0 || rh < 1.0 {
            return Err(ConvertError::invalid_spec(format!(
                "resize produces a zero-area image ({rw}x{rh})"
            )));
        }
        // Both edges are >= 1, so the area bound also keeps each edge in u32.
        if rw * rh > MAX_OUTPUT_PIXELS as f64 {
            return Err(ConvertError::invalid_spec(format!(
                "resize produces a {rw}x{rh} image, above the {MAX_OUTPUT_PIXELS} pixel limit"
            )));
        }
        let (resized_width, resized_height) = (rw as u32, rh as u32);

        let (canvas_width, canvas_height) = if self.rotation.is_quarter_turn() {
            (resized_height, resized_width)
        } else {
            (resized_width, resized_height)
        };

        Ok(ResolvedGeometry {
            crop,
            resized_width,
            resized_height,
            canvas_width,
            canvas_height,
        })
    }
}

/// Encodings the raster engine can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputEncoding {
    #[default]
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Avif,
}

impl OutputEncoding {
    pub fn media_type(self) -> &'static str {
        match self {
            OutputEncoding::Png => "image/png",
            OutputEncoding::Jpeg => "image/jpeg",
            OutputEncoding::Webp => "image/webp",
            OutputEncoding::Gif => "image/gif",
            OutputEncoding::Bmp => "image/bmp",
            OutputEncoding::Avif => "image/avif",
        }
    }

    /// File extension, taken from the media subtype (`image/jpeg` → `jpeg`).
    pub fn extension(self) -> &'static str {
        let mt = self.media_type();
        &mt[mt.find('/').map_or(0, |i| i + 1)..]
    }

    /// Parse a media type or short name (`"image/webp"`, `"webp"`, `"jpg"`).
    pub fn parse(s: &str) -> Result<Self, ConvertError> {
        let s = s.trim().to_ascii_lowercase();
        let short = s.strip_prefix("image/").unwrap_or(&s);
        match short {
            "png" => Ok(OutputEncoding::Png),
            "jpeg" | "jpg" => Ok(OutputEncoding::Jpeg),
            "webp" => Ok(OutputEncoding::Webp),
            "gif" => Ok(OutputEncoding::Gif),
            "bmp" => Ok(OutputEncoding::Bmp),
            "avif" => Ok(OutputEncoding::Avif),
            other => Err(ConvertError::EncodeUnsupported {
                encoding: other.to_string(),
            }),
        }
    }
}

/// Lowest accepted encoder quality.
pub const MIN_QUALITY: f32 = 0.1;

/// Full per-item spec for the image tool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub geometry: GeometricTransformSpec,
    pub encoding: OutputEncoding,
    /// 0.1–1.0; ignored for lossless encodings.
    pub quality: f32,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            geometry: GeometricTransformSpec::default(),
            encoding: OutputEncoding::default(),
            quality: 0.9,
        }
    }
}

impl ImageSpec {
    pub fn validate(&self) -> Result<(), ConvertError> {
        self.geometry.validate()?;
        if !(MIN_QUALITY..=1.0).contains(&self.quality) {
            return Err(ConvertError::invalid_spec(format!(
                "quality must be between {MIN_QUALITY} and 1.0, got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

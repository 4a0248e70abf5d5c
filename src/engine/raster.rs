//! Raster transform: crop → resize → flip → rotate → encode.
//!
//! The drawing model is a canvas whose origin sits at its centre: the canvas
//! is rotated, then mirrored, then the cropped region is drawn stretched to the
//! resized size. Composing those transforms means a pixel is first mirrored in
//! the image's own axes and then rotated, which is the order [`render`]
//! applies them in. Output dimensions always equal
//! [`GeometricTransformSpec::resolve`]'s canvas size.
//!
//! Every function here is pure; callers run them on the blocking pool.

use crate::engine::normalize::FormatNormalizer;
use crate::error::ConvertError;
use crate::input::SourceFile;
use crate::spec::{GeometricTransformSpec, ImageSpec, OutputEncoding, Rotation};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Encoded output of one raster transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub encoding: OutputEncoding,
}

/// Apply the geometric part of a spec to decoded pixels.
pub fn render(
    img: &DynamicImage,
    spec: &GeometricTransformSpec,
) -> Result<DynamicImage, ConvertError> {
    let g = spec.resolve(img.width(), img.height())?;

    let cropped = if (g.crop.width, g.crop.height) == (img.width(), img.height()) {
        img.clone()
    } else {
        img.crop_imm(g.crop.x, g.crop.y, g.crop.width, g.crop.height)
    };

    let resized = if (g.resized_width, g.resized_height) == (cropped.width(), cropped.height()) {
        cropped
    } else {
        cropped.resize_exact(g.resized_width, g.resized_height, FilterType::Lanczos3)
    };

    let mirrored = match (spec.flip_horizontal, spec.flip_vertical) {
        (false, false) => resized,
        (true, false) => resized.fliph(),
        (false, true) => resized.flipv(),
        // Scale (-1, -1) is a half turn.
        (true, true) => resized.rotate180(),
    };

    let out = match spec.rotation {
        Rotation::Deg0 => mirrored,
        Rotation::Deg90 => mirrored.rotate90(),
        Rotation::Deg180 => mirrored.rotate180(),
        Rotation::Deg270 => mirrored.rotate270(),
    };
    debug_assert_eq!((out.width(), out.height()), (g.canvas_width, g.canvas_height));
    Ok(out)
}

/// Encode pixels. `quality` (0–1] only affects lossy encodings.
pub fn encode(
    img: &DynamicImage,
    encoding: OutputEncoding,
    quality: f32,
) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::new();
    let written = match encoding {
        OutputEncoding::Jpeg => {
            // JPEG has no alpha channel; flatten first.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let q = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, q))
        }
        OutputEncoding::Webp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buf))
        }
        OutputEncoding::Png => write_format(img, &mut buf, ImageFormat::Png),
        OutputEncoding::Gif => write_format(img, &mut buf, ImageFormat::Gif),
        OutputEncoding::Bmp => write_format(img, &mut buf, ImageFormat::Bmp),
        OutputEncoding::Avif => write_format(img, &mut buf, ImageFormat::Avif),
    };

    match written {
        Ok(()) => Ok(buf),
        Err(ImageError::Unsupported(e)) => {
            debug!("Encoder rejected {:?}: {}", encoding, e);
            Err(ConvertError::EncodeUnsupported {
                encoding: encoding.media_type().to_string(),
            })
        }
        Err(e) => Err(ConvertError::EncodeFailed {
            encoding: encoding.media_type().to_string(),
            detail: e.to_string(),
        }),
    }
}

fn write_format(
    img: &DynamicImage,
    buf: &mut Vec<u8>,
    format: ImageFormat,
) -> Result<(), ImageError> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    rgba.write_to(&mut Cursor::new(buf), format)
}

/// Render and encode in one call.
pub fn transform(
    img: &DynamicImage,
    spec: &GeometricTransformSpec,
    encoding: OutputEncoding,
    quality: f32,
) -> Result<EncodedImage, ConvertError> {
    let rendered = render(img, spec)?;
    let bytes = encode(&rendered, encoding, quality)?;
    Ok(EncodedImage {
        bytes,
        width: rendered.width(),
        height: rendered.height(),
        encoding,
    })
}

/// Decodes sources (normalising exotic containers first) and transforms them.
#[derive(Clone, Default)]
pub struct RasterEngine {
    normalizers: Vec<Arc<dyn FormatNormalizer>>,
}

impl std::fmt::Debug for RasterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterEngine")
            .field("normalizers", &self.normalizers.len())
            .finish()
    }
}

impl RasterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-decode step; the first one that accepts a type wins.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn FormatNormalizer>) -> Self {
        self.normalizers.push(normalizer);
        self
    }

    /// Decode a source into pixels.
    ///
    /// Types the built-in decoders cannot read go through a registered
    /// normaliser first. Every failure on that path, including the absence of
    /// a normaliser, is reported as [`ConvertError::Decode`].
    pub fn decode(&self, source: &SourceFile) -> Result<DynamicImage, ConvertError> {
        let bytes = self.decodable_bytes(source)?;
        image::load_from_memory(&bytes).map_err(|e| decode_error(source, e))
    }

    /// Bytes one of the built-in decoders can read: the source itself, or
    /// the output of the first normaliser that accepts its type.
    fn decodable_bytes<'a>(&self, source: &'a SourceFile) -> Result<Cow<'a, [u8]>, ConvertError> {
        if is_native(source.media_type()) {
            return Ok(Cow::Borrowed(source.bytes()));
        }

        let normalizer = self
            .normalizers
            .iter()
            .find(|n| n.accepts(source.media_type()))
            .ok_or_else(|| {
                decode_error(source, format!("no normaliser for '{}'", source.media_type()))
            })?;

        debug!("Normalising {} via {}", source.name(), normalizer.name());
        normalizer
            .normalize(source)
            .map(Cow::Owned)
            .map_err(|e| decode_error(source, format!("normalisation failed: {e}")))
    }

    /// Decode, render and encode one source according to `spec`.
    ///
    /// The output size is resolved from the header dimensions before any
    /// pixels are decoded, so an oversized resize fails as
    /// [`ConvertError::InvalidSpec`] without allocating.
    pub fn convert(
        &self,
        source: &SourceFile,
        spec: &ImageSpec,
    ) -> Result<EncodedImage, ConvertError> {
        spec.validate()?;
        let bytes = self.decodable_bytes(source)?;

        let (width, height) = ImageReader::new(Cursor::new(&bytes[..]))
            .with_guessed_format()
            .map_err(|e| decode_error(source, e))?
            .into_dimensions()
            .map_err(|e| decode_error(source, e))?;
        spec.geometry.resolve(width, height)?;

        let img = image::load_from_memory(&bytes).map_err(|e| decode_error(source, e))?;
        transform(&img, &spec.geometry, spec.encoding, spec.quality)
    }
}

fn decode_error(source: &SourceFile, detail: impl ToString) -> ConvertError {
    ConvertError::Decode {
        name: source.name().to_string(),
        detail: detail.to_string(),
    }
}

/// Types the bundled decoders read directly. Unknown/generic types are tried
/// as native so content sniffing gets a chance.
pub fn is_native(media_type: &str) -> bool {
    matches!(
        media_type,
        "image/png"
            | "image/jpeg"
            | "image/jpg"
            | "image/webp"
            | "image/gif"
            | "image/bmp"
            | "image/x-ms-bmp"
            | "application/octet-stream"
            | ""
    )
}

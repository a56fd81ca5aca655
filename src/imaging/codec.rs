//! Output format tables, decoding and encoding.
//!
//! | Extension | MIME | Decode | Encode |
//! |---|---|---|---|
//! | `png` | `image/png` | yes | yes |
//! | `jpg`, `jpeg` | `image/jpeg` | yes | yes, quality |
//! | `tif`, `tiff` | `image/tiff` | yes | yes |
//! | `webp` | `image/webp` | yes | no |
//! | `bmp` | `image/bmp` | yes | no |
//! | `gif` | `image/gif` | served as-is only | no |
//! | `avif` | `image/avif` | no | yes, quality |
//!
//! Extensions are matched case-insensitively.

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

use super::operation::ImagingError;
use super::params::Quality;

/// Encoders this build can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    Png,
    Jpeg,
    Tiff,
    Avif,
}

impl Encoder {
    /// Whether the `:quality` modifier applies.
    pub fn is_lossy(self) -> bool {
        matches!(self, Encoder::Jpeg | Encoder::Avif)
    }
}

/// A MIME type paired with the encoder that can produce it, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub mime: &'static str,
    pub encoder: Option<Encoder>,
}

const FORMATS: &[(&[&str], OutputFormat)] = &[
    (
        &["png"],
        OutputFormat {
            mime: "image/png",
            encoder: Some(Encoder::Png),
        },
    ),
    (
        &["jpg", "jpeg"],
        OutputFormat {
            mime: "image/jpeg",
            encoder: Some(Encoder::Jpeg),
        },
    ),
    (
        &["tif", "tiff"],
        OutputFormat {
            mime: "image/tiff",
            encoder: Some(Encoder::Tiff),
        },
    ),
    (
        &["webp"],
        OutputFormat {
            mime: "image/webp",
            encoder: None,
        },
    ),
    (
        &["bmp"],
        OutputFormat {
            mime: "image/bmp",
            encoder: None,
        },
    ),
    (
        &["gif"],
        OutputFormat {
            mime: "image/gif",
            encoder: None,
        },
    ),
    (
        &["avif"],
        OutputFormat {
            mime: "image/avif",
            encoder: Some(Encoder::Avif),
        },
    ),
];

/// Look up an output extension such as `"jpg"` or `"PNG"`.
pub fn format_for_extension(ext: &str) -> Option<OutputFormat> {
    FORMATS
        .iter()
        .find(|(exts, _)| exts.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .map(|(_, format)| *format)
}

/// Look up a MIME type. Parameters after `;` are ignored.
pub fn format_for_mime(mime: &str) -> Option<OutputFormat> {
    let essence = mime_essence(mime);
    FORMATS
        .iter()
        .find(|(_, format)| format.mime.eq_ignore_ascii_case(essence))
        .map(|(_, format)| *format)
}

/// `"image/PNG; q=1"` → `"image/PNG"`.
pub fn mime_essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}

fn decoder_for_mime(mime: &str) -> Option<ImageFormat> {
    let essence = mime_essence(mime).to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/tiff" => Some(ImageFormat::Tiff),
        "image/webp" => Some(ImageFormat::WebP),
        "image/bmp" => Some(ImageFormat::Bmp),
        "image/gif" => Some(ImageFormat::Gif),
        _ => None,
    }
}

/// Decode `data` using the format its MIME type names, falling back to
/// content sniffing for unknown types.
pub fn decode(data: &[u8], mime: &str) -> Result<DynamicImage, ImagingError> {
    match decoder_for_mime(mime) {
        Some(format) => image::load_from_memory_with_format(data, format),
        None => image::load_from_memory(data),
    }
    .map_err(ImagingError::Decode)
}

/// Encode `image` into a fresh buffer.
///
/// JPEG has no alpha channel, so images are flattened to RGB8 first. AVIF is
/// written from RGBA8 at speed 6.
pub fn encode(
    image: &DynamicImage,
    encoder: Encoder,
    quality: Quality,
) -> Result<Vec<u8>, ImagingError> {
    let mut buf = Vec::new();
    match encoder {
        Encoder::Png => image.write_with_encoder(PngEncoder::new(&mut buf)),
        Encoder::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality.as_u8())),
        Encoder::Tiff => image.write_with_encoder(TiffEncoder::new(Cursor::new(&mut buf))),
        Encoder::Avif => DynamicImage::ImageRgba8(image.to_rgba8()).write_with_encoder(
            AvifEncoder::new_with_speed_quality(&mut buf, 6, quality.as_u8()),
        ),
    }
    .map_err(ImagingError::Encode)?;
    Ok(buf)
}

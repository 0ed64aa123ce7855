//! Image normalisation – turns whatever the store hands back into a PNG or
//! JPEG the compositor can place.
//!
//! PNG and JPEG pass through untouched (only the header is read for the
//! pixel size). Every other format the `image` crate can decode is
//! rasterised and re-encoded losslessly as PNG.

use std::io::Cursor;

use ::image::codecs::jpeg::JpegDecoder;
use ::image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader};

use crate::error::ImageDecodeError;

/// Colour model of a JPEG, from the component count in its frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegColor {
    Gray,
    Rgb,
    Cmyk,
}

impl JpegColor {
    fn from_components(components: u8) -> Option<Self> {
        match components {
            1 => Some(JpegColor::Gray),
            3 => Some(JpegColor::Rgb),
            4 => Some(JpegColor::Cmyk),
            _ => None,
        }
    }

    /// PDF colour space name for the DCT stream.
    pub fn color_space(self) -> &'static str {
        match self {
            JpegColor::Gray => "DeviceGray",
            JpegColor::Rgb => "DeviceRGB",
            JpegColor::Cmyk => "DeviceCMYK",
        }
    }
}

/// Raster encodings the compositor embeds directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedFormat {
    Png,
    /// JPEG data is embedded as a DCT stream.
    Jpeg { color: JpegColor },
}

/// An image ready for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddableImage {
    pub format: EmbedFormat,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EmbeddableImage {
    pub fn is_png(&self) -> bool {
        self.format == EmbedFormat::Png
    }
}

/// What a declared content type says about the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Declared {
    Png,
    Jpeg,
    Other,
}

fn classify(content_type: Option<&str>) -> Declared {
    let Some(ct) = content_type else {
        return Declared::Other;
    };
    let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => Declared::Png,
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Declared::Jpeg,
        _ => Declared::Other,
    }
}

/// Normalise `bytes` into an embeddable image.
///
/// `declared_content_type` is the type reported by whoever served the bytes
/// (HTTP header, data-URI header, file extension). A PNG/JPEG declaration is
/// trusted for the pass-through path; if the bytes do not actually parse as
/// that format the call fails rather than guessing.
pub fn normalize(
    bytes: &[u8],
    declared_content_type: Option<&str>,
) -> Result<EmbeddableImage, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError("empty image data".to_string()));
    }

    match classify(declared_content_type) {
        Declared::Png => {
            let (width, height) = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png)
                .into_dimensions()
                .map_err(|e| ImageDecodeError(format!("PNG header: {e}")))?;
            Ok(EmbeddableImage {
                format: EmbedFormat::Png,
                bytes: bytes.to_vec(),
                width,
                height,
            })
        }
        Declared::Jpeg => {
            let decoder = JpegDecoder::new(Cursor::new(bytes))
                .map_err(|e| ImageDecodeError(format!("JPEG header: {e}")))?;
            let (width, height) = decoder.dimensions();
            // The decoder reports CMYK input as converted RGB, so the frame
            // header is the only reliable source for the stream's layout.
            let Some(color) = jpeg_components(bytes).and_then(JpegColor::from_components) else {
                return reencode_png(bytes, declared_content_type);
            };
            Ok(EmbeddableImage {
                format: EmbedFormat::Jpeg { color },
                bytes: bytes.to_vec(),
                width,
                height,
            })
        }
        Declared::Other => reencode_png(bytes, declared_content_type),
    }
}

/// Component count from the first start-of-frame marker.
pub fn jpeg_components(data: &[u8]) -> Option<u8> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        pos += 2;
        match marker {
            // Fill bytes and standalone markers carry no segment.
            0xFF => pos -= 1,
            0x00 | 0x01 | 0xD0..=0xD8 => {}
            0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                // length(2) precision(1) height(2) width(2) components(1)
                return data.get(pos + 7).copied();
            }
            0xD9 | 0xDA => return None,
            _ => {
                let len = u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]);
                pos += usize::from(len);
            }
        }
    }
    None
}

/// Decode with the format sniffed from the bytes, then write a PNG.
fn reencode_png(
    bytes: &[u8],
    declared_content_type: Option<&str>,
) -> Result<EmbeddableImage, ImageDecodeError> {
    let decoded = ::image::load_from_memory(bytes).map_err(|e| {
        ImageDecodeError(format!(
            "{} ({e})",
            declared_content_type.unwrap_or("unknown content type")
        ))
    })?;

    // The PNG encoder has no float sample support.
    let bitmap = match decoded.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => DynamicImage::ImageRgba8(decoded.to_rgba8()),
        _ => decoded,
    };

    let mut out = Vec::new();
    bitmap
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| ImageDecodeError(format!("PNG encode: {e}")))?;

    log::debug!(
        "re-encoded {} image ({}x{}) as PNG",
        declared_content_type.unwrap_or("untyped"),
        bitmap.width(),
        bitmap.height()
    );

    Ok(EmbeddableImage {
        format: EmbedFormat::Png,
        bytes: out,
        width: bitmap.width(),
        height: bitmap.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    fn checker(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([200, 30, 30])
            } else {
                Rgb([10, 10, 10])
            }
        })
    }

    #[test]
    fn png_passes_through_unchanged() {
        let png = encode(DynamicImage::ImageRgb8(checker(7, 5)), ImageFormat::Png);
        let out = normalize(&png, Some("image/png")).unwrap();
        assert!(out.is_png());
        assert_eq!(out.bytes, png);
        assert_eq!((out.width, out.height), (7, 5));
    }

    #[test]
    fn jpeg_passes_through_unchanged() {
        let jpg = encode(DynamicImage::ImageRgb8(checker(16, 9)), ImageFormat::Jpeg);
        let out = normalize(&jpg, Some("image/jpg")).unwrap();
        assert_eq!(out.format, EmbedFormat::Jpeg { color: JpegColor::Rgb });
        assert_eq!(out.bytes, jpg);
        assert_eq!((out.width, out.height), (16, 9));
    }

    #[test]
    fn gray_jpeg_is_detected() {
        let gray = ::image::GrayImage::from_fn(8, 8, |x, _| ::image::Luma([(x * 30) as u8]));
        let jpg = encode(DynamicImage::ImageLuma8(gray), ImageFormat::Jpeg);
        assert_eq!(jpeg_components(&jpg), Some(1));
        let out = normalize(&jpg, Some("image/jpeg")).unwrap();
        assert_eq!(out.format, EmbedFormat::Jpeg { color: JpegColor::Gray });
    }

    #[test]
    fn frame_header_component_count() {
        // SOI, APP14 "Adobe" segment, then a progressive SOF with 4 components.
        let mut cmyk = vec![0xFF, 0xD8, 0xFF, 0xEE, 0x00, 0x07, b'A', b'd', b'o', b'b', b'e'];
        cmyk.extend_from_slice(&[0xFF, 0xFF, 0xC2, 0x00, 0x14, 0x08, 0x00, 0x10, 0x00, 0x20, 0x04]);
        assert_eq!(jpeg_components(&cmyk), Some(4));
        assert_eq!(JpegColor::from_components(4), Some(JpegColor::Cmyk));
        assert_eq!(JpegColor::Cmyk.color_space(), "DeviceCMYK");

        let jpg = encode(DynamicImage::ImageRgb8(checker(4, 4)), ImageFormat::Jpeg);
        assert_eq!(jpeg_components(&jpg), Some(3));
        assert_eq!(jpeg_components(b"\xFF\xD8"), None);
        assert_eq!(jpeg_components(b"not a jpeg"), None);
    }

    #[test]
    fn bmp_is_reencoded_as_png_with_same_size() {
        let bmp = encode(DynamicImage::ImageRgb8(checker(13, 4)), ImageFormat::Bmp);
        let out = normalize(&bmp, Some("image/bmp")).unwrap();
        assert!(out.is_png());
        let back = ::image::load_from_memory_with_format(&out.bytes, ImageFormat::Png).unwrap();
        assert_eq!((back.width(), back.height()), (13, 4));
    }

    #[test]
    fn webp_is_reencoded_as_png_with_same_size() {
        let rgba = RgbaImage::from_pixel(12, 8, Rgba([0, 120, 110, 255]));
        let webp = encode(DynamicImage::ImageRgba8(rgba), ImageFormat::WebP);
        let out = normalize(&webp, Some("image/webp")).unwrap();
        assert!(out.is_png());
        assert_eq!((out.width, out.height), (12, 8));
    }

    #[test]
    fn missing_content_type_sniffs_format() {
        let gif = encode(DynamicImage::ImageRgba8(RgbaImage::new(3, 3)), ImageFormat::Gif);
        let out = normalize(&gif, None).unwrap();
        assert!(out.is_png());
        assert_eq!((out.width, out.height), (3, 3));
    }

    #[test]
    fn content_type_parameters_are_ignored() {
        let png = encode(DynamicImage::ImageRgb8(checker(2, 2)), ImageFormat::Png);
        let out = normalize(&png, Some("Image/PNG; charset=binary")).unwrap();
        assert_eq!(out.bytes, png);
    }

    #[test]
    fn corrupt_bytes_fail() {
        assert!(normalize(b"not an image at all", Some("image/webp")).is_err());
        assert!(normalize(b"not a png", Some("image/png")).is_err());
        assert!(normalize(&[], None).is_err());
    }
}

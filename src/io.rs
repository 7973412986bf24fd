// ============================================================================
// IMAGE I/O — snapshot encoding, decoding and file helpers
// ============================================================================

use std::io::Cursor;
use std::path::Path;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageError, RgbaImage};

/// Encoded output formats for document snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SnapshotFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
}

impl SnapshotFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            SnapshotFormat::Png => "image/png",
            SnapshotFormat::Jpeg => "image/jpeg",
            SnapshotFormat::Bmp => "image/bmp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Png => "png",
            SnapshotFormat::Jpeg => "jpg",
            SnapshotFormat::Bmp => "bmp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(SnapshotFormat::Png),
            "image/jpeg" | "image/jpg" => Some(SnapshotFormat::Jpeg),
            "image/bmp" => Some(SnapshotFormat::Bmp),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(SnapshotFormat::Png),
            "jpg" | "jpeg" => Some(SnapshotFormat::Jpeg),
            "bmp" => Some(SnapshotFormat::Bmp),
            _ => None,
        }
    }

    /// Format implied by a file path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Error type for snapshot and image file operations
#[derive(Debug)]
pub enum ImageIoError {
    Io(std::io::Error),
    Image(ImageError),
    InvalidFormat(String),
}

impl std::fmt::Display for ImageIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageIoError::Io(e) => write!(f, "I/O error: {}", e),
            ImageIoError::Image(e) => write!(f, "Image error: {}", e),
            ImageIoError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for ImageIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageIoError::Io(e) => Some(e),
            ImageIoError::Image(e) => Some(e),
            ImageIoError::InvalidFormat(_) => None,
        }
    }
}

impl From<std::io::Error> for ImageIoError {
    fn from(e: std::io::Error) -> Self {
        ImageIoError::Io(e)
    }
}

impl From<ImageError> for ImageIoError {
    fn from(e: ImageError) -> Self {
        ImageIoError::Image(e)
    }
}

/// Map a 0–100 quality setting to a 0–1 fraction rounded to two decimals.
pub fn quality_fraction(quality: u8) -> f64 {
    (quality.min(100) as f64 / 100.0 * 100.0).round() / 100.0
}

/// Encode `image` in `format`.  `quality` (0–100) only affects lossy formats.
pub fn encode_image(image: &RgbaImage, format: SnapshotFormat, quality: u8) -> Result<Vec<u8>, ImageIoError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ImageIoError::InvalidFormat("cannot encode an empty image".to_string()));
    }
    let mut out = Cursor::new(Vec::new());

    match format {
        SnapshotFormat::Png => {
            let encoder = PngEncoder::new(&mut out);
            #[allow(deprecated)]
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SnapshotFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let q = (quality_fraction(quality) * 100.0).round().clamp(1.0, 100.0) as u8;
            let mut encoder = JpegEncoder::new_with_quality(&mut out, q);
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SnapshotFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut out);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
    }
    Ok(out.into_inner())
}

/// Decode an encoded image into RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, ImageIoError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Load an image file from disk into RGBA.
pub fn load_image(path: &Path) -> Result<RgbaImage, ImageIoError> {
    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

/// Write encoded bytes to `path`.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), ImageIoError> {
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_round_trip_is_exact() {
        let mut img = RgbaImage::from_pixel(5, 3, Rgba([12, 34, 56, 200]));
        img.put_pixel(4, 2, Rgba([255, 0, 0, 0]));
        let bytes = encode_image(&img, SnapshotFormat::Png, 92).unwrap();
        assert_eq!(decode_image(&bytes).unwrap(), img);
    }

    #[test]
    fn jpeg_drops_alpha_and_stays_close() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([200, 100, 50, 255]));
        let bytes = encode_image(&img, SnapshotFormat::Jpeg, 95).unwrap();
        let back = decode_image(&bytes).unwrap();
        let p = back.get_pixel(8, 8);
        assert!((p[0] as i32 - 200).abs() <= 4);
        assert!((p[1] as i32 - 100).abs() <= 4);
        assert_eq!(p[3], 255);
    }

    #[test]
    fn empty_image_is_rejected() {
        assert!(matches!(
            encode_image(&RgbaImage::new(0, 4), SnapshotFormat::Png, 92),
            Err(ImageIoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn quality_rounds_to_two_decimals() {
        assert_eq!(quality_fraction(92), 0.92);
        assert_eq!(quality_fraction(100), 1.0);
        assert_eq!(quality_fraction(250), 1.0);
        assert_eq!(quality_fraction(0), 0.0);
    }

    #[test]
    fn formats_from_mime_and_extension() {
        assert_eq!(SnapshotFormat::from_mime("image/jpeg"), Some(SnapshotFormat::Jpeg));
        assert_eq!(SnapshotFormat::from_extension("PNG"), Some(SnapshotFormat::Png));
        assert_eq!(SnapshotFormat::from_path(Path::new("out/shot.bmp")), Some(SnapshotFormat::Bmp));
        assert_eq!(SnapshotFormat::from_mime("image/gif"), None);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(decode_image(b"not an image"), Err(ImageIoError::Image(_))));
    }
}

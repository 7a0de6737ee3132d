//! Image file decoding and re-encoding for file-backed frames

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use tracing::debug;

use super::frame::{Frame, PixelFormat};
use crate::error::{FrameError, SourceError};

const JPEG_QUALITY: u8 = 90;

/// A decoded image file with its EXIF orientation already applied.
pub struct DecodedImage {
    pub image: DynamicImage,
    pub orientation: Orientation,
    pub format: Option<ImageFormat>,
    /// The file exactly as read from disk
    pub original: Bytes,
}

impl DecodedImage {
    /// JPEG bytes with orientation normalized.
    ///
    /// An upright JPEG is passed through untouched; anything else is
    /// re-encoded from the rotated pixels.
    pub fn jpeg(&self) -> Result<Bytes, image::ImageError> {
        if self.orientation == Orientation::NoTransforms && self.format == Some(ImageFormat::Jpeg) {
            return Ok(self.original.clone());
        }
        encode_jpeg(&self.image).map(Bytes::from)
    }
}

pub fn decode_file(path: &Path) -> Result<DecodedImage, SourceError> {
    let original = std::fs::read(path).map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(Bytes::from(original)).map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

pub fn decode_bytes(original: Bytes) -> Result<DecodedImage, image::ImageError> {
    let reader = ImageReader::new(Cursor::new(original.as_ref())).with_guessed_format()?;
    let format = reader.format();

    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    if orientation != Orientation::NoTransforms {
        debug!("Applying EXIF orientation {:?}", orientation);
        image.apply_orientation(orientation);
    }

    Ok(DecodedImage {
        image,
        orientation,
        format,
        original,
    })
}

pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Vec::with_capacity(64 * 1024);
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    // JPEG has no alpha channel
    DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
    Ok(out)
}

/// Convert decoded pixels into a packed blue-first frame.
pub fn to_frame(image: &DynamicImage) -> Result<Frame, FrameError> {
    let (width, height) = (image.width(), image.height());

    if image.color().has_alpha() {
        let mut pixels = image.to_rgba8().into_raw();
        swap_red_blue(&mut pixels, 4);
        Frame::from_pixels(width, height, PixelFormat::Argb32, pixels)
    } else {
        let mut pixels = image.to_rgb8().into_raw();
        swap_red_blue(&mut pixels, 3);
        Frame::from_pixels(width, height, PixelFormat::Rgb24, pixels)
    }
}

/// Swap the first and third channel of every pixel in place.
pub fn swap_red_blue(pixels: &mut [u8], bytes_per_pixel: usize) {
    for px in pixels.chunks_exact_mut(bytes_per_pixel) {
        px.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(image: DynamicImage) -> Bytes {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        Bytes::from(out.into_inner())
    }

    #[test]
    fn rgb_image_becomes_bgr_frame() {
        let img = RgbImage::from_pixel(2, 1, Rgb([10, 20, 30]));
        let frame = to_frame(&DynamicImage::ImageRgb8(img)).unwrap();

        assert_eq!(frame.format(), PixelFormat::Rgb24);
        assert_eq!(&frame.data[..], &[30, 20, 10, 30, 20, 10]);
    }

    #[test]
    fn alpha_image_becomes_bgra_frame() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 4]));
        let frame = to_frame(&DynamicImage::ImageRgba8(img)).unwrap();

        assert_eq!(frame.format(), PixelFormat::Argb32);
        assert_eq!(&frame.data[..], &[3, 2, 1, 4]);
    }

    #[test]
    fn png_without_exif_is_upright() {
        let png = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(4, 2)));
        let decoded = decode_bytes(png).unwrap();

        assert_eq!(decoded.orientation, Orientation::NoTransforms);
        assert_eq!(decoded.format, Some(ImageFormat::Png));
        assert_eq!((decoded.image.width(), decoded.image.height()), (4, 2));
    }

    #[test]
    fn non_jpeg_sources_are_reencoded() {
        let png = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(8, 8)));
        let decoded = decode_bytes(png.clone()).unwrap();
        let jpeg = decoded.jpeg().unwrap();

        assert_ne!(jpeg, png);
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn upright_jpeg_passes_through() {
        let jpeg = encode_jpeg(&DynamicImage::ImageRgb8(RgbImage::new(8, 8))).unwrap();
        let decoded = decode_bytes(Bytes::from(jpeg.clone())).unwrap();

        assert_eq!(decoded.jpeg().unwrap(), Bytes::from(jpeg));
    }

    #[test]
    fn orientation_swaps_dimensions() {
        let mut img = DynamicImage::ImageRgb8(RgbImage::new(4, 2));
        img.apply_orientation(Orientation::Rotate90);
        let frame = to_frame(&img).unwrap();

        assert_eq!((frame.width(), frame.height()), (2, 4));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(decode_bytes(Bytes::from_static(b"not an image")).is_err());
    }
}

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::FrameError;

/// Frame data with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable pixel rows - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture time, reported as frame age when the frame is sent
    pub timestamp: Instant,

    /// Encoded image served instead of `data` for file-backed frames
    pub encoded: Option<Bytes>,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Bytes per row. Negative for bottom-up producers.
    pub stride: i32,
    pub format: PixelFormat,
}

/// Pixel formats a producer may hand over.
///
/// Channel order in memory is blue first, which is what the colour space
/// labels report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Argb32,
    Unknown,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgb24 => Some(3),
            PixelFormat::Argb32 => Some(4),
            PixelFormat::Unknown => None,
        }
    }

    pub fn color_space(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "BGR",
            PixelFormat::Argb32 => "BGRA",
            PixelFormat::Unknown => "unknown",
        }
    }
}

impl Frame {
    /// Build a tightly packed frame (`stride = width * bytes_per_pixel`).
    pub fn from_pixels(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self, FrameError> {
        let bpp = format.bytes_per_pixel().ok_or(FrameError::UnknownLayout)?;
        let stride = i32::try_from(width as usize * bpp).map_err(|_| FrameError::Stride {
            width,
            stride: i32::MAX,
            bytes_per_pixel: bpp,
        })?;
        Self::with_stride(width, height, stride, format, data)
    }

    /// Build a frame whose rows are `abs(stride)` bytes apart.
    pub fn with_stride(
        width: u32,
        height: u32,
        stride: i32,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self, FrameError> {
        let data = data.into();
        let row = stride.unsigned_abs() as usize;

        if let Some(bpp) = format.bytes_per_pixel() {
            if row < width as usize * bpp {
                return Err(FrameError::Stride {
                    width,
                    stride,
                    bytes_per_pixel: bpp,
                });
            }
        }

        let expected = row * height as usize;
        if data.len() != expected {
            return Err(FrameError::Shape {
                width,
                height,
                stride,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence: 0,
                width,
                height,
                stride,
                format,
            }),
            timestamp: Instant::now(),
            encoded: None,
        })
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        Arc::make_mut(&mut self.meta).sequence = sequence;
        self
    }

    pub fn with_encoded(mut self, encoded: impl Into<Bytes>) -> Self {
        self.encoded = Some(encoded.into());
        self
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    /// Time since capture.
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// Packed size without row padding, if the format has a fixed pixel size.
    pub fn packed_len(&self) -> Option<usize> {
        self.meta
            .format
            .bytes_per_pixel()
            .map(|bpp| self.meta.width as usize * self.meta.height as usize * bpp)
    }

    /// Rows in buffer order, each `abs(stride)` bytes including padding.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let row = (self.meta.stride.unsigned_abs() as usize).max(1);
        self.data.chunks(row)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("bytes", &self.data.len())
            .field("encoded", &self.encoded.as_ref().map(Bytes::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_frame_has_natural_stride() {
        let frame = Frame::from_pixels(2, 1, PixelFormat::Rgb24, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.meta.stride, 6);
        assert_eq!(frame.packed_len(), Some(6));
    }

    #[test]
    fn rejects_wrong_buffer_length() {
        let err = Frame::from_pixels(2, 2, PixelFormat::Argb32, vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            FrameError::Shape {
                width: 2,
                height: 2,
                stride: 8,
                expected: 16,
                actual: 15,
            }
        );
    }

    #[test]
    fn padded_and_bottom_up_strides() {
        let padded = Frame::with_stride(1, 2, 4, PixelFormat::Rgb24, vec![0; 8]).unwrap();
        assert_eq!(padded.rows().count(), 2);
        assert_eq!(padded.packed_len(), Some(6));

        let flipped = Frame::with_stride(1, 2, -4, PixelFormat::Rgb24, vec![0; 8]).unwrap();
        assert_eq!(flipped.data.len(), 8);

        let short = Frame::with_stride(2, 1, 5, PixelFormat::Rgb24, vec![0; 5]);
        assert!(matches!(short, Err(FrameError::Stride { .. })));
    }

    #[test]
    fn unknown_format_needs_explicit_stride() {
        assert_eq!(
            Frame::from_pixels(1, 1, PixelFormat::Unknown, vec![0]).unwrap_err(),
            FrameError::UnknownLayout
        );
        let frame = Frame::with_stride(1, 1, 2, PixelFormat::Unknown, vec![0, 0]).unwrap();
        assert_eq!(frame.packed_len(), None);
        assert_eq!(frame.format().color_space(), "unknown");
    }

    #[test]
    fn color_space_labels() {
        assert_eq!(PixelFormat::Rgb24.color_space(), "BGR");
        assert_eq!(PixelFormat::Argb32.color_space(), "BGRA");
    }

    #[test]
    fn sequence_does_not_touch_shared_copies() {
        let a = Frame::from_pixels(1, 1, PixelFormat::Rgb24, vec![1, 2, 3]).unwrap();
        let b = a.clone().with_sequence(7);
        assert_eq!(a.sequence(), 0);
        assert_eq!(b.sequence(), 7);
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn age_grows_from_capture_and_survives_clones() {
        let frame = Frame::from_pixels(1, 1, PixelFormat::Rgb24, vec![0; 3]).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let copy = frame.clone().with_sequence(1);
        assert!(frame.age() >= Duration::from_millis(5));
        assert_eq!(copy.timestamp, frame.timestamp);
    }
}

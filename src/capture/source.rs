//! Pull-based frame producers

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::decoder;
use super::frame::{Frame, PixelFormat};
use crate::error::SourceError;
use crate::utils;

/// A producer the pump pulls frames from.
///
/// `Ok(None)` means the source is exhausted and the pump should stop.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).next_frame()
    }
}

/// What a file-backed frame is served as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Decoded pixel rows
    #[default]
    Raw,
    /// Orientation-normalized JPEG
    Jpeg,
}

/// Cycles through the images of a directory forever.
pub struct DirectorySource {
    directory: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    sequence: u64,
    encoding: Encoding,
}

impl DirectorySource {
    pub fn open(directory: &Path, encoding: Encoding) -> Result<Self, SourceError> {
        let files = utils::find_images(directory)?;
        if files.is_empty() {
            return Err(SourceError::Empty(directory.to_path_buf()));
        }
        info!(
            "Serving {} images from {} as {:?}",
            files.len(),
            directory.display(),
            encoding
        );

        Ok(Self {
            directory: directory.to_path_buf(),
            files,
            cursor: 0,
            sequence: 0,
            encoding,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    #[instrument(skip(self), fields(dir = %self.directory.display()))]
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let path = &self.files[self.cursor % self.files.len()];
        self.cursor = self.cursor.wrapping_add(1);
        debug!("Loading {}", path.display());

        let decoded = decoder::decode_file(path)?;
        let mut frame = decoder::to_frame(&decoded.image)?;
        if self.encoding == Encoding::Jpeg {
            let jpeg = decoded.jpeg().map_err(|source| SourceError::Decode {
                path: path.clone(),
                source,
            })?;
            frame = frame.with_encoded(jpeg);
        }

        self.sequence += 1;
        Ok(Some(frame.with_sequence(self.sequence)))
    }
}

/// Synthetic BGR frames, each one slightly different from the last.
pub struct PatternSource {
    width: u32,
    height: u32,
    sequence: u64,
}

impl PatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sequence: 0,
        }
    }
}

impl FrameSource for PatternSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        self.sequence += 1;
        let len = self.width as usize * self.height as usize * 3;
        let seed = self.sequence as usize;
        let pixels: Vec<u8> = (0..len).map(|i| (i + seed) as u8).collect();

        let frame = Frame::from_pixels(self.width, self.height, PixelFormat::Rgb24, pixels)?;
        Ok(Some(frame.with_sequence(self.sequence)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        let img = RgbImage::from_pixel(width, height, Rgb([1, 2, 3]));
        DynamicImage::ImageRgb8(img)
            .save_with_format(dir.join(name), ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn directory_source_cycles_in_name_order() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "b.png", 2, 2);
        write_png(dir.path(), "a.png", 1, 1);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = DirectorySource::open(dir.path(), Encoding::Raw).unwrap();
        assert_eq!(source.len(), 2);

        let sizes: Vec<(u32, u64)> = (0..3)
            .map(|_| {
                let frame = source.next_frame().unwrap().unwrap();
                (frame.width(), frame.sequence())
            })
            .collect();
        assert_eq!(sizes, vec![(1, 1), (2, 2), (1, 3)]);
    }

    #[test]
    fn jpeg_encoding_attaches_payload() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "a.png", 4, 4);

        let mut source = DirectorySource::open(dir.path(), Encoding::Jpeg).unwrap();
        let frame = source.next_frame().unwrap().unwrap();
        let jpeg = frame.encoded.expect("jpeg payload");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(frame.data.len(), 4 * 4 * 3);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DirectorySource::open(dir.path(), Encoding::Raw),
            Err(SourceError::Empty(_))
        ));
    }

    #[test]
    fn corrupt_file_fails_but_source_moves_on() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.png"), b"broken").unwrap();
        write_png(dir.path(), "b.png", 1, 1);

        let mut source = DirectorySource::open(dir.path(), Encoding::Raw).unwrap();
        assert!(matches!(source.next_frame(), Err(SourceError::Decode { .. })));
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn pattern_frames_differ() {
        let mut source = PatternSource::new(2, 2);
        let a = source.next_frame().unwrap().unwrap();
        let b = source.next_frame().unwrap().unwrap();
        assert_eq!(a.data.len(), 12);
        assert_ne!(a.data, b.data);
        assert_eq!(b.sequence(), 2);
    }
}

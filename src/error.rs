//! Error types for the bridge.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for setting up and running the bridge.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("frame source error: {0}")]
    Source(#[from] SourceError),
}

/// A frame buffer that does not match its declared shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame buffer holds {actual} bytes, {width}x{height} with stride {stride} needs {expected}")]
    Shape {
        width: u32,
        height: u32,
        stride: i32,
        expected: usize,
        actual: usize,
    },

    #[error("stride {stride} is too short for {width} pixels of {bytes_per_pixel} bytes")]
    Stride {
        width: u32,
        stride: i32,
        bytes_per_pixel: usize,
    },

    #[error("pixel format has no fixed size, an explicit stride is required")]
    UnknownLayout,
}

/// Failures of [`ResultChannel::submit`](crate::pipeline::ResultChannel::submit).
///
/// `TimedOut` and `Cancelled` are recoverable: the producer may submit again.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("another frame is already waiting for its result")]
    Busy,

    #[error("timed out waiting for a result")]
    TimedOut,

    #[error("cancelled by shutdown")]
    Cancelled,
}

impl SubmitError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SubmitError::Cancelled)
    }
}

/// Per-request session failures. None of these end the session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no frame available")]
    NoFrame,
}

/// Failures at the blocking host-process boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("no frame available")]
    NoFrame,

    #[error("current frame has no fixed pixel size")]
    UnsupportedFormat,

    #[error("buffer holds {available} bytes, frame needs {needed}")]
    BufferTooSmall { needed: usize, available: usize },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("no images found in {0}")]
    Empty(PathBuf),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub mod decoder;
pub mod frame;
pub mod source;

pub use frame::Frame;
pub use frame::PixelFormat;
pub use source::{DirectorySource, Encoding, FrameSource, PatternSource};

//! Error type shared by the frame builder, the sinks and configuration.
//!
//! Everything that can go wrong while preparing or drawing a frame ends up
//! here. The HTTP layer maps these onto status codes in `server::ApiError`;
//! the render thread only logs them.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Brightness outside 0..=100
    #[error("brightness must be between 0 and 100, got {0}")]
    InvalidBrightness(i32),
    /// Zero rows, columns, chain length or parallel chains
    #[error("invalid matrix geometry: {0}")]
    InvalidGeometry(String),
    /// A position sequence that isn't exactly `[x, y]`
    #[error("position must be a list of two integers, e.g. [x, y] (got {0} elements)")]
    InvalidPosition(usize),
    /// A coordinate so far off the panel that nothing could ever show
    #[error("coordinate {0} is out of range (limit is ±{limit})", limit = crate::frame::MAX_COORDINATE)]
    CoordinateOutOfRange(i32),
    /// A frame (rectangle or scale target) with no pixels
    #[error("frame size must be non-zero, got {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },
    /// A requested frame side above `frame::MAX_FRAME_SIDE`
    #[error("frame size {width}x{height} is too large (limit is {limit} per side)", limit = crate::frame::MAX_FRAME_SIDE)]
    FrameTooLarge { width: u32, height: u32 },
    /// Asset file or directory does not exist
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Asset path resolving outside the assets directory
    #[error("path is outside the assets directory: {}", .0.display())]
    OutsideAssets(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not load font: {0}")]
    Font(String),
    #[error("LED matrix error: {0}")]
    Matrix(String),
    #[error("API_KEY environment variable not set. Please set it before running the application.")]
    MissingApiKey,
    /// Any other startup option that doesn't make sense
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error was caused by the caller's input rather than the host.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidBrightness(_)
                | Error::InvalidPosition(_)
                | Error::CoordinateOutOfRange(_)
                | Error::EmptyFrame { .. }
                | Error::FrameTooLarge { .. }
                | Error::OutsideAssets(_)
                | Error::Decode(_)
                | Error::Font(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn brightness_message_names_the_range() {
        assert_eq!(
            Error::InvalidBrightness(101).to_string(),
            "brightness must be between 0 and 100, got 101"
        );
    }

    #[test]
    fn io_not_found_keeps_source() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_rejected_input());
    }

    #[test]
    fn position_errors_are_rejected_input() {
        assert!(Error::InvalidPosition(3).is_rejected_input());
        assert!(Error::EmptyFrame { width: 0, height: 4 }.is_rejected_input());
        assert!(Error::CoordinateOutOfRange(i32::MAX).is_rejected_input());
        assert!(
            Error::FrameTooLarge {
                width: u32::MAX,
                height: 1
            }
            .is_rejected_input()
        );
    }

    #[test]
    fn too_large_message_names_the_limit() {
        assert_eq!(
            Error::FrameTooLarge {
                width: 5000,
                height: 10
            }
            .to_string(),
            "frame size 5000x10 is too large (limit is 1024 per side)"
        );
    }
}

//! Frame building: the pixel grids that get pushed to the matrix.
//!
//! A frame is an `image::RgbImage` built fresh for each draw call: an
//! outlined rectangle, a decoded image file, or a decoded image scaled to a
//! square target size.

use crate::{Color, Error, Result};
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};
use serde::Deserialize;
use std::path::Path;

pub type Frame = RgbImage;

/// Largest width or height of a frame built from a request.
pub const MAX_FRAME_SIDE: u32 = 1024;

/// Coordinates further than this from the origin never touch a panel.
pub const MAX_COORDINATE: i32 = 8192;

/// Reject a coordinate that is hopelessly off any panel.
pub fn check_coordinate(value: i32) -> Result<i32> {
    if value.unsigned_abs() > MAX_COORDINATE.unsigned_abs() {
        return Err(Error::CoordinateOutOfRange(value));
    }
    Ok(value)
}

fn check_frame_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::EmptyFrame { width, height });
    }
    if width > MAX_FRAME_SIDE || height > MAX_FRAME_SIDE {
        return Err(Error::FrameTooLarge { width, height });
    }
    Ok(())
}

/// Top-left placement of an image, or the baseline start of a text run.
///
/// Deserializes from a JSON array and rejects anything that isn't exactly
/// two elements long.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<i32>")]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn from_slice(coords: &[i32]) -> Result<Self> {
        match coords {
            [x, y] => Ok(Self::new(*x, *y)),
            _ => Err(Error::InvalidPosition(coords.len())),
        }
    }

    /// The same position, if both coordinates are within `MAX_COORDINATE`.
    pub fn checked(self) -> Result<Self> {
        check_coordinate(self.x)?;
        check_coordinate(self.y)?;
        Ok(self)
    }
}

impl TryFrom<Vec<i32>> for Position {
    type Error = Error;

    fn try_from(coords: Vec<i32>) -> Result<Self> {
        Self::from_slice(&coords)
    }
}

/// A `width × height` frame filled with `fill` and bordered by a one-pixel
/// `outline`.
pub fn rectangle(width: u32, height: u32, fill: Color, outline: Color) -> Result<Frame> {
    check_frame_size(width, height)?;

    let fill: image::Rgb<u8> = fill.into();
    let outline: image::Rgb<u8> = outline.into();
    let frame = RgbImage::from_fn(width, height, |x, y| {
        let on_edge = x == 0 || y == 0 || x == width - 1 || y == height - 1;
        if on_edge { outline } else { fill }
    });
    Ok(frame)
}

/// Decode an image file into a frame at its native size.
pub fn load_image(path: &Path) -> Result<Frame> {
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(img.to_rgb8())
}

/// Decode an image file and scale it to fit within `size × size`.
///
/// Aspect ratio is preserved, so a square source comes out exactly
/// `size × size`.
pub fn load_scaled(path: &Path, size: u32) -> Result<Frame> {
    check_frame_size(size, size)?;
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let scaled = img.resize(size, size, FilterType::Lanczos3).to_rgb8();
    Ok(scaled)
}

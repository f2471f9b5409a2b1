//! The matrix sink: where finished frames go.
//!
//! `MatrixSink` is the small set of operations the render thread needs from
//! a display. The Raspberry Pi implementation lives in `hardware` and wraps
//! `rpi-led-matrix`; `MemorySink` keeps frames in memory so the whole
//! drawing pipeline runs (and is tested) on machines without a panel.

use crate::frame::Frame;
use crate::{Color, Error, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A double-buffered pixel display.
///
/// All drawing goes to the back buffer; `swap` presents it on the next
/// vertical sync. Coordinates outside the panel are ignored.
pub trait MatrixSink {
    /// A loaded bitmap font, as understood by this sink.
    type Font;

    /// Visible `(width, height)` in pixels.
    fn size(&self) -> (i32, i32);

    fn clear(&mut self);

    fn set_pixel(&mut self, x: i32, y: i32, color: Color);

    /// Copy a whole frame with its top-left corner at `(x, y)`, clipped to
    /// the panel.
    fn set_image(&mut self, frame: &Frame, x: i32, y: i32) {
        let (width, height) = self.size();
        for (px, py, pixel) in frame.enumerate_pixels() {
            let tx = x.saturating_add(px as i32);
            let ty = y.saturating_add(py as i32);
            if (0..width).contains(&tx) && (0..height).contains(&ty) {
                self.set_pixel(tx, ty, (*pixel).into());
            }
        }
    }

    fn load_font(&self, path: &Path) -> Result<Self::Font>;

    /// Draw `text` with its baseline starting at `(x, y)` and return the
    /// horizontal advance of the whole run.
    fn draw_text(&mut self, font: &Self::Font, text: &str, x: i32, y: i32, color: Color) -> i32;

    /// Present the back buffer.
    fn swap(&mut self);
}

// ── Frame log ────────────────────────────────────────────────────────

/// Frames presented by a `MemorySink`, shared with whoever wants to look.
///
/// Only the most recent `capacity` frames are retained; `swaps` counts
/// every presentation.
#[derive(Clone)]
pub struct FrameLog {
    inner: Arc<Mutex<FrameLogInner>>,
}

struct FrameLogInner {
    frames: VecDeque<Frame>,
    capacity: usize,
    swaps: u64,
}

impl FrameLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrameLogInner {
                frames: VecDeque::with_capacity(capacity.min(1024)),
                capacity: capacity.max(1),
                swaps: 0,
            })),
        }
    }

    fn push(&self, frame: Frame) {
        let mut inner = self.inner.lock().unwrap();
        if inner.frames.len() == inner.capacity {
            inner.frames.pop_front();
        }
        inner.frames.push_back(frame);
        inner.swaps += 1;
    }

    /// Total number of swaps, including frames no longer retained.
    pub fn swaps(&self) -> u64 {
        self.inner.lock().unwrap().swaps
    }

    pub fn last(&self) -> Option<Frame> {
        self.inner.lock().unwrap().frames.back().cloned()
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.inner.lock().unwrap().frames.iter().cloned().collect()
    }
}

impl Default for FrameLog {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

// ── In-memory sink ───────────────────────────────────────────────────

/// Glyph cells larger than this aren't fonts anyone draws on a panel.
const MAX_CELL: i32 = 256;

/// Glyph cell metrics read from a BDF font's `FONTBOUNDINGBOX`.
///
/// The in-memory sink doesn't rasterize glyphs; it fills one cell per
/// visible character, which is enough to see where text lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellFont {
    pub width: i32,
    pub height: i32,
    pub y_offset: i32,
}

impl CellFont {
    /// Read a `.bdf` file's cell metrics.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let is_bdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("bdf"));
        if !is_bdf {
            return Err(Error::Font(format!("{}: not a .bdf file", path.display())));
        }
        let source = fs::read(path)?;
        Self::parse_bdf(&String::from_utf8_lossy(&source)).map_err(|e| match e {
            Error::Font(msg) => Error::Font(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn parse_bdf(source: &str) -> Result<Self> {
        let line = source
            .lines()
            .find(|l| l.starts_with("FONTBOUNDINGBOX"))
            .ok_or_else(|| Error::Font("missing FONTBOUNDINGBOX".to_string()))?;

        let fields: Vec<i32> = line
            .split_whitespace()
            .skip(1)
            .map(str::parse)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Font(format!("bad FONTBOUNDINGBOX: {e}")))?;

        match fields.as_slice() {
            [width, height, _x_offset, y_offset]
                if (1..=MAX_CELL).contains(width) && (1..=MAX_CELL).contains(height) =>
            {
                Ok(Self {
                    width: *width,
                    height: *height,
                    y_offset: *y_offset,
                })
            }
            _ => Err(Error::Font(format!("bad FONTBOUNDINGBOX: {line}"))),
        }
    }
}

/// A sink that renders into an `RgbImage` and records each swapped frame.
pub struct MemorySink {
    back: Frame,
    log: FrameLog,
}

impl MemorySink {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_log(width, height, FrameLog::default())
    }

    pub fn with_log(width: u32, height: u32, log: FrameLog) -> Self {
        Self {
            back: Frame::new(width, height),
            log,
        }
    }

    pub fn log(&self) -> FrameLog {
        self.log.clone()
    }
}

impl MatrixSink for MemorySink {
    type Font = CellFont;

    fn size(&self) -> (i32, i32) {
        (self.back.width() as i32, self.back.height() as i32)
    }

    fn clear(&mut self) {
        for pixel in self.back.pixels_mut() {
            *pixel = Color::BLACK.into();
        }
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        let (width, height) = self.size();
        if (0..width).contains(&x) && (0..height).contains(&y) {
            self.back.put_pixel(x as u32, y as u32, color.into());
        }
    }

    fn load_font(&self, path: &Path) -> Result<CellFont> {
        CellFont::load(path)
    }

    fn draw_text(&mut self, font: &CellFont, text: &str, x: i32, y: i32, color: Color) -> i32 {
        let top = y.saturating_sub(font.height.saturating_add(font.y_offset));
        let mut advance: i32 = 0;
        for ch in text.chars() {
            if !ch.is_whitespace() {
                let left = x.saturating_add(advance);
                for dy in 0..font.height {
                    for dx in 0..font.width {
                        self.set_pixel(left.saturating_add(dx), top.saturating_add(dy), color);
                    }
                }
            }
            advance = advance.saturating_add(font.width);
        }
        advance
    }

    fn swap(&mut self) {
        self.log.push(self.back.clone());
    }
}

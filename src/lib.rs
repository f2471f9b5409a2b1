//! Drawing service for an RGB LED matrix.
//!
//! This crate provides:
//! - Matrix configuration, validated once at startup
//! - The color type shared by every drawing path
//! - Frame building, the matrix sink abstraction and the render thread
//! - The API-key protected HTTP server that drives it all
//! - Signal handling for clean shutdown

pub mod auth;
pub mod config;
pub mod error;
pub mod frame;
#[cfg(feature = "hardware")]
pub mod hardware;
pub mod media;
pub mod render;
pub mod server;
pub mod sink;

pub use error::{Error, Result};

use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Matrix configuration ───────────────────────────────────────────

/// Geometry and driver options for the LED panel chain.
///
/// Fields are private so a value can only be obtained through `new`, which
/// checks the brightness range and panel geometry. After that the config is
/// immutable and gets cloned into whoever needs it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatrixConfig {
    rows: u32,
    cols: u32,
    brightness: u8,
    chain_length: u32,
    parallel: u32,
    hardware_mapping: String,
    gpio_slowdown: u32,
}

impl MatrixConfig {
    /// Validate brightness (0-100) and panel size.
    pub fn new(rows: u32, cols: u32, brightness: i32) -> Result<Self> {
        if !(0..=100).contains(&brightness) {
            return Err(Error::InvalidBrightness(brightness));
        }
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidGeometry(format!(
                "panel must have at least one row and column, got {rows}x{cols}"
            )));
        }

        Ok(Self {
            rows,
            cols,
            brightness: brightness as u8,
            ..Self::default()
        })
    }

    /// Number of panels daisy-chained per row and number of parallel chains.
    pub fn with_chain(mut self, chain_length: u32, parallel: u32) -> Result<Self> {
        if chain_length == 0 || parallel == 0 {
            return Err(Error::InvalidGeometry(format!(
                "chain length and parallel must be at least 1, got {chain_length} and {parallel}"
            )));
        }
        self.chain_length = chain_length;
        self.parallel = parallel;
        Ok(self)
    }

    pub fn with_hardware_mapping(mut self, mapping: impl Into<String>) -> Self {
        self.hardware_mapping = mapping.into();
        self
    }

    pub fn with_gpio_slowdown(mut self, slowdown: u32) -> Self {
        self.gpio_slowdown = slowdown;
        self
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn chain_length(&self) -> u32 {
        self.chain_length
    }

    pub fn parallel(&self) -> u32 {
        self.parallel
    }

    pub fn hardware_mapping(&self) -> &str {
        &self.hardware_mapping
    }

    pub fn gpio_slowdown(&self) -> u32 {
        self.gpio_slowdown
    }

    /// Visible width in pixels across the whole chain.
    pub fn width(&self) -> u32 {
        self.cols * self.chain_length
    }

    /// Visible height in pixels across all parallel chains.
    pub fn height(&self) -> u32 {
        self.rows * self.parallel
    }
}

impl Default for MatrixConfig {
    /// A single 64x32 panel on the Adafruit RGB Matrix HAT.
    fn default() -> Self {
        Self {
            rows: 32,
            cols: 64,
            brightness: 75,
            chain_length: 1,
            parallel: 1,
            hardware_mapping: "adafruit-hat".to_string(),
            gpio_slowdown: 2,
        }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from the hardware crate.
///
/// Deserializes from a `[r, g, b]` array. At the hardware boundary it
/// converts into `LedColor`, at the frame boundary into `image::Rgb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "(u8, u8, u8)")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const BLUE: Color = Color::new(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl From<(u8, u8, u8)> for Color {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Color> for image::Rgb<u8> {
    fn from(c: Color) -> Self {
        image::Rgb([c.r, c.g, c.b])
    }
}

impl From<image::Rgb<u8>> for Color {
    fn from(p: image::Rgb<u8>) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

/// Convert our Color to the hardware crate's LedColor at the boundary.
#[cfg(feature = "hardware")]
impl From<Color> for rpi_led_matrix::LedColor {
    fn from(c: Color) -> Self {
        rpi_led_matrix::LedColor {
            red: c.r,
            green: c.g,
            blue: c.b,
        }
    }
}

// ── Shutdown signal ────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets the returned flag to false.
pub fn setup_signal_handler() -> std::result::Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Check if the process should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────

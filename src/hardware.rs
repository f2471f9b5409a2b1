//! `MatrixSink` on a real panel via the `rpi-led-matrix` C bindings.
//!
//! The C library is not thread-safe and its handles are not `Send`, so a
//! `LedSink` must be created on the thread that will draw with it (the render
//! thread opens it through the factory passed to `render::spawn`).

use crate::sink::MatrixSink;
use crate::{Color, Error, MatrixConfig, Result};
use rpi_led_matrix::{LedCanvas, LedFont, LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use std::path::Path;

/// Create a matrix from the validated configuration.
///
/// Fails when GPIO is unavailable (not running as root, not on a Pi).
pub fn create_matrix(config: &MatrixConfig) -> Result<LedMatrix> {
    let mut options = LedMatrixOptions::new();
    options.set_rows(config.rows());
    options.set_cols(config.cols());
    options.set_chain_length(config.chain_length());
    options.set_parallel(config.parallel());
    options.set_hardware_mapping(config.hardware_mapping());
    options
        .set_pwm_bits(8) // Full 8-bit color depth
        .map_err(|e| Error::Matrix(e.to_string()))?;
    options.set_pwm_lsb_nanoseconds(130); // Stable timing (~143Hz refresh)
    // The driver's minimum is 1; 0 still means "as dim as it goes"
    options
        .set_brightness(config.brightness().max(1))
        .map_err(|e| Error::Matrix(e.to_string()))?;

    let mut rt_options = LedRuntimeOptions::new();
    rt_options.set_gpio_slowdown(config.gpio_slowdown());

    LedMatrix::new(Some(options), Some(rt_options)).map_err(|e| Error::Matrix(e.to_string()))
}

/// A panel plus the offscreen canvas we draw into between swaps.
pub struct LedSink {
    matrix: LedMatrix,
    // Always Some outside of `swap`, which moves the canvas into the matrix
    // and gets the previous front buffer back.
    canvas: Option<LedCanvas>,
    width: i32,
    height: i32,
}

impl LedSink {
    pub fn open(config: &MatrixConfig) -> Result<Self> {
        let matrix = create_matrix(config)?;
        let canvas = matrix.offscreen_canvas();
        let (width, height) = canvas.canvas_size();
        tracing::info!(
            "LED matrix ready: {}x{} ({} mapping, brightness {})",
            width,
            height,
            config.hardware_mapping(),
            config.brightness()
        );
        Ok(Self {
            matrix,
            canvas: Some(canvas),
            width,
            height,
        })
    }
}

impl MatrixSink for LedSink {
    type Font = LedFont;

    fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.clear();
        }
    }

    fn set_pixel(&mut self, x: i32, y: i32, color: Color) {
        if let Some(canvas) = self.canvas.as_mut() {
            canvas.set(x, y, &color.into());
        }
    }

    fn load_font(&self, path: &Path) -> Result<LedFont> {
        if !path.is_file() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        LedFont::new(path).map_err(|e| Error::Font(format!("{}: {e}", path.display())))
    }

    fn draw_text(&mut self, font: &LedFont, text: &str, x: i32, y: i32, color: Color) -> i32 {
        match self.canvas.as_mut() {
            Some(canvas) => canvas.draw_text(font, text, x, y, &color.into(), 0, false),
            None => 0,
        }
    }

    fn swap(&mut self) {
        if let Some(canvas) = self.canvas.take() {
            self.canvas = Some(self.matrix.swap(canvas));
        }
    }
}

//! Render thread: owns the matrix sink and processes commands via a channel.
//!
//! The LED matrix library is not thread-safe, so all drawing happens on one
//! dedicated thread. HTTP handlers prepare frames and send `RenderCommand`
//! values through an `mpsc` channel; requests are answered as soon as the
//! command is queued, and concurrent requests are drawn one after another.
//!
//! Animations (scrolling image, scrolling text, overlay) run tick by tick:
//! clear, draw static layers, draw the moving layer at the current offset,
//! advance the offset, sleep, swap. Between ticks the channel is polled so a
//! `Stop`, a new draw command, or the channel closing ends the animation.

use crate::frame::{Frame, Position};
use crate::sink::MatrixSink;
use crate::{Color, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// ── Commands ─────────────────────────────────────────────────────────

/// When an animation ends on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCondition {
    After(Duration),
    /// Runs until stopped, replaced, or the process shuts down.
    Forever,
}

impl StopCondition {
    /// `None` means run forever.
    pub fn from_seconds(seconds: Option<u64>) -> Self {
        match seconds {
            Some(s) => Self::After(Duration::from_secs(s)),
            None => Self::Forever,
        }
    }

    fn is_met(&self, started: Instant) -> bool {
        match self {
            Self::After(limit) => started.elapsed() >= *limit,
            Self::Forever => false,
        }
    }
}

/// A line of text drawn with a BDF font, its baseline at row `y`.
#[derive(Clone, Debug)]
pub struct TextLayer {
    pub text: String,
    pub font: PathBuf,
    pub color: Color,
    pub y: i32,
}

/// A prepared drawing sequence. Images are already decoded and scaled.
pub enum DrawCommand {
    Rectangle {
        frame: Frame,
        position: Position,
    },
    Image {
        frame: Frame,
        position: Position,
    },
    ScrollImage {
        frame: Frame,
        y: i32,
        stop: StopCondition,
    },
    ScrollText {
        text: TextLayer,
        stop: StopCondition,
    },
    /// A static image with text scrolling over the rest of the panel.
    Overlay {
        image: Frame,
        position: Position,
        text: TextLayer,
        stop: StopCondition,
    },
}

impl DrawCommand {
    fn describe(&self) -> String {
        match self {
            Self::Rectangle { frame, position } => format!(
                "{}x{} rectangle at ({}, {})",
                frame.width(),
                frame.height(),
                position.x,
                position.y
            ),
            Self::Image { frame, position } => format!(
                "{}x{} image at ({}, {})",
                frame.width(),
                frame.height(),
                position.x,
                position.y
            ),
            Self::ScrollImage { frame, .. } => {
                format!("{}x{} image", frame.width(), frame.height())
            }
            Self::ScrollText { text, .. } | Self::Overlay { text, .. } => text.text.clone(),
        }
    }

    fn display_state(&self) -> DisplayState {
        match self {
            Self::Rectangle { .. } => DisplayState::ShowingRectangle,
            Self::Image { .. } => DisplayState::ShowingImage,
            Self::ScrollImage { .. } => DisplayState::ScrollingImage,
            Self::ScrollText { .. } => DisplayState::ScrollingText,
            Self::Overlay { .. } => DisplayState::Overlay,
        }
    }
}

/// Commands sent from the HTTP server to the render thread.
pub enum RenderCommand {
    Draw(DrawCommand),
    /// Blank the panel
    Clear,
    /// End the current animation and go idle
    Stop,
}

// ── Status ───────────────────────────────────────────────────────────

/// What the display is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Idle,
    ShowingRectangle,
    ShowingImage,
    ScrollingImage,
    ScrollingText,
    Overlay,
}

/// Shared status: the render thread writes, HTTP handlers read.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct DisplayStatus {
    /// Current display state
    pub state: DisplayState,
    /// What is on screen (text being scrolled, image size and position)
    pub current: Option<String>,
    /// Ticks rendered by the running animation
    pub ticks: Option<u64>,
    /// Panel brightness (0-100), fixed at startup
    pub brightness: u8,
    /// Server version
    pub version: String,
}

impl DisplayStatus {
    pub fn new(brightness: u8) -> Self {
        Self {
            state: DisplayState::Idle,
            current: None,
            ticks: None,
            brightness,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn set_idle(&mut self) {
        self.state = DisplayState::Idle;
        self.current = None;
        self.ticks = None;
    }

    fn set_showing(&mut self, state: DisplayState, current: String) {
        self.state = state;
        self.current = Some(current);
        self.ticks = None;
    }
}

// ── Scrolling ────────────────────────────────────────────────────────

/// Horizontal offset of scrolling content.
///
/// Content moves one pixel left per tick. Once its right edge has passed
/// the left boundary the offset jumps back to `start` (normally the panel
/// width, just off the right edge).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollState {
    offset: i32,
    start: i32,
}

impl ScrollState {
    pub fn new(start: i32) -> Self {
        Self {
            offset: start,
            start,
        }
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Move one pixel left, wrapping once `content_width` pixels starting at
    /// the offset are entirely left of column 0.
    pub fn advance(&mut self, content_width: i32) {
        self.offset = self.offset.saturating_sub(1);
        if self.offset.saturating_add(content_width) < 0 {
            self.offset = self.start;
        }
    }
}

// ── Render loop ──────────────────────────────────────────────────────

/// How an animation ended.
enum Outcome {
    Finished,
    Stopped,
    /// A new command arrived and should run next.
    Interrupted(RenderCommand),
    Disconnected,
}

/// Start the render thread.
///
/// `open` runs on the new thread, since hardware sinks can't be moved
/// between threads. If it fails the error is logged and the thread exits,
/// which closes the channel and makes further sends fail.
pub fn spawn<S, F>(
    open: F,
    rx: Receiver<RenderCommand>,
    status: Arc<Mutex<DisplayStatus>>,
    tick: Duration,
) -> JoinHandle<()>
where
    S: MatrixSink,
    F: FnOnce() -> Result<S> + Send + 'static,
{
    thread::spawn(move || {
        let mut sink = match open() {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!("Failed to open matrix: {}", e);
                return;
            }
        };
        render_loop(&mut sink, rx, &status, tick);
    })
}

/// Process commands until the channel closes, then blank the panel.
pub fn render_loop<S: MatrixSink>(
    sink: &mut S,
    rx: Receiver<RenderCommand>,
    status: &Mutex<DisplayStatus>,
    tick: Duration,
) {
    let (width, height) = sink.size();
    tracing::info!(
        "Render thread started ({}x{}, tick {}ms), waiting for commands...",
        width,
        height,
        tick.as_millis()
    );

    // Set when an animation is interrupted by the next command
    let mut pending_cmd: Option<RenderCommand> = None;

    loop {
        let cmd = if let Some(cmd) = pending_cmd.take() {
            cmd
        } else {
            match rx.recv() {
                Ok(cmd) => cmd,
                Err(_) => break,
            }
        };

        match cmd {
            RenderCommand::Clear => blank(sink, status),

            RenderCommand::Stop => {
                status.lock().unwrap().set_idle();
            }

            RenderCommand::Draw(draw) => {
                let description = draw.describe();
                status
                    .lock()
                    .unwrap()
                    .set_showing(draw.display_state(), description.clone());
                tracing::info!("Drawing {}", description);

                let outcome = match draw {
                    DrawCommand::Rectangle { frame, position }
                    | DrawCommand::Image { frame, position } => {
                        sink.clear();
                        sink.set_image(&frame, position.x, position.y);
                        sink.swap();
                        continue;
                    }
                    DrawCommand::ScrollImage { frame, y, stop } => {
                        let mut scroll = ScrollState::new(width);
                        let content_width = frame.width() as i32;
                        animate(sink, &rx, status, tick, stop, |sink| {
                            sink.set_image(&frame, scroll.offset(), y);
                            scroll.advance(content_width);
                        })
                    }
                    DrawCommand::ScrollText { text, stop } => {
                        let font = match sink.load_font(&text.font) {
                            Ok(f) => f,
                            Err(e) => {
                                tracing::error!("{}", e);
                                blank(sink, status);
                                continue;
                            }
                        };
                        let mut scroll = ScrollState::new(width);
                        animate(sink, &rx, status, tick, stop, |sink| {
                            let len = sink.draw_text(
                                &font,
                                &text.text,
                                scroll.offset(),
                                text.y,
                                text.color,
                            );
                            scroll.advance(len);
                        })
                    }
                    DrawCommand::Overlay {
                        image,
                        position,
                        text,
                        stop,
                    } => {
                        let font = match sink.load_font(&text.font) {
                            Ok(f) => f,
                            Err(e) => {
                                tracing::error!("{}", e);
                                blank(sink, status);
                                continue;
                            }
                        };
                        let mut scroll = ScrollState::new(width);
                        animate(sink, &rx, status, tick, stop, |sink| {
                            sink.set_image(&image, position.x, position.y);
                            let len = sink.draw_text(
                                &font,
                                &text.text,
                                scroll.offset(),
                                text.y,
                                text.color,
                            );
                            scroll.advance(len);
                        })
                    }
                };

                match outcome {
                    Outcome::Interrupted(next) => pending_cmd = Some(next),
                    Outcome::Finished | Outcome::Stopped => {
                        blank(sink, status);
                        tracing::info!("Animation finished");
                    }
                    Outcome::Disconnected => break,
                }
            }
        }
    }

    tracing::info!("Render thread: channel closed, shutting down.");
    blank(sink, status);
}

/// Present an empty frame and report idle.
fn blank<S: MatrixSink>(sink: &mut S, status: &Mutex<DisplayStatus>) {
    sink.clear();
    sink.swap();
    status.lock().unwrap().set_idle();
}

/// Run one animation until its stop condition, a new command, or shutdown.
///
/// `draw_tick` renders the layers for the current offset into the cleared
/// back buffer and advances the scroll state.
fn animate<S: MatrixSink>(
    sink: &mut S,
    rx: &Receiver<RenderCommand>,
    status: &Mutex<DisplayStatus>,
    tick: Duration,
    stop: StopCondition,
    mut draw_tick: impl FnMut(&mut S),
) -> Outcome {
    let started = Instant::now();
    let mut ticks: u64 = 0;

    loop {
        match rx.try_recv() {
            Ok(RenderCommand::Stop) => return Outcome::Stopped,
            Ok(cmd) => return Outcome::Interrupted(cmd),
            Err(TryRecvError::Disconnected) => return Outcome::Disconnected,
            Err(TryRecvError::Empty) => {}
        }

        if stop.is_met(started) {
            return Outcome::Finished;
        }

        sink.clear();
        draw_tick(sink);
        thread::sleep(tick);
        sink.swap();

        ticks += 1;
        status.lock().unwrap().ticks = Some(ticks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FrameLog, MemorySink};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::mpsc::{self, Sender};
    use tempfile::TempDir;

    const BDF: &str = "STARTFONT 2.1\nFONTBOUNDINGBOX 5 8 0 -1\nCHARS 0\nENDFONT\n";

    // ── ScrollState ────────────────────────────────────────────────

    #[test]
    fn scroll_starts_off_screen() {
        assert_eq!(ScrollState::new(64).offset(), 64);
    }

    #[test]
    fn scroll_wraps_once_content_has_left() {
        let mut scroll = ScrollState::new(10);
        // 10 → -4 takes 14 ticks; content [-4, 0) is just off-screen
        for _ in 0..14 {
            scroll.advance(4);
        }
        assert_eq!(scroll.offset(), -4);
        scroll.advance(4);
        assert_eq!(scroll.offset(), 10);
    }

    #[rstest]
    #[case(64, 0)]
    #[case(64, 1)]
    #[case(64, 20)]
    #[case(32, 150)]
    #[case(128, 7)]
    fn scroll_never_drifts_past_wrap_threshold(#[case] start: i32, #[case] width: i32) {
        let mut scroll = ScrollState::new(start);
        let mut wraps = 0;
        for _ in 0..1000 {
            let before = scroll.offset();
            scroll.advance(width);
            assert!(scroll.offset() >= -width, "offset {} past -{}", scroll.offset(), width);
            assert!(scroll.offset() <= start);
            if scroll.offset() > before {
                wraps += 1;
                assert_eq!(scroll.offset(), start);
            }
        }
        // one full cycle is start + width + 1 ticks
        assert_eq!(wraps, 1000 / (start + width + 1));
    }

    // ── StopCondition ──────────────────────────────────────────────

    #[test]
    fn stop_condition_from_seconds() {
        assert_eq!(
            StopCondition::from_seconds(Some(10)),
            StopCondition::After(Duration::from_secs(10))
        );
        assert_eq!(StopCondition::from_seconds(None), StopCondition::Forever);
    }

    #[test]
    fn forever_is_never_met() {
        let long_ago = Instant::now() - Duration::from_secs(3600);
        assert!(!StopCondition::Forever.is_met(long_ago));
        assert!(StopCondition::After(Duration::from_secs(1)).is_met(long_ago));
    }

    // ── Render thread ──────────────────────────────────────────────

    struct Harness {
        tx: Sender<RenderCommand>,
        status: Arc<Mutex<DisplayStatus>>,
        log: FrameLog,
        handle: JoinHandle<()>,
        fonts: TempDir,
    }

    fn start(width: u32, height: u32) -> Harness {
        let (tx, rx) = mpsc::channel();
        let status = Arc::new(Mutex::new(DisplayStatus::new(75)));
        let log = FrameLog::with_capacity(10_000);
        let sink_log = log.clone();
        let handle = spawn(
            move || Ok(MemorySink::with_log(width, height, sink_log)),
            rx,
            status.clone(),
            Duration::from_millis(1),
        );

        let fonts = TempDir::new().unwrap();
        std::fs::write(fonts.path().join("5x8.bdf"), BDF).unwrap();

        Harness {
            tx,
            status,
            log,
            handle,
            fonts,
        }
    }

    impl Harness {
        fn text(&self, text: &str) -> TextLayer {
            TextLayer {
                text: text.to_string(),
                font: self.fonts.path().join("5x8.bdf"),
                color: Color::WHITE,
                y: 10,
            }
        }

        fn send(&self, cmd: RenderCommand) {
            self.tx.send(cmd).unwrap();
        }

        fn state(&self) -> DisplayState {
            self.status.lock().unwrap().state
        }

        fn wait_until(&self, what: &str, cond: impl Fn(&Self) -> bool) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !cond(self) {
                assert!(Instant::now() < deadline, "timed out waiting for {what}");
                thread::sleep(Duration::from_millis(2));
            }
        }

        fn shutdown(self) -> FrameLog {
            drop(self.tx);
            self.handle.join().unwrap();
            self.log
        }
    }

    fn lit(frame: &Frame) -> usize {
        frame.pixels().filter(|p| p.0 != [0, 0, 0]).count()
    }

    #[test]
    fn rectangle_is_drawn_at_position() {
        let h = start(16, 8);
        let frame = crate::frame::rectangle(4, 3, Color::BLACK, Color::BLUE).unwrap();
        h.send(RenderCommand::Draw(DrawCommand::Rectangle {
            frame,
            position: Position::new(2, 1),
        }));
        h.wait_until("first swap", |h| h.log.swaps() >= 1);
        assert_eq!(h.state(), DisplayState::ShowingRectangle);

        let log = h.shutdown();
        let shown = &log.frames()[0];
        assert_eq!(*shown.get_pixel(2, 1), image::Rgb([0, 0, 255]));
        assert_eq!(*shown.get_pixel(5, 3), image::Rgb([0, 0, 255]));
        assert_eq!(*shown.get_pixel(3, 2), image::Rgb([0, 0, 0]));
        assert_eq!(*shown.get_pixel(0, 0), image::Rgb([0, 0, 0]));
        assert_eq!(lit(shown), 10);
    }

    #[test]
    fn shutdown_blanks_the_panel() {
        let h = start(8, 8);
        let frame = Frame::from_pixel(8, 8, image::Rgb([1, 2, 3]));
        h.send(RenderCommand::Draw(DrawCommand::Image {
            frame,
            position: Position::default(),
        }));
        h.wait_until("image", |h| h.log.swaps() >= 1);

        let log = h.shutdown();
        assert_eq!(lit(&log.last().unwrap()), 0);
    }

    #[test]
    fn timed_text_scroll_ends_idle_and_blank() {
        let h = start(32, 16);
        h.send(RenderCommand::Draw(DrawCommand::ScrollText {
            text: h.text("Hi"),
            stop: StopCondition::After(Duration::from_millis(40)),
        }));
        h.wait_until("scrolling to finish", |h| {
            h.log.swaps() > 1 && h.state() == DisplayState::Idle
        });

        let frames = h.log.frames();
        assert!(frames.iter().any(|f| lit(f) > 0));
        assert_eq!(lit(frames.last().unwrap()), 0);
        h.shutdown();
    }

    #[test]
    fn scrolling_text_moves_left_each_tick() {
        let h = start(32, 16);
        h.send(RenderCommand::Draw(DrawCommand::ScrollText {
            text: h.text("A"),
            stop: StopCondition::Forever,
        }));
        h.wait_until("a few ticks", |h| h.log.swaps() >= 6);
        h.send(RenderCommand::Stop);
        h.wait_until("stop", |h| h.state() == DisplayState::Idle);

        // first tick draws at x=32 (off-screen), then 31, 30, ...
        let frames = h.log.frames();
        let leftmost = |f: &Frame| {
            f.enumerate_pixels()
                .filter(|(_, _, p)| p.0 != [0, 0, 0])
                .map(|(x, _, _)| x)
                .min()
        };
        assert_eq!(leftmost(&frames[0]), None);
        assert_eq!(leftmost(&frames[1]), Some(31));
        assert_eq!(leftmost(&frames[2]), Some(30));
        h.shutdown();
    }

    #[test]
    fn stop_interrupts_forever_animation() {
        let h = start(16, 8);
        h.send(RenderCommand::Draw(DrawCommand::ScrollText {
            text: h.text("forever"),
            stop: StopCondition::Forever,
        }));
        h.wait_until("animation to run", |h| h.log.swaps() >= 5);
        assert_eq!(h.state(), DisplayState::ScrollingText);
        assert!(h.status.lock().unwrap().ticks.unwrap_or(0) >= 1);

        h.send(RenderCommand::Stop);
        h.wait_until("idle", |h| h.state() == DisplayState::Idle);
        let log = h.shutdown();
        assert_eq!(lit(&log.last().unwrap()), 0);
    }

    #[test]
    fn new_command_replaces_running_animation() {
        let h = start(16, 8);
        let logo = Frame::from_pixel(4, 4, image::Rgb([0, 255, 0]));
        h.send(RenderCommand::Draw(DrawCommand::Overlay {
            image: logo,
            position: Position::new(0, 0),
            text: h.text("overlay"),
            stop: StopCondition::Forever,
        }));
        h.wait_until("overlay", |h| h.log.swaps() >= 3);
        assert_eq!(h.state(), DisplayState::Overlay);

        // the logo stays put on every tick
        for frame in h.log.frames() {
            assert_eq!(*frame.get_pixel(1, 1), image::Rgb([0, 255, 0]));
        }

        let rect = crate::frame::rectangle(2, 2, Color::WHITE, Color::WHITE).unwrap();
        h.send(RenderCommand::Draw(DrawCommand::Rectangle {
            frame: rect,
            position: Position::new(10, 0),
        }));
        h.wait_until("rectangle", |h| h.state() == DisplayState::ShowingRectangle);
        h.shutdown();
    }

    #[test]
    fn scroll_image_runs_and_stops() {
        let h = start(16, 8);
        h.send(RenderCommand::Draw(DrawCommand::ScrollImage {
            frame: Frame::from_pixel(3, 3, image::Rgb([255, 0, 0])),
            y: 2,
            stop: StopCondition::After(Duration::from_millis(30)),
        }));
        h.wait_until("image scroll", |h| {
            h.log.swaps() > 1 && h.state() == DisplayState::Idle
        });
        assert!(h.log.frames().iter().any(|f| lit(f) > 0));
        h.shutdown();
    }

    #[test]
    fn missing_font_leaves_display_idle() {
        let h = start(16, 8);
        let mut text = h.text("nope");
        text.font = h.fonts.path().join("missing.bdf");
        h.send(RenderCommand::Draw(DrawCommand::ScrollText {
            text,
            stop: StopCondition::Forever,
        }));
        h.send(RenderCommand::Clear);
        h.wait_until("clear", |h| h.log.swaps() >= 1);
        assert_eq!(h.state(), DisplayState::Idle);
        h.shutdown();
    }

    #[test]
    fn unreadable_font_blanks_a_running_animation() {
        let h = start(16, 8);
        h.send(RenderCommand::Draw(DrawCommand::ScrollImage {
            frame: Frame::from_pixel(16, 8, image::Rgb([255, 0, 0])),
            y: 0,
            stop: StopCondition::Forever,
        }));
        h.wait_until("image on screen", |h| {
            h.log.last().is_some_and(|f| lit(&f) > 0)
        });

        let junk = h.fonts.path().join("junk.bdf");
        std::fs::write(&junk, "not a font").unwrap();
        let mut text = h.text("never shown");
        text.font = junk;
        h.send(RenderCommand::Draw(DrawCommand::ScrollText {
            text,
            stop: StopCondition::Forever,
        }));
        h.wait_until("idle", |h| h.state() == DisplayState::Idle);

        assert_eq!(lit(&h.log.last().unwrap()), 0);
        h.shutdown();
    }

    #[test]
    fn extreme_position_does_not_kill_the_thread() {
        let h = start(8, 8);
        let frame = crate::frame::rectangle(2, 2, Color::WHITE, Color::WHITE).unwrap();
        h.send(RenderCommand::Draw(DrawCommand::Rectangle {
            frame: frame.clone(),
            position: Position::new(i32::MAX, 0),
        }));
        h.send(RenderCommand::Draw(DrawCommand::ScrollImage {
            frame,
            y: i32::MIN,
            stop: StopCondition::After(Duration::from_millis(5)),
        }));
        h.wait_until("scroll to finish", |h| {
            h.log.swaps() > 1 && h.state() == DisplayState::Idle
        });

        h.send(RenderCommand::Clear);
        let swaps = h.log.swaps();
        h.wait_until("clear", |h| h.log.swaps() > swaps);
        let log = h.shutdown();
        assert!(log.frames().iter().all(|f| lit(f) == 0));
    }

    #[test]
    fn sink_open_failure_closes_channel() {
        let (tx, rx) = mpsc::channel();
        let status = Arc::new(Mutex::new(DisplayStatus::new(75)));
        let handle = spawn::<MemorySink, _>(
            || Err(crate::Error::Matrix("no GPIO".to_string())),
            rx,
            status,
            Duration::from_millis(1),
        );
        handle.join().unwrap();
        assert!(tx.send(RenderCommand::Clear).is_err());
    }
}

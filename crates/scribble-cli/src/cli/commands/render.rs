//! Streamed stdout/stderr rendering of exchange events.
//!
//! # Output contract
//! - Reply text (fragments, doodle captions, apologies) goes to stdout
//! - The in-progress affordance and error kinds go to stderr
//! - On a terminal the affordance is erased once the reply settles

use std::io::{IsTerminal, Stderr, Stdout, Write, stderr, stdout};

use scribble_core::exchange::{ExchangeEvent, ExchangeEventReceiver, IN_PROGRESS_TEXT};
use tokio::task::JoinHandle;

/// Erases the current terminal line.
const CLEAR_LINE: &str = "\r\x1b[2K";

/// Writes exchange events to a pair of output streams.
pub struct ExchangeRenderer<O: Write, E: Write> {
    out: O,
    err: E,
    /// Whether the affordance can be erased in place.
    interactive: bool,
    /// Whether the affordance is currently on screen.
    showing_progress: bool,
    /// Whether any reply text has been printed.
    streamed: bool,
}

impl Default for ExchangeRenderer<Stdout, Stderr> {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeRenderer<Stdout, Stderr> {
    pub fn new() -> Self {
        let err = stderr();
        let interactive = err.is_terminal();
        Self::with_writers(stdout(), err, interactive)
    }
}

impl<O: Write, E: Write> ExchangeRenderer<O, E> {
    pub fn with_writers(out: O, err: E, interactive: bool) -> Self {
        Self {
            out,
            err,
            interactive,
            showing_progress: false,
            streamed: false,
        }
    }

    pub fn handle_event(&mut self, event: ExchangeEvent) {
        match event {
            ExchangeEvent::Started { .. } => {
                self.streamed = false;
                if self.interactive {
                    let _ = write!(self.err, "{IN_PROGRESS_TEXT}");
                    let _ = self.err.flush();
                    self.showing_progress = true;
                } else {
                    let _ = writeln!(self.err, "{IN_PROGRESS_TEXT}");
                }
            }
            ExchangeEvent::Fragment { text } => {
                self.clear_progress();
                if !text.is_empty() {
                    let _ = write!(self.out, "{text}");
                    let _ = self.out.flush();
                    self.streamed = true;
                }
            }
            ExchangeEvent::Completed { text, image } => {
                self.clear_progress();
                // Doodle replies arrive whole
                if !self.streamed && !text.is_empty() {
                    let _ = write!(self.out, "{text}");
                    self.streamed = true;
                }
                if let Some(image) = image {
                    self.finish_line();
                    let _ = writeln!(
                        self.err,
                        "[doodle: {}, {} base64 bytes]",
                        image.mime_type,
                        image.data.len()
                    );
                }
                self.finish_line();
            }
            ExchangeEvent::Failed { kind, message } => {
                self.clear_progress();
                self.finish_line();
                let _ = writeln!(self.err, "Error [{kind}]");
                let _ = writeln!(self.out, "{message}");
                let _ = self.out.flush();
            }
        }
    }

    /// Whether the affordance is currently shown.
    pub fn is_showing_progress(&self) -> bool {
        self.showing_progress
    }

    fn clear_progress(&mut self) {
        if self.showing_progress {
            let _ = write!(self.err, "{CLEAR_LINE}");
            let _ = self.err.flush();
            self.showing_progress = false;
        }
    }

    /// Prints a final newline to stdout if reply text is pending one.
    pub fn finish_line(&mut self) {
        if self.streamed {
            let _ = writeln!(self.out);
            let _ = self.out.flush();
            self.streamed = false;
        }
    }

    /// Clears any leftover affordance and ends the reply line.
    pub fn finish(&mut self) {
        self.clear_progress();
        self.finish_line();
    }
}

/// Spawns a renderer task that consumes events until the channel closes.
pub fn spawn_renderer_task(mut rx: ExchangeEventReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut renderer = ExchangeRenderer::new();

        while let Some(event) = rx.recv().await {
            renderer.handle_event(event);
        }

        renderer.finish();
    })
}

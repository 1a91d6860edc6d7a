//! Console sink
//!
//! Rendering happens outside the writer lock; only the final write is
//! serialized, so concurrent callers never interleave inside a line.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crossterm::cursor::MoveToColumn;
use crossterm::terminal::{Clear, ClearType};
use crossterm::tty::IsTty;

use crate::config::{ColorMode, ConsoleStream};
use crate::error::SinkWriteError;
use crate::record::{Level, LogRecord};
use crate::render::Render;

use super::Sink;

/// In-memory stand-in for a terminal
///
/// Cloning shares the same underlying bytes.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        self.bytes
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut bytes) = self.bytes.lock() {
            bytes.clear();
        }
    }

    fn append(&self, data: &[u8]) -> io::Result<()> {
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "capture buffer poisoned"))?;
        bytes.extend_from_slice(data);
        Ok(())
    }
}

/// Where console output goes
#[derive(Debug, Clone)]
pub enum ConsoleTarget {
    Stderr,
    Stdout,
    Capture(CaptureBuffer),
}

impl From<ConsoleStream> for ConsoleTarget {
    fn from(stream: ConsoleStream) -> Self {
        match stream {
            ConsoleStream::Stderr => ConsoleTarget::Stderr,
            ConsoleStream::Stdout => ConsoleTarget::Stdout,
        }
    }
}

impl ConsoleTarget {
    /// Whether the target is an interactive terminal
    pub fn is_terminal(&self) -> bool {
        match self {
            ConsoleTarget::Stderr => io::stderr().is_tty(),
            ConsoleTarget::Stdout => io::stdout().is_tty(),
            ConsoleTarget::Capture(_) => false,
        }
    }

    /// Resolve a [`ColorMode`] for this target
    ///
    /// `Auto` colors only interactive terminals and honors `NO_COLOR`.
    pub fn color_enabled(&self, mode: ColorMode) -> bool {
        match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => {
                let no_color = std::env::var_os("NO_COLOR").map_or(false, |v| !v.is_empty());
                !no_color && self.is_terminal()
            }
        }
    }

    fn write_all(&self, data: &[u8]) -> io::Result<()> {
        match self {
            ConsoleTarget::Stderr => {
                let mut err = io::stderr().lock();
                err.write_all(data)?;
                err.flush()
            }
            ConsoleTarget::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(data)?;
                out.flush()
            }
            ConsoleTarget::Capture(buffer) => buffer.append(data),
        }
    }
}

/// Writer state guarded by the sink's lock
struct ConsoleState {
    target: ConsoleTarget,
    /// Status line currently drawn below the last record
    status: Option<String>,
}

/// Sink that renders records for a terminal
pub struct ConsoleSink {
    name: String,
    min_level: Level,
    state: Mutex<ConsoleState>,
    renderer: Arc<dyn Render>,
    color_enabled: bool,
    interactive: bool,
}

impl ConsoleSink {
    pub fn new(
        name: &str,
        min_level: Level,
        target: ConsoleTarget,
        renderer: Arc<dyn Render>,
        color_enabled: bool,
    ) -> Self {
        let interactive = target.is_terminal();
        Self {
            name: name.to_string(),
            min_level,
            state: Mutex::new(ConsoleState {
                target,
                status: None,
            }),
            renderer,
            color_enabled,
            interactive,
        }
    }

    /// Treat the target as an interactive terminal (or not) regardless of
    /// detection; decides whether status lines are drawn
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn color_enabled(&self) -> bool {
        self.color_enabled
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ConsoleState>, SinkWriteError> {
        self.state
            .lock()
            .map_err(|_| SinkWriteError::internal(&self.name, "console lock poisoned"))
    }

    fn write_text(&self, text: String) -> Result<(), SinkWriteError> {
        let mut out = Vec::with_capacity(text.len() + 16);
        let state = self.lock()?;
        // A drawn status line is lifted above the new text and redrawn
        if state.status.is_some() {
            clear_line(&mut out).map_err(|e| SinkWriteError::io(&self.name, &e))?;
        }
        out.extend_from_slice(text.as_bytes());
        if !text.ends_with('\n') {
            out.push(b'\n');
        }
        if let Some(status) = &state.status {
            out.extend_from_slice(status.as_bytes());
        }
        state
            .target
            .write_all(&out)
            .map_err(|e| SinkWriteError::io(&self.name, &e))
    }
}

/// Return to column 0 and erase the current line
fn clear_line(out: &mut Vec<u8>) -> io::Result<()> {
    crossterm::queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkWriteError> {
        let text = self.renderer.render(record, self.color_enabled);
        self.write_text(text)
    }

    fn display(&self, text: &str) -> Result<(), SinkWriteError> {
        self.write_text(text.to_string())
    }

    fn status(&self, line: Option<&str>) -> Result<(), SinkWriteError> {
        if !self.interactive {
            return Ok(());
        }
        let mut state = self.lock()?;
        if line.is_none() && state.status.is_none() {
            return Ok(());
        }
        let mut out = Vec::new();
        clear_line(&mut out).map_err(|e| SinkWriteError::io(&self.name, &e))?;
        if let Some(line) = line {
            out.extend_from_slice(line.as_bytes());
        }
        state.status = line.map(str::to_string);
        state
            .target
            .write_all(&out)
            .map_err(|e| SinkWriteError::io(&self.name, &e))
    }
}

//! Log destinations
//!
//! A [`SinkConfig`] describes one destination; [`SinkBuilder`] validates a
//! whole list of them and activates all or none. Active sinks are wrapped in
//! [`SinkHandle`]s, which isolate failures so a broken sink can never take
//! the host application down with it.

mod buffer;
mod console;
mod file;
mod rotation;

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use buffer::{BufferSink, LogBuffer};
pub use console::{CaptureBuffer, ConsoleSink, ConsoleTarget};
pub use file::FileSink;
pub use rotation::{archive_path, list_archives};

use crate::config::{ColorMode, FileFormat};
use crate::error::{InvalidSinkConfigError, LoggerError, SinkWriteError};
use crate::paths::LogDirectory;
use crate::record::{Level, LogRecord};
use crate::render::{validate_time_format, ConsoleRenderer, Render, Template};

/// A destination for log records
///
/// Implementations must be safe to call from many threads at once.
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Records below this level are never passed to [`Sink::emit`]
    fn min_level(&self) -> Level;

    fn emit(&self, record: &LogRecord) -> Result<(), SinkWriteError>;

    fn flush(&self) -> Result<(), SinkWriteError> {
        Ok(())
    }

    /// Release resources; later emits may fail
    fn close(&self) -> Result<(), SinkWriteError> {
        self.flush()
    }

    /// Show free-form text such as a panel; ignored by non-console sinks
    fn display(&self, _text: &str) -> Result<(), SinkWriteError> {
        Ok(())
    }

    /// Draw a transient status line in place, or clear it with `None`
    ///
    /// Used for progress output. Only interactive consoles draw it.
    fn status(&self, _line: Option<&str>) -> Result<(), SinkWriteError> {
        Ok(())
    }
}

/// When and how a file sink rotates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate before the active file would exceed this many bytes
    pub max_bytes: u64,
    /// Rotate once the active file is this old
    pub max_age: Option<Duration>,
    /// Archived files to keep
    pub keep: usize,
    /// Delete archives older than this
    pub retention: Option<Duration>,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: crate::config::DEFAULT_ROTATION_SIZE,
            max_age: None,
            keep: crate::config::DEFAULT_ROTATION_COUNT,
            retention: None,
        }
    }
}

/// Kind-specific sink settings
#[derive(Debug, Clone)]
pub enum SinkKind {
    Console {
        color: ColorMode,
        target: ConsoleTarget,
        time_format: String,
    },
    File {
        /// Plain file name inside the log directory
        file_name: String,
        format: FileFormat,
        rotation: RotationPolicy,
    },
    Buffer {
        buffer: Arc<LogBuffer>,
    },
}

impl SinkKind {
    fn label(&self) -> &'static str {
        match self {
            SinkKind::Console { .. } => "console",
            SinkKind::File { .. } => "file",
            SinkKind::Buffer { .. } => "buffer",
        }
    }
}

/// Description of one destination
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Unique name, used in error reports
    pub name: String,
    pub min_level: Level,
    /// Line template (console and text files only)
    pub format: Option<String>,
    pub kind: SinkKind,
}

impl SinkConfig {
    pub fn console(color: ColorMode, target: ConsoleTarget) -> Self {
        Self {
            name: "console".to_string(),
            min_level: Level::Info,
            format: None,
            kind: SinkKind::Console {
                color,
                target,
                time_format: crate::config::DEFAULT_CONSOLE_TIME_FORMAT.to_string(),
            },
        }
    }

    pub fn file(file_name: impl Into<String>, format: FileFormat, rotation: RotationPolicy) -> Self {
        Self {
            name: "file".to_string(),
            min_level: Level::Info,
            format: None,
            kind: SinkKind::File {
                file_name: file_name.into(),
                format,
                rotation,
            },
        }
    }

    pub fn buffer(buffer: Arc<LogBuffer>) -> Self {
        Self {
            name: "buffer".to_string(),
            min_level: Level::Info,
            format: None,
            kind: SinkKind::Buffer { buffer },
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn template(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Console timestamp format; ignored by other kinds
    pub fn time_format(mut self, format: impl Into<String>) -> Self {
        if let SinkKind::Console { time_format, .. } = &mut self.kind {
            *time_format = format.into();
        }
        self
    }

    /// Check this config on its own
    pub fn validate(&self, dir: Option<&LogDirectory>) -> Result<(), InvalidSinkConfigError> {
        let invalid = |field, reason: &str| Err(InvalidSinkConfigError::new(&self.name, field, reason));

        if self.name.trim().is_empty() {
            return invalid("name", "must not be empty");
        }

        if let Some(format) = &self.format {
            let applies = match &self.kind {
                SinkKind::Console { .. } => true,
                SinkKind::File { format, .. } => *format == FileFormat::Text,
                SinkKind::Buffer { .. } => false,
            };
            if !applies {
                return invalid(
                    "format",
                    &format!(
                        "is not supported by this {} sink (console and text file sinks only)",
                        self.kind.label()
                    ),
                );
            }
            if let Err(reason) = Template::parse(format) {
                return invalid("format", &reason);
            }
        }

        match &self.kind {
            SinkKind::Console { time_format, .. } => {
                if let Err(reason) = validate_time_format(time_format) {
                    return invalid("time_format", &reason);
                }
            }
            SinkKind::File {
                file_name,
                rotation,
                ..
            } => {
                if dir.is_none() {
                    return invalid("directory", "requires a resolved log directory");
                }
                let plain = !file_name.is_empty()
                    && file_name != "."
                    && file_name != ".."
                    && !file_name.contains(['/', '\\']);
                if !plain {
                    return invalid("file_name", "must be a plain file name");
                }
                if rotation.max_bytes == 0 {
                    return invalid("rotation_size", "must be positive");
                }
                if rotation.max_age.map_or(false, |age| age.is_zero()) {
                    return invalid("rotation_age", "must be positive");
                }
                if rotation.retention.map_or(false, |age| age.is_zero()) {
                    return invalid("retention", "must be positive");
                }
            }
            SinkKind::Buffer { buffer } => {
                if buffer.capacity() == 0 {
                    return invalid("capacity", "must be positive");
                }
            }
        }
        Ok(())
    }
}

/// An active sink plus its failure bookkeeping
pub struct SinkHandle {
    sink: Arc<dyn Sink>,
    /// Host-supplied sinks are only flushed by `close`
    owned: bool,
    failing: AtomicBool,
    failures: AtomicU64,
    closed: AtomicBool,
}

impl SinkHandle {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self::wrap(sink, true)
    }

    /// Wrap a sink whose lifetime is managed elsewhere
    pub fn borrowed(sink: Arc<dyn Sink>) -> Self {
        Self::wrap(sink, false)
    }

    fn wrap(sink: Arc<dyn Sink>, owned: bool) -> Self {
        Self {
            sink,
            owned,
            failing: AtomicBool::new(false),
            failures: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        self.sink.name()
    }

    pub fn min_level(&self) -> Level {
        self.sink.min_level()
    }

    /// Whether a record at `level` should reach this sink
    pub fn accepts(&self, level: Level) -> bool {
        !self.closed.load(Ordering::Acquire) && level >= self.sink.min_level()
    }

    /// False while the sink is in a failure streak
    pub fn is_healthy(&self) -> bool {
        !self.failing.load(Ordering::Acquire) && !self.closed.load(Ordering::Acquire)
    }

    /// Total failed writes since activation
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliver a record
    ///
    /// Never panics and never returns an error to the log call site. The
    /// returned error is `Some` only for the first failure of a streak, so the
    /// caller reports each outage once.
    pub fn emit(&self, record: &LogRecord) -> Option<SinkWriteError> {
        if !self.accepts(record.level) {
            return None;
        }
        let result = guarded(self.sink.name(), || self.sink.emit(record));
        self.track(result)
    }

    /// Deliver display-only text (see [`Sink::display`])
    pub fn display(&self, text: &str) -> Option<SinkWriteError> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let result = guarded(self.sink.name(), || self.sink.display(text));
        self.track(result)
    }

    /// Update the transient status line (see [`Sink::status`])
    pub fn status(&self, line: Option<&str>) -> Option<SinkWriteError> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let result = guarded(self.sink.name(), || self.sink.status(line));
        self.track(result)
    }

    pub fn flush(&self) -> Option<SinkWriteError> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let result = guarded(self.sink.name(), || self.sink.flush());
        self.track(result)
    }

    /// Close the sink; a second call does nothing
    pub fn close(&self) -> Result<(), SinkWriteError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sink = &self.sink;
        if self.owned {
            guarded(sink.name(), || sink.close())
        } else {
            guarded(sink.name(), || sink.flush())
        }
    }

    fn track(&self, result: Result<(), SinkWriteError>) -> Option<SinkWriteError> {
        match result {
            Ok(()) => {
                self.failing.store(false, Ordering::Release);
                None
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                if self.failing.swap(true, Ordering::AcqRel) {
                    None
                } else {
                    Some(e)
                }
            }
        }
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("name", &self.sink.name())
            .field("min_level", &self.sink.min_level())
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

/// Run a sink call, turning panics into write errors
fn guarded<F>(name: &str, f: F) -> Result<(), SinkWriteError>
where
    F: FnOnce() -> Result<(), SinkWriteError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "sink panicked".to_string());
            Err(SinkWriteError::internal(name, format!("panic: {}", message)))
        }
    }
}

/// Validates and activates sink configs
#[derive(Clone, Default)]
pub struct SinkBuilder {
    renderer: Option<Arc<dyn Render>>,
}

impl SinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `renderer` for console sinks instead of [`ConsoleRenderer`]
    pub fn with_renderer(mut self, renderer: Arc<dyn Render>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Validate every config; the first failure is returned
    pub fn validate(
        configs: &[SinkConfig],
        dir: Option<&LogDirectory>,
    ) -> Result<(), InvalidSinkConfigError> {
        let mut names = HashSet::new();
        for config in configs {
            config.validate(dir)?;
            if !names.insert(config.name.as_str()) {
                return Err(InvalidSinkConfigError::new(
                    &config.name,
                    "name",
                    "is used by more than one sink",
                ));
            }
        }
        Ok(())
    }

    /// Activate all sinks or none
    ///
    /// Handles are returned in the order of `configs`. If one sink fails to
    /// activate, the ones already opened are closed again.
    pub fn build(
        &self,
        configs: &[SinkConfig],
        dir: Option<&LogDirectory>,
    ) -> Result<Vec<SinkHandle>, LoggerError> {
        Self::validate(configs, dir)?;
        activate_all(configs, |config| self.activate(config, dir))
    }

    fn activate(
        &self,
        config: &SinkConfig,
        dir: Option<&LogDirectory>,
    ) -> std::io::Result<Arc<dyn Sink>> {
        let template = match &config.format {
            Some(format) => Template::parse(format).ok(),
            None => None,
        };

        match &config.kind {
            SinkKind::Console {
                color,
                target,
                time_format,
            } => {
                let renderer: Arc<dyn Render> = match (&self.renderer, template) {
                    (Some(custom), _) => Arc::clone(custom),
                    (None, Some(template)) => Arc::new(ConsoleRenderer::new(template, time_format)),
                    (None, None) => Arc::new(ConsoleRenderer::new(Template::default(), time_format)),
                };
                let color_enabled = target.color_enabled(*color);
                Ok(Arc::new(ConsoleSink::new(
                    &config.name,
                    config.min_level,
                    target.clone(),
                    renderer,
                    color_enabled,
                )))
            }
            SinkKind::File {
                file_name,
                format,
                rotation,
            } => {
                let dir = dir.ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no log directory")
                })?;
                let sink = FileSink::open(
                    &config.name,
                    config.min_level,
                    dir.join(file_name),
                    *format,
                    template,
                    rotation.clone(),
                )?;
                Ok(Arc::new(sink))
            }
            SinkKind::Buffer { buffer } => Ok(Arc::new(BufferSink::new(
                &config.name,
                config.min_level,
                Arc::clone(buffer),
            ))),
        }
    }
}

/// Open every sink in order, closing the opened ones if any fails
fn activate_all<F>(configs: &[SinkConfig], mut activate: F) -> Result<Vec<SinkHandle>, LoggerError>
where
    F: FnMut(&SinkConfig) -> std::io::Result<Arc<dyn Sink>>,
{
    let mut handles: Vec<SinkHandle> = Vec::with_capacity(configs.len());
    for config in configs {
        match activate(config) {
            Ok(sink) => handles.push(SinkHandle::new(sink)),
            Err(source) => {
                for handle in &handles {
                    let _ = handle.close();
                }
                return Err(LoggerError::Activation {
                    sink: config.name.clone(),
                    source,
                });
            }
        }
    }
    Ok(handles)
}

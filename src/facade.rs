//! Logger facade and handles
//!
//! [`LoggerFacade`] owns the active sink set. Hosts configure it once (or
//! again to replace every sink), log through cloneable [`LoggerHandle`]s and
//! shut it down at exit. There is no global registry; dropping the facade
//! shuts it down.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use serde::Serialize;

use crate::config::LoggerOptions;
use crate::decor::{self, Align, ProgressLayout};
use crate::error::{InvalidSinkConfigError, LoggerError, PathResolutionError, SinkWriteError};
use crate::paths::{self, LogDirectory};
use crate::progress::Progress;
use crate::record::{Context, ExceptionInfo, Level, LogRecord};
use crate::render::Render;
use crate::sink::{
    ConsoleTarget, LogBuffer, RotationPolicy, Sink, SinkBuilder, SinkConfig, SinkHandle,
};

/// Logger name used for the facade's own records
pub const SETUP_LOGGER: &str = "standard_logger.setup";

const INTERNAL_LOGGER: &str = "standard_logger";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

const RETIRE_POLL: Duration = Duration::from_millis(1);

thread_local! {
    /// Set while this thread is handing a record to sinks
    static DELIVERING: Cell<bool> = Cell::new(false);
}

/// Puts the previous panic hook back
type RestoreHook = Box<dyn FnOnce() + Send>;

/// Lifecycle of a [`LoggerFacade`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeState {
    Unconfigured = 0,
    Configuring = 1,
    Active = 2,
    Closing = 3,
    Closed = 4,
}

impl From<u8> for FacadeState {
    fn from(val: u8) -> Self {
        match val {
            1 => FacadeState::Configuring,
            2 => FacadeState::Active,
            3 => FacadeState::Closing,
            4 => FacadeState::Closed,
            _ => FacadeState::Unconfigured,
        }
    }
}

/// Sinks activated by one `configure` call
#[derive(Default)]
struct SinkSet {
    /// False for the empty placeholder installed between sets
    live: bool,
    handles: Vec<SinkHandle>,
    directory: Option<LogDirectory>,
    log_file: Option<PathBuf>,
    buffer: Option<Arc<LogBuffer>>,
}

impl SinkSet {
    /// Close every sink, returning the failures
    fn close(&self) -> Vec<SinkWriteError> {
        self.handles.iter().filter_map(|h| h.close().err()).collect()
    }
}

/// Everything `configure` decides before touching the active set
struct Plan {
    configs: Vec<SinkConfig>,
    directory: Option<LogDirectory>,
    log_file: Option<PathBuf>,
    buffer: Option<Arc<LogBuffer>>,
    degraded: Option<PathResolutionError>,
}

/// Host customizations applied on every `configure`
#[derive(Default)]
struct Setup {
    builder: SinkBuilder,
    host_sinks: Vec<Arc<dyn Sink>>,
    console_target: Option<ConsoleTarget>,
}

struct Shared {
    state: AtomicU8,
    sinks: RwLock<Arc<SinkSet>>,
    /// Serializes configure and shutdown
    lifecycle: Mutex<()>,
    setup: Mutex<Setup>,
    dropped: AtomicU64,
    panic_hook: Mutex<Option<RestoreHook>>,
}

impl Shared {
    fn state(&self) -> FacadeState {
        FacadeState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: FacadeState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn current(&self) -> Arc<SinkSet> {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&sinks)
    }

    /// Swap in an empty placeholder and wait until no delivery uses the old set
    ///
    /// Deliveries hold their own reference to the set, so once this returns
    /// every record handed to the old set has reached all of its sinks.
    fn retire(&self) -> SinkSet {
        let mut old = {
            let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *sinks)
        };
        loop {
            match Arc::try_unwrap(old) {
                Ok(set) => return set,
                Err(busy) => {
                    old = busy;
                    std::thread::sleep(RETIRE_POLL);
                }
            }
        }
    }

    fn install(&self, set: SinkSet) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        *sinks = Arc::new(set);
    }

    fn dispatch(&self, record: &LogRecord) {
        // Taken before the state check so a set swapped out meanwhile is
        // still delivered in full
        let set = self.current();
        if !set.live || self.state() != FacadeState::Active {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let was_delivering = DELIVERING.with(|d| d.replace(true));
        let failures: Vec<SinkWriteError> = set
            .handles
            .iter()
            .filter_map(|handle| handle.emit(record))
            .collect();
        for failure in failures {
            report_failure(&set, &failure);
        }
        DELIVERING.with(|d| d.set(was_delivering));
    }

    /// Log a panic at CRITICAL; false if no sink took it
    fn report_panic(&self, logger: &str, payload: &(dyn Any + Send), location: Option<String>) -> bool {
        // A sink panicking mid-write may still hold its own lock
        if DELIVERING.with(Cell::get) || self.state() != FacadeState::Active {
            return false;
        }
        let accepted = self
            .current()
            .handles
            .iter()
            .any(|h| h.is_healthy() && h.accepts(Level::Critical));
        if !accepted {
            return false;
        }

        let message = panic_message(payload);
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("<unnamed>");
        let exception = ExceptionInfo::panic(message.clone(), location)
            .with_backtrace(&Backtrace::force_capture());
        let record = LogRecord::new(
            Level::Critical,
            logger,
            format!("Thread '{}' panicked: {}", thread_name, message),
        )
        .with_context(Context::new().with("thread", thread_name))
        .with_exception(exception);
        self.dispatch(&record);
        true
    }

    fn remove_panic_hook(&self) {
        // Hooks cannot be swapped while unwinding; once the facade is closed
        // the installed hook defers to the previous one anyway
        if std::thread::panicking() {
            return;
        }
        let restore = self
            .panic_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(restore) = restore {
            drop(std::panic::take_hook());
            restore();
        }
    }
}

/// Route panics to the sinks, falling back to the previous hook
fn install_panic_hook(shared: &Arc<Shared>, logger: &str) {
    let mut slot = shared.panic_hook.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return;
    }
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let logger = logger.to_string();
    let previous = Arc::new(std::panic::take_hook());
    let fallback = Arc::clone(&previous);
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map(|l| l.to_string());
        let reported = weak
            .upgrade()
            .map_or(false, |shared| shared.report_panic(&logger, info.payload(), location));
        if !reported {
            fallback(info);
        }
    }));
    *slot = Some(Box::new(move || {
        std::panic::set_hook(Box::new(move |info| previous(info)));
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string())
}

/// Tell the user about a failing sink through the sinks that still work
///
/// Falls back to stderr when no other sink takes the warning.
fn report_failure(set: &SinkSet, failure: &SinkWriteError) {
    let context = Context::new()
        .with("sink", &failure.sink)
        .with("error", &failure.message);
    let warning = LogRecord::new(
        Level::Warning,
        INTERNAL_LOGGER,
        format!(
            "Sink '{}' is failing ({}); records for it are being dropped",
            failure.sink,
            failure.kind.user_message()
        ),
    )
    .with_context(context);

    let mut delivered = false;
    for handle in &set.handles {
        if handle.name() == failure.sink || !handle.is_healthy() || !handle.accepts(Level::Warning) {
            continue;
        }
        match handle.emit(&warning) {
            None => delivered = true,
            Some(second) => eprintln!("standard_logger: {}", second),
        }
    }
    if !delivered {
        eprintln!("standard_logger: {}", failure);
    }
}

/// Owner of the active sink set
///
/// ```no_run
/// use standard_logger::{LoggerFacade, LoggerOptions};
///
/// let facade = LoggerFacade::new();
/// let log = facade.configure(LoggerOptions::new("demo"))?;
/// log.info("started");
/// facade.shutdown();
/// # Ok::<(), standard_logger::LoggerError>(())
/// ```
pub struct LoggerFacade {
    shared: Arc<Shared>,
}

impl Default for LoggerFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggerFacade {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(FacadeState::Unconfigured as u8),
                sinks: RwLock::new(Arc::new(SinkSet::default())),
                lifecycle: Mutex::new(()),
                setup: Mutex::new(Setup::default()),
                dropped: AtomicU64::new(0),
                panic_hook: Mutex::new(None),
            }),
        }
    }

    fn setup(&self) -> std::sync::MutexGuard<'_, Setup> {
        self.shared.setup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Render console records with `renderer` instead of the default
    pub fn with_renderer(self, renderer: Arc<dyn Render>) -> Self {
        {
            let mut setup = self.setup();
            setup.builder = SinkBuilder::new().with_renderer(renderer);
        }
        self
    }

    /// Add a host-supplied sink after the built-in ones
    ///
    /// The sink survives reconfiguration; it is flushed, not closed, when
    /// the sink set is replaced and closed at shutdown.
    pub fn with_sink(self, sink: Arc<dyn Sink>) -> Self {
        self.setup().host_sinks.push(sink);
        self
    }

    /// Send console output to `target` instead of the configured stream
    pub fn with_console_target(self, target: ConsoleTarget) -> Self {
        self.setup().console_target = Some(target);
        self
    }

    pub fn state(&self) -> FacadeState {
        self.shared.state()
    }

    /// Directory chosen by the last successful `configure`
    pub fn log_directory(&self) -> Option<LogDirectory> {
        self.shared.current().directory.clone()
    }

    /// Number of records dropped because the facade was not active
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// A handle logging under `name`
    ///
    /// Handles can be created at any time; records are dropped until the
    /// facade is active.
    pub fn logger(&self, name: impl Into<String>) -> LoggerHandle {
        LoggerHandle {
            shared: Arc::clone(&self.shared),
            logger: name.into(),
            context: Context::new(),
        }
    }

    /// Activate sinks for `options`, replacing any previous set
    ///
    /// Invalid options leave the previous set untouched. If activation fails
    /// after the previous set was closed, the facade is left unconfigured.
    pub fn configure(&self, options: LoggerOptions) -> Result<LoggerHandle, LoggerError> {
        let _lifecycle = self
            .shared
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if matches!(self.state(), FacadeState::Closing | FacadeState::Closed) {
            return Err(LoggerError::Closed);
        }

        let setup = self.setup();
        let plan = self.plan(&options, setup.console_target.clone())?;

        self.shared.set_state(FacadeState::Configuring);
        // The old set must release its files before the new one opens them
        for failure in self.shared.retire().close() {
            eprintln!("standard_logger: {}", failure);
        }

        let dir = plan.directory.as_ref();
        let mut handles = match setup.builder.build(&plan.configs, dir) {
            Ok(handles) => handles,
            Err(e) => {
                self.shared.set_state(FacadeState::Unconfigured);
                return Err(e);
            }
        };
        handles.extend(
            setup
                .host_sinks
                .iter()
                .map(|sink| SinkHandle::borrowed(Arc::clone(sink))),
        );
        let sink_count = handles.len();
        self.shared.install(SinkSet {
            live: true,
            handles,
            directory: plan.directory,
            log_file: plan.log_file,
            buffer: plan.buffer,
        });
        self.shared.set_state(FacadeState::Active);

        drop(setup);

        let handle = self.logger(options.app_name.trim());
        if options.panic_hook {
            install_panic_hook(&self.shared, options.app_name.trim());
        } else {
            self.shared.remove_panic_hook();
        }
        if let Some(err) = &plan.degraded {
            handle.log(
                Level::Warning,
                format!("Log directory unavailable, logging to console only: {}", err),
                Context::new().with("path", &err.path.display().to_string()),
            );
        }
        self.log_summary(&options, sink_count);
        Ok(handle)
    }

    /// Resolve paths and build sink configs without touching the active set
    fn plan(
        &self,
        options: &LoggerOptions,
        console_target: Option<ConsoleTarget>,
    ) -> Result<Plan, LoggerError> {
        let app_name = options.app_name.trim();
        if app_name.is_empty() {
            return Err(InvalidSinkConfigError::new("options", "app_name", "must not be empty").into());
        }

        let mut configs = Vec::new();
        if options.console_enabled {
            let target = console_target
                .clone()
                .unwrap_or_else(|| ConsoleTarget::from(options.console_stream));
            configs.push(
                SinkConfig::console(options.color_mode, target)
                    .level(options.console_threshold())
                    .time_format(options.console_time_format.clone()),
            );
        }

        let mut directory = None;
        let mut log_file = None;
        let mut degraded = None;
        if options.file_enabled {
            match paths::resolve(app_name, options.log_dir_override.as_deref()) {
                Ok(dir) => {
                    let file_name = paths::log_file_name(app_name, options.file_format);
                    let rotation = RotationPolicy {
                        max_bytes: options.rotation_size,
                        max_age: options.rotation_age_secs.map(Duration::from_secs),
                        keep: options.rotation_count,
                        retention: options
                            .retention_days
                            .map(|days| Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY))),
                    };
                    let mut config = SinkConfig::file(file_name.clone(), options.file_format, rotation)
                        .level(options.file_threshold());
                    if let Some(template) = &options.file_template {
                        config = config.template(template.clone());
                    }
                    configs.push(config);
                    log_file = Some(dir.join(&file_name));
                    directory = Some(dir);
                }
                Err(e) if options.strict_paths => return Err(e.into()),
                Err(e) => degraded = Some(e),
            }
        }
        // With console output turned off there would be nothing left to log to
        if degraded.is_some() && !options.console_enabled {
            let target = console_target.unwrap_or_else(|| ConsoleTarget::from(options.console_stream));
            configs.push(
                SinkConfig::console(options.color_mode, target)
                    .level(options.console_threshold())
                    .time_format(options.console_time_format.clone()),
            );
        }

        let mut buffer = None;
        if let Some(capacity) = options.buffer_capacity {
            let ring = Arc::new(LogBuffer::new(capacity, capacity));
            configs.push(SinkConfig::buffer(Arc::clone(&ring)).level(options.min_level));
            buffer = Some(ring);
        }

        SinkBuilder::validate(&configs, directory.as_ref())?;
        Ok(Plan {
            configs,
            directory,
            log_file,
            buffer,
            degraded,
        })
    }

    fn log_summary(&self, options: &LoggerOptions, sink_count: usize) {
        let set = self.shared.current();
        let mut context = Context::new()
            .with("app", options.app_name.trim())
            .with("sinks", &sink_count)
            .with("min_level", options.min_level.as_str())
            .with("color", &options.color_mode);
        if let Some(dir) = &set.directory {
            context.insert("log_dir", &dir.path.display().to_string());
            context.insert("created", &dir.created);
        }
        if let Some(file) = &set.log_file {
            context.insert("log_file", &file.display().to_string());
            context.insert("rotation_size", &options.rotation_size);
            context.insert("rotation_count", &options.rotation_count);
        }
        self.logger(SETUP_LOGGER)
            .log(Level::Debug, "Logging configured", context);
    }

    /// Flush and close every sink; later log calls are dropped
    ///
    /// Runs automatically on drop. Calling it twice does nothing.
    pub fn shutdown(&self) {
        let _lifecycle = self
            .shared
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.state() == FacadeState::Closed {
            return;
        }
        self.shared.set_state(FacadeState::Closing);
        self.shared.remove_panic_hook();

        for failure in self.shared.retire().close() {
            eprintln!("standard_logger: {}", failure);
        }
        // Host sinks are only flushed by the set; the facade owns their close
        for sink in &self.setup().host_sinks {
            if let Err(e) = sink.close() {
                eprintln!("standard_logger: {}", e);
            }
        }
        self.shared.set_state(FacadeState::Closed);
    }
}

impl Drop for LoggerFacade {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cloneable logging handle
///
/// Each handle carries a logger name and bound context. Handles stay valid
/// across reconfiguration and after shutdown (records are then dropped).
#[derive(Clone)]
pub struct LoggerHandle {
    shared: Arc<Shared>,
    logger: String,
    context: Context,
}

impl std::fmt::Debug for LoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerHandle")
            .field("logger", &self.logger)
            .field("context", &self.context)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl LoggerHandle {
    pub fn logger_name(&self) -> &str {
        &self.logger
    }

    /// A handle for a different logger name, keeping bound context
    pub fn named(&self, logger: impl Into<String>) -> LoggerHandle {
        LoggerHandle {
            shared: Arc::clone(&self.shared),
            logger: logger.into(),
            context: self.context.clone(),
        }
    }

    /// A handle that adds `key=value` to every record
    pub fn bind<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> LoggerHandle {
        let mut handle = self.clone();
        handle.context.insert(key, value);
        handle
    }

    /// Whether any active sink would take a record at `level`
    pub fn enabled(&self, level: Level) -> bool {
        self.shared.state() == FacadeState::Active
            && self.shared.current().handles.iter().any(|h| h.accepts(level))
    }

    /// Log a record; call-site context wins over bound context
    pub fn log(&self, level: Level, message: impl Into<String>, context: Context) {
        self.emit(LogRecord::new(level, self.logger.as_str(), message), context);
    }

    fn emit(&self, record: LogRecord, context: Context) {
        let mut merged = self.context.clone();
        merged.extend(&context);
        self.shared.dispatch(&record.with_context(merged));
    }

    pub fn trace(&self, message: impl Into<String>) {
        self.log(Level::Trace, message, Context::new());
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message, Context::new());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message, Context::new());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::Warning, message, Context::new());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message, Context::new());
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(Level::Critical, message, Context::new());
    }

    /// Log at ERROR with the error, its causes and a backtrace attached
    ///
    /// The backtrace is only captured when `RUST_BACKTRACE` enables it.
    pub fn exception<E: std::error::Error + ?Sized>(
        &self,
        message: impl Into<String>,
        error: &E,
        context: Context,
    ) {
        let exception = ExceptionInfo::from_error(error).with_backtrace(&Backtrace::capture());
        let record = LogRecord::new(Level::Error, self.logger.as_str(), message).with_exception(exception);
        self.emit(record, context);
    }

    /// Flush every active sink
    pub fn flush(&self) {
        self.each_sink(SinkHandle::flush);
    }

    /// Active log file, if a file sink is configured
    pub fn log_file(&self) -> Option<PathBuf> {
        self.shared.current().log_file.clone()
    }

    /// In-memory buffer, if `buffer_capacity` was configured
    pub fn buffer(&self) -> Option<Arc<LogBuffer>> {
        self.shared.current().buffer.clone()
    }

    /// Draw a boxed panel on console sinks
    pub fn panel(&self, content: &str, title: Option<&str>, compact: bool) {
        self.display(&decor::render_panel(content, title, compact));
    }

    /// Draw a horizontal rule of `character` across the terminal on console sinks
    pub fn rule(&self, title: &str, character: char, align: Align) {
        self.display(&decor::render_rule(title, character, align, decor::terminal_width()));
    }

    /// Start a progress line on console sinks
    ///
    /// Start and end are also logged at INFO under this handle's name.
    pub fn progress(&self, description: impl Into<String>, layout: ProgressLayout) -> Progress {
        Progress::start(self.clone(), description.into(), layout)
    }

    pub(crate) fn display(&self, text: &str) {
        self.each_sink(|h| h.display(text));
    }

    pub(crate) fn status(&self, line: Option<&str>) {
        self.each_sink(|h| h.status(line));
    }

    fn each_sink<F>(&self, f: F)
    where
        F: Fn(&SinkHandle) -> Option<SinkWriteError>,
    {
        let set = self.shared.current();
        if !set.live || self.shared.state() != FacadeState::Active {
            return;
        }
        let failures: Vec<SinkWriteError> = set.handles.iter().filter_map(f).collect();
        for failure in failures {
            report_failure(&set, &failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColorMode, FileFormat};
    use crate::context;
    use crate::sink::CaptureBuffer;
    use std::fs;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn captured() -> (LoggerFacade, CaptureBuffer) {
        let capture = CaptureBuffer::new();
        let facade = LoggerFacade::new().with_console_target(ConsoleTarget::Capture(capture.clone()));
        (facade, capture)
    }

    fn options(temp_dir: &TempDir) -> LoggerOptions {
        LoggerOptions::new("demo")
            .log_dir(temp_dir.path())
            .color(ColorMode::Never)
    }

    /// Counts records and can be told to fail
    #[derive(Default)]
    struct CountingSink {
        emitted: AtomicU64,
        fail: AtomicBool,
        closed: AtomicBool,
    }

    impl Sink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        fn min_level(&self) -> Level {
            Level::Info
        }

        fn emit(&self, _record: &LogRecord) -> Result<(), SinkWriteError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkWriteError::internal("counting", "refused"));
            }
            self.emitted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) -> Result<(), SinkWriteError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Stalls while delivering the record named "racing"
    struct SlowSink {
        started: Mutex<mpsc::Sender<()>>,
    }

    impl Sink for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }

        fn min_level(&self) -> Level {
            Level::Info
        }

        fn emit(&self, record: &LogRecord) -> Result<(), SinkWriteError> {
            if record.message == "racing" {
                let _ = self.started.lock().unwrap().send(());
                std::thread::sleep(Duration::from_millis(200));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    impl Sink for RecordingSink {
        fn name(&self) -> &str {
            "recorder"
        }

        fn min_level(&self) -> Level {
            Level::Info
        }

        fn emit(&self, record: &LogRecord) -> Result<(), SinkWriteError> {
            self.messages.lock().unwrap().push(record.message.clone());
            Ok(())
        }
    }

    /// A facade whose "racing" record is mid-delivery when `interrupt` runs
    fn race_delivery(interrupt: impl FnOnce(&LoggerFacade, LoggerOptions)) -> Vec<String> {
        let temp_dir = TempDir::new().unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let recorder = Arc::new(RecordingSink::default());
        let facade = LoggerFacade::new()
            .with_sink(Arc::new(SlowSink {
                started: Mutex::new(started_tx),
            }))
            .with_sink(recorder.clone());
        let opts = options(&temp_dir).console(false).file(false);
        let log = facade.configure(opts.clone()).unwrap();

        let racing = std::thread::spawn(move || log.info("racing"));
        started_rx.recv().unwrap();
        interrupt(&facade, opts);
        racing.join().unwrap();

        let messages = recorder.messages.lock().unwrap().clone();
        messages
    }

    #[test]
    fn test_reconfigure_waits_for_inflight_delivery() {
        let messages = race_delivery(|facade, opts| {
            facade.configure(opts).unwrap();
            assert_eq!(facade.state(), FacadeState::Active);
        });
        assert_eq!(messages, vec!["racing".to_string()]);
    }

    #[test]
    fn test_shutdown_waits_for_inflight_delivery() {
        let messages = race_delivery(|facade, _| facade.shutdown());
        assert_eq!(messages, vec!["racing".to_string()]);
    }

    #[test]
    fn test_console_only_writes_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, capture) = captured();

        let log = facade.configure(options(&temp_dir).file(false)).unwrap();
        log.log(Level::Info, "hello", context! { "user" => "a" });

        let out = capture.contents();
        assert!(out.contains("INFO"));
        assert!(out.contains("hello"));
        assert!(out.contains("user=a"));
        assert!(log.log_file().is_none());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_reconfigure_reuses_file_path() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, _capture) = captured();

        let first = facade.configure(options(&temp_dir)).unwrap();
        first.info("from first");
        let second = facade.configure(options(&temp_dir)).unwrap();
        second.info("from second");
        // Old handles log into the new set
        first.info("first again");
        assert_eq!(first.log_file(), second.log_file());
        facade.shutdown();

        let path = temp_dir.path().join("demo.jsonl");
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("from first"));
        assert!(content.contains("from second"));
        assert!(content.contains("first again"));
    }

    #[test]
    fn test_file_gets_json_lines() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, _capture) = captured();

        let log = facade.configure(options(&temp_dir)).unwrap();
        log.bind("request", &42).warning("slow");
        let path = log.log_file().unwrap();
        facade.shutdown();

        let content = fs::read_to_string(path).unwrap();
        let line = content.lines().find(|l| l.contains("slow")).unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["level"], "WARNING");
        assert_eq!(value["logger"], "demo");
        assert_eq!(value["context"]["request"], 42);
    }

    #[test]
    fn test_each_sink_gets_record_once() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(CountingSink::default());
        let facade = LoggerFacade::new().with_sink(sink.clone());

        let log = facade
            .configure(options(&temp_dir).console(false).file(false))
            .unwrap();
        log.info("one");
        log.debug("below threshold");
        log.error("two");

        assert_eq!(sink.emitted.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(CountingSink::default());
        sink.fail.store(true, Ordering::SeqCst);
        let (facade, capture) = captured();
        let facade = facade.with_sink(sink.clone());

        let log = facade.configure(options(&temp_dir).file(false)).unwrap();
        log.info("first");
        log.info("second");

        let out = capture.contents();
        assert!(out.contains("first"));
        assert!(out.contains("second"));
        // Reported once through the console, not once per record
        assert_eq!(out.matches("Sink 'counting' is failing").count(), 1);
    }

    #[test]
    fn test_host_sink_survives_reconfigure() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(CountingSink::default());
        let facade = LoggerFacade::new().with_sink(sink.clone());
        let opts = options(&temp_dir).console(false).file(false);

        facade.configure(opts.clone()).unwrap().info("a");
        assert!(!sink.closed.load(Ordering::SeqCst));
        facade.configure(opts).unwrap().info("b");
        assert_eq!(sink.emitted.load(Ordering::SeqCst), 2);

        facade.shutdown();
        assert!(sink.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_state_machine() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, _capture) = captured();
        let early = facade.logger("early");

        assert_eq!(facade.state(), FacadeState::Unconfigured);
        early.info("dropped");
        assert_eq!(facade.dropped_count(), 1);

        facade.configure(options(&temp_dir).file(false)).unwrap();
        assert_eq!(facade.state(), FacadeState::Active);

        facade.shutdown();
        assert_eq!(facade.state(), FacadeState::Closed);
        early.info("also dropped");
        assert_eq!(facade.dropped_count(), 2);

        let err = facade.configure(options(&temp_dir)).unwrap_err();
        assert!(matches!(err, LoggerError::Closed));
        facade.shutdown();
    }

    #[test]
    fn test_invalid_options_keep_previous_set() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, capture) = captured();

        let log = facade.configure(options(&temp_dir).file(false)).unwrap();
        let err = facade
            .configure(options(&temp_dir).rotation(0, 3))
            .unwrap_err();
        assert!(matches!(err, LoggerError::InvalidSinkConfig(ref e) if e.field == "rotation_size"));
        assert_eq!(facade.state(), FacadeState::Active);

        log.info("still here");
        assert!(capture.contents().contains("still here"));
    }

    #[test]
    fn test_empty_app_name_rejected() {
        let (facade, _capture) = captured();
        let err = facade.configure(LoggerOptions::new("  ")).unwrap_err();
        assert!(matches!(err, LoggerError::InvalidSinkConfig(ref e) if e.field == "app_name"));
        assert_eq!(facade.state(), FacadeState::Unconfigured);
    }

    #[test]
    fn test_unusable_directory_degrades_to_console() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();
        let (facade, capture) = captured();

        let log = facade
            .configure(LoggerOptions::new("demo").log_dir(&blocker).color(ColorMode::Never))
            .unwrap();
        assert!(log.log_file().is_none());
        assert!(capture.contents().contains("logging to console only"));

        let mut strict = LoggerOptions::new("demo").log_dir(&blocker);
        strict.strict_paths = true;
        let err = facade.configure(strict).unwrap_err();
        assert!(matches!(err, LoggerError::PathResolution(_)));
    }

    #[test]
    fn test_unusable_directory_without_console_still_logs() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();
        let (facade, capture) = captured();

        let log = facade
            .configure(
                LoggerOptions::new("demo")
                    .log_dir(&blocker)
                    .console(false)
                    .color(ColorMode::Never),
            )
            .unwrap();
        assert!(log.enabled(Level::Critical));
        assert!(capture.contents().contains("logging to console only"));

        log.error("still visible");
        assert!(capture.contents().contains("still visible"));
    }

    #[test]
    fn test_panic_hook_logs_critical() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, capture) = captured();
        let log = facade
            .configure(options(&temp_dir).file(false).buffer(16).panic_hook(true))
            .unwrap();

        let worker = std::thread::Builder::new()
            .name("worker".to_string())
            .spawn(|| panic!("worker exploded"))
            .unwrap();
        assert!(worker.join().is_err());

        let record = log
            .buffer()
            .unwrap()
            .all_entries()
            .into_iter()
            .find(|r| r.message.contains("worker exploded"))
            .unwrap();
        assert_eq!(record.level, Level::Critical);
        assert_eq!(record.context.get("thread").unwrap(), "worker");
        let exception = record.exception.unwrap();
        assert_eq!(exception.type_name, "panic");
        assert_eq!(exception.message, "worker exploded");
        assert!(exception.location.unwrap().contains("facade.rs"));
        assert!(capture.contents().contains("CRITICAL"));

        // Reconfiguring without the option removes the hook
        facade.configure(options(&temp_dir).file(false)).unwrap();
        assert!(facade.shared.panic_hook.lock().unwrap().is_none());

        facade.configure(options(&temp_dir).file(false).panic_hook(true)).unwrap();
        assert!(facade.shared.panic_hook.lock().unwrap().is_some());
        facade.shutdown();
        assert!(facade.shared.panic_hook.lock().unwrap().is_none());
    }

    #[test]
    fn test_activation_failure_leaves_unconfigured() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("demo.jsonl")).unwrap();
        let (facade, _capture) = captured();

        let err = facade.configure(options(&temp_dir)).unwrap_err();
        assert!(matches!(err, LoggerError::Activation { .. }));
        assert_eq!(facade.state(), FacadeState::Unconfigured);
    }

    #[test]
    fn test_setup_summary_logged_at_debug() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, _capture) = captured();

        let log = facade
            .configure(options(&temp_dir).min_level(Level::Debug).buffer(16))
            .unwrap();
        let buffer = log.buffer().unwrap();
        let summary = buffer
            .all_entries()
            .into_iter()
            .find(|r| r.logger == SETUP_LOGGER)
            .unwrap();
        assert_eq!(summary.level, Level::Debug);
        assert_eq!(summary.context.get("app").unwrap(), "demo");
        assert!(summary.context.get("log_file").is_some());
    }

    #[test]
    fn test_exception_includes_causes() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, capture) = captured();
        let log = facade
            .configure(options(&temp_dir).file(false).buffer(8))
            .unwrap();

        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        log.exception("save failed", &err, context! { "path" => "/tmp/out.csv" });

        let out = capture.contents();
        assert!(out.contains("save failed"));
        assert!(out.contains("Error: disk on fire"));
        let record = log.buffer().unwrap().all_entries().pop().unwrap();
        assert_eq!(record.context.get("path").unwrap(), "/tmp/out.csv");
        assert_eq!(record.exception.unwrap().message, "disk on fire");
    }

    #[test]
    fn test_named_and_bound_handles() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, _capture) = captured();
        let log = facade
            .configure(options(&temp_dir).file(false).buffer(8))
            .unwrap();

        let db = log.named("demo.db").bind("shard", &3);
        db.log(Level::Info, "query", context! { "shard" => 4, "rows" => 10 });

        let record = log.buffer().unwrap().all_entries().pop().unwrap();
        assert_eq!(record.logger, "demo.db");
        assert_eq!(record.context.get("shard").unwrap(), 4);
        assert_eq!(record.context.get("rows").unwrap(), 10);
        assert!(log.enabled(Level::Info));
        assert!(!log.enabled(Level::Debug));
    }

    #[test]
    fn test_panel_and_rule_skip_files() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, capture) = captured();
        let log = facade.configure(options(&temp_dir)).unwrap();

        log.rule("Setup", '=', Align::Left);
        log.panel("all good", Some("Status"), true);
        let path = log.log_file().unwrap();
        facade.shutdown();

        let out = capture.contents();
        assert!(out.contains("  Setup  =="));
        assert!(!out.contains("=  Setup"));
        assert!(out.contains("╭"));
        assert!(!fs::read_to_string(path).unwrap().contains("Status"));
    }

    #[test]
    fn test_text_file_format() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, _capture) = captured();
        let mut opts = options(&temp_dir).file_format(FileFormat::Text);
        opts.file_template = Some("{level} {message}".to_string());

        let log = facade.configure(opts).unwrap();
        log.info("plain line");
        let path = log.log_file().unwrap();
        facade.shutdown();

        assert!(path.ends_with("demo.log"));
        assert!(fs::read_to_string(path).unwrap().contains("INFO plain line\n"));
    }

    #[test]
    fn test_concurrent_logging_keeps_lines_whole() {
        let temp_dir = TempDir::new().unwrap();
        let (facade, _capture) = captured();
        let log = facade
            .configure(options(&temp_dir).console(false).rotation(4096, 50))
            .unwrap();
        let path = log.log_file().unwrap();

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        log.info(format!("thread {} record {}", t, i));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        facade.shutdown();

        let mut total = 0;
        let mut files = vec![path.clone()];
        files.extend(crate::sink::list_archives(&path).unwrap().into_iter().map(|(_, p)| p));
        for file in files {
            for line in fs::read_to_string(file).unwrap().lines() {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                if value["message"].as_str().unwrap().starts_with("thread ") {
                    total += 1;
                }
            }
        }
        assert_eq!(total, 400);
    }
}

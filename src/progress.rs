//! Progress lines for long-running work
//!
//! A [`Progress`] redraws one status line in place on interactive consoles.
//! Files and other sinks only see the INFO records marking start and end.

use std::time::{Duration, Instant};

use crate::decor::{self, ProgressLayout};
use crate::facade::LoggerHandle;

const REDRAW_INTERVAL: Duration = Duration::from_millis(50);

/// A live progress line, finished on [`Progress::finish`] or drop
///
/// ```no_run
/// # use standard_logger::{LoggerFacade, LoggerOptions, ProgressLayout};
/// # let facade = LoggerFacade::new();
/// # let log = facade.configure(LoggerOptions::new("demo"))?;
/// let mut progress = log.progress("Processing items", ProgressLayout::TaskCounter).with_total(50);
/// for _ in 0..50 {
///     progress.advance(1);
/// }
/// progress.finish();
/// # Ok::<(), standard_logger::LoggerError>(())
/// ```
pub struct Progress {
    log: LoggerHandle,
    description: String,
    layout: ProgressLayout,
    current: u64,
    total: Option<u64>,
    transient: bool,
    started: Instant,
    last_draw: Option<Instant>,
    done: bool,
}

impl Progress {
    pub(crate) fn start(log: LoggerHandle, description: String, layout: ProgressLayout) -> Self {
        log.info(format!("Progress start: {}", description));
        let mut progress = Self {
            log,
            description,
            layout,
            current: 0,
            total: None,
            transient: false,
            started: Instant::now(),
            last_draw: None,
            done: false,
        };
        progress.draw(true);
        progress
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.set_total(Some(total));
        self
    }

    /// Clear the line when finished instead of leaving the final state
    pub fn transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Expected total; `None` shows a spinner
    pub fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
        self.draw(true);
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
        self.draw(true);
    }

    pub fn advance(&mut self, delta: u64) {
        self.current = self.current.saturating_add(delta);
        self.draw(false);
    }

    pub fn set_position(&mut self, position: u64) {
        self.current = position;
        self.draw(false);
    }

    pub fn position(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// True once a known total has been reached
    pub fn is_finished(&self) -> bool {
        self.total.map_or(false, |total| self.current >= total)
    }

    /// The line as it would be drawn now
    pub fn line(&self) -> String {
        decor::render_progress(
            &self.description,
            self.layout,
            self.current,
            self.total,
            self.started.elapsed(),
        )
    }

    pub fn finish(mut self) {
        self.complete();
    }

    fn draw(&mut self, force: bool) {
        let now = Instant::now();
        let recent = self
            .last_draw
            .map_or(false, |at| now.duration_since(at) < REDRAW_INTERVAL);
        if recent && !force && !self.is_finished() {
            return;
        }
        self.last_draw = Some(now);
        self.log.status(Some(&self.line()));
    }

    fn complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        let line = self.line();
        self.log.status(None);
        if !self.transient {
            self.log.display(&line);
        }
        self.log.info(format!("Progress end: {}", self.description));
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorMode;
    use crate::facade::LoggerFacade;
    use crate::sink::{CaptureBuffer, ConsoleTarget};
    use crate::LoggerOptions;

    fn captured() -> (LoggerFacade, CaptureBuffer, LoggerHandle) {
        let capture = CaptureBuffer::new();
        let facade = LoggerFacade::new().with_console_target(ConsoleTarget::Capture(capture.clone()));
        let log = facade
            .configure(
                LoggerOptions::new("demo")
                    .file(false)
                    .buffer(16)
                    .color(ColorMode::Never),
            )
            .unwrap();
        (facade, capture, log)
    }

    #[test]
    fn test_task_counter_leaves_final_line() {
        let (_facade, capture, log) = captured();

        let mut progress = log.progress("Items", ProgressLayout::TaskCounter).with_total(3);
        for _ in 0..3 {
            progress.advance(1);
        }
        assert!(progress.is_finished());
        progress.finish();

        let out = capture.contents();
        assert!(out.contains("Progress start: Items"));
        assert!(out.contains("3/3 100%"));
        assert!(out.contains("Progress end: Items"));
        let start = out.find("Progress start").unwrap();
        let bar = out.find("3/3").unwrap();
        assert!(start < bar && bar < out.find("Progress end").unwrap());
    }

    #[test]
    fn test_transient_progress_leaves_nothing() {
        let (_facade, capture, log) = captured();

        let mut progress = log
            .progress("Downloading", ProgressLayout::FileTransfer)
            .with_total(1_500)
            .transient(true);
        progress.set_position(1_500);
        progress.finish();

        let out = capture.contents();
        assert!(!out.contains('█'));
        assert!(out.contains("Progress end: Downloading"));
    }

    #[test]
    fn test_drop_finishes_once() {
        let (_facade, _capture, log) = captured();

        {
            let mut progress = log.progress("Working", ProgressLayout::Spinner);
            progress.set_description("Still working");
            assert!(!progress.is_finished());
            assert!(progress.line().starts_with("Still working ["));
        }

        let ends: Vec<String> = log
            .buffer()
            .unwrap()
            .all_entries()
            .into_iter()
            .map(|r| r.message)
            .filter(|m| m.starts_with("Progress end"))
            .collect();
        assert_eq!(ends, vec!["Progress end: Still working".to_string()]);
    }

    #[test]
    fn test_progress_after_shutdown_is_silent() {
        let (facade, capture, log) = captured();
        facade.shutdown();
        capture.clear();

        let mut progress = log.progress("Late", ProgressLayout::TaskCounter).with_total(1);
        progress.advance(1);
        progress.finish();
        assert_eq!(capture.contents(), "");
    }
}

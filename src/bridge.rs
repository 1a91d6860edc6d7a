//! Forward `tracing` events into a configured facade
//!
//! Libraries that log through `tracing` end up in the same sinks as the
//! host's own records:
//!
//! ```no_run
//! use standard_logger::{FacadeLayer, LoggerFacade, LoggerOptions};
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! let facade = LoggerFacade::new();
//! let log = facade.configure(LoggerOptions::new("demo"))?;
//! tracing_subscriber::registry().with(FacadeLayer::new(log)).init();
//! tracing::info!(user = "a", "hello");
//! # Ok::<(), standard_logger::LoggerError>(())
//! ```

use std::cell::Cell;
use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer};

use crate::facade::LoggerHandle;
use crate::record::{Context, Level};

thread_local! {
    /// Set while this thread is inside the layer
    static FORWARDING: Cell<bool> = Cell::new(false);
}

/// Layer that turns `tracing` events into log records
///
/// The event target becomes the logger name, the `message` field the
/// message and every other field a context entry. Events raised while a
/// record is being forwarded on the same thread are ignored.
pub struct FacadeLayer {
    handle: LoggerHandle,
}

impl FacadeLayer {
    pub fn new(handle: LoggerHandle) -> Self {
        Self { handle }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    context: Context,
}

impl FieldVisitor {
    fn record_value<T: serde::Serialize + ?Sized>(&mut self, field: &Field, value: &T) {
        self.context.insert(field.name(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.record_value(field, value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_value(field, &value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_value(field, &value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_value(field, &value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_value(field, &value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record_value(field, &value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.record_value(field, &text);
        }
    }
}

impl<S: Subscriber> Layer<S> for FacadeLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        let level = Level::from(*metadata.level());
        if !self.handle.enabled(level) {
            return;
        }

        let reentered = FORWARDING.with(|flag| flag.replace(true));
        if reentered {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.handle
            .named(metadata.target())
            .log(level, visitor.message.unwrap_or_default(), visitor.context);

        FORWARDING.with(|flag| flag.set(false));
    }
}

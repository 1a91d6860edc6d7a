//! Log records and their building blocks
//!
//! A [`LogRecord`] is created once per log call and handed read-only to every
//! sink. Context values are restricted to what `serde_json::Value` can hold.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Severity of a record, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    /// All levels in ascending order
    pub const ALL: [Level; 6] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    /// Get the display name for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }

    /// Check if this level is a warning or worse (for alerts)
    pub fn is_alert(&self) -> bool {
        *self >= Level::Warning
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` so width/alignment specifiers like {:<8} work
        f.pad(self.as_str())
    }
}

/// Returned when a string does not name a level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARNING" | "WARN" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" | "FATAL" => Ok(Level::Critical),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Field names a context key may not shadow
const RESERVED_KEYS: &[&str] = &["timestamp", "level", "logger", "message", "exception"];

/// Structured key/value data attached to a record
///
/// Keys are kept sorted so every sink sees fields in the same order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, converting it to JSON now
    ///
    /// Empty keys are ignored. Keys naming a record field are stored as
    /// `extra.<key>`. A value that fails to serialize is recorded as a string
    /// describing the failure.
    pub fn insert<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) {
        let key = key.into();
        let key = key.trim();
        if key.is_empty() {
            return;
        }
        let key = if RESERVED_KEYS.contains(&key) {
            format!("extra.{}", key)
        } else {
            key.to_string()
        };
        let value = serde_json::to_value(value)
            .unwrap_or_else(|e| Value::String(format!("<unserializable: {}>", e)));
        self.0.insert(key, value);
    }

    /// Builder form of [`Context::insert`]
    pub fn with<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.insert(key, value);
        self
    }

    /// Add every entry of `other`, overriding existing keys
    pub fn extend(&mut self, other: &Context) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Render a context value the way humans read it: strings raw, the rest as JSON
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a [`Context`] inline
///
/// ```
/// use standard_logger::context;
/// let ctx = context! { "user" => "a", "attempt" => 3 };
/// assert_eq!(ctx.len(), 2);
/// ```
#[macro_export]
macro_rules! context {
    () => {
        $crate::Context::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut ctx = $crate::Context::new();
        $( ctx.insert($key, &$value); )+
        ctx
    }};
}

/// A captured error with its cause chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionInfo {
    /// Type name of the top-level error
    #[serde(rename = "type")]
    pub type_name: String,
    pub message: String,
    /// Messages of `source()` errors, outermost first
    pub causes: Vec<String>,
    /// Source location, known for panics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Backtrace lines, if one was captured
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backtrace: Vec<String>,
}

impl ExceptionInfo {
    /// Capture an error and walk its `source()` chain
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            type_name: short_type_name(std::any::type_name::<E>()),
            message: error.to_string(),
            causes,
            location: None,
            backtrace: Vec::new(),
        }
    }

    /// Describe a panic from its payload message and location
    pub fn panic(message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            type_name: "panic".to_string(),
            message: message.into(),
            causes: Vec::new(),
            location,
            backtrace: Vec::new(),
        }
    }

    /// Attach a backtrace; no-op when the backtrace was not captured
    pub fn with_backtrace(mut self, backtrace: &std::backtrace::Backtrace) -> Self {
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            self.backtrace = backtrace
                .to_string()
                .lines()
                .map(|l| l.trim_end().to_string())
                .filter(|l| !l.is_empty())
                .collect();
        }
        self
    }

    /// Lines of the traceback block in display order
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(2 + self.causes.len() + self.backtrace.len());
        lines.push("Traceback (outermost first):".to_string());
        lines.push(format!("  {}: {}", self.type_name, self.message));
        if let Some(location) = &self.location {
            lines.push(format!("  at {}", location));
        }
        for cause in &self.causes {
            lines.push(format!("  Caused by: {}", cause));
        }
        for frame in &self.backtrace {
            lines.push(format!("    {}", frame.trim_start()));
        }
        lines
    }
}

/// `alloc::string::String` -> `String`, `dyn std::error::Error` stays readable
fn short_type_name(full: &str) -> String {
    let full = full.trim_start_matches("dyn ");
    match full.split('<').next() {
        Some(head) => {
            let tail = &full[head.len()..];
            let head = head.rsplit("::").next().unwrap_or(head);
            format!("{}{}", head, tail)
        }
        None => full.to_string(),
    }
}

/// One log event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    /// Name of the logger (usually a module path or subsystem)
    pub logger: String,
    pub message: String,
    pub context: Context,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
}

impl LogRecord {
    /// Create a new record stamped with the current time
    pub fn new(level: Level, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            logger: logger.into(),
            message: message.into(),
            context: Context::new(),
            exception: None,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Serialize as one line of JSON (no trailing newline)
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            // Context values are already JSON, so this only trips on exotic input
            format!(
                "{{\"level\":\"{}\",\"message\":\"<unserializable record: {}>\"}}",
                self.level.as_str(),
                e
            )
        })
    }
}

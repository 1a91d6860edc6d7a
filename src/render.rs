//! Record rendering for the console and text files
//!
//! [`ConsoleRenderer`] produces the human-readable form of a record. Color is
//! a styling pass over the same pieces of text, so plain and colored output
//! always carry the same information.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, SecondsFormat};
use crossterm::style::Stylize;

use crate::config::DEFAULT_CONSOLE_TIME_FORMAT;
use crate::record::{display_value, ExceptionInfo, Level, LogRecord};

/// Default console layout
pub const DEFAULT_CONSOLE_TEMPLATE: &str = "[{timestamp}] {level} {logger}: {message} {context}";

/// Default layout for text log files
pub const DEFAULT_FILE_TEMPLATE: &str = "{timestamp} | {level} | {logger} - {message} {context}";

/// Strategy that turns a record into display text
pub trait Render: Send + Sync {
    fn render(&self, record: &LogRecord, color_enabled: bool) -> String;
}

/// A record field a template can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    Level,
    Logger,
    Message,
    Context,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "timestamp" => Some(Field::Timestamp),
            "level" => Some(Field::Level),
            "logger" => Some(Field::Logger),
            "message" => Some(Field::Message),
            "context" => Some(Field::Context),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Field(Field),
}

/// A parsed line layout such as `"{level} {message}"`
///
/// `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    /// Parse a template, rejecting unknown placeholders and stray braces
    pub fn parse(source: &str) -> Result<Self, String> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(format!("unclosed placeholder '{{{}'", name));
                    }
                    let field = Field::from_name(name.trim())
                        .ok_or_else(|| format!("unknown placeholder '{{{}}}'", name))?;
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Field(field));
                }
                '}' => return Err("unmatched '}'".to_string()),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(Self { pieces })
    }

    /// Fields referenced by this template, in order
    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.pieces.iter().filter_map(|p| match p {
            Piece::Field(f) => Some(*f),
            Piece::Literal(_) => None,
        })
    }

    /// Render the first line of a record
    ///
    /// `style` receives each field's plain text and returns what to emit.
    /// Trailing whitespace left by an empty context is trimmed.
    pub fn render_line(
        &self,
        record: &LogRecord,
        timestamp: &str,
        style: &dyn Fn(Field, &str) -> String,
    ) -> String {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Field(field) => {
                    let plain = match field {
                        Field::Timestamp => timestamp.to_string(),
                        Field::Level => record.level.as_str().to_string(),
                        Field::Logger => record.logger.clone(),
                        Field::Message => record.message.clone(),
                        Field::Context => format_context(record),
                    };
                    if !plain.is_empty() {
                        out.push_str(&style(*field, &plain));
                    }
                }
            }
        }
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        out
    }
}

impl Default for Template {
    fn default() -> Self {
        Self {
            pieces: vec![
                Piece::Literal("[".into()),
                Piece::Field(Field::Timestamp),
                Piece::Literal("] ".into()),
                Piece::Field(Field::Level),
                Piece::Literal(" ".into()),
                Piece::Field(Field::Logger),
                Piece::Literal(": ".into()),
                Piece::Field(Field::Message),
                Piece::Literal(" ".into()),
                Piece::Field(Field::Context),
            ],
        }
    }
}

/// `{k=v, k2=v2}`, or empty when the record has no context
pub fn format_context(record: &LogRecord) -> String {
    if record.context.is_empty() {
        return String::new();
    }
    let body: Vec<String> = record
        .context
        .iter()
        .map(|(k, v)| format!("{}={}", k, display_value(v)))
        .collect();
    format!("{{{}}}", body.join(", "))
}

/// Check a chrono format string without panicking on bad specifiers
pub fn validate_time_format(format: &str) -> Result<(), String> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        Err(format!("invalid time format '{}'", format))
    } else {
        Ok(())
    }
}

/// RFC 3339 UTC timestamp with milliseconds, used by file output
pub fn file_timestamp(record: &LogRecord) -> String {
    record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Plain (never colored) renderer for text log files
pub fn render_plain(template: &Template, record: &LogRecord) -> String {
    let mut out = template.render_line(record, &file_timestamp(record), &|_, text| text.to_string());
    if let Some(exception) = &record.exception {
        for line in exception.lines() {
            out.push('\n');
            out.push_str(&line);
        }
    }
    out
}

/// Renderer used by the console sink
#[derive(Debug, Clone)]
pub struct ConsoleRenderer {
    template: Template,
    time_format: String,
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self {
            template: Template::default(),
            time_format: DEFAULT_CONSOLE_TIME_FORMAT.to_string(),
        }
    }
}

impl ConsoleRenderer {
    pub fn new(template: Template, time_format: impl Into<String>) -> Self {
        Self {
            template,
            time_format: time_format.into(),
        }
    }

    fn timestamp(&self, record: &LogRecord) -> String {
        let mut out = String::new();
        // Writing into a String only fails on a bad format string
        if write!(
            out,
            "{}",
            record.timestamp.with_timezone(&Local).format(&self.time_format)
        )
        .is_err()
        {
            out = file_timestamp(record);
        }
        out
    }
}

impl Render for ConsoleRenderer {
    fn render(&self, record: &LogRecord, color_enabled: bool) -> String {
        let timestamp = self.timestamp(record);
        let level = record.level;
        let mut out = if color_enabled {
            self.template
                .render_line(record, &timestamp, &|field, text| style_field(field, level, text))
        } else {
            self.template
                .render_line(record, &timestamp, &|_, text| text.to_string())
        };

        if let Some(exception) = &record.exception {
            for line in traceback_lines(exception, color_enabled) {
                out.push('\n');
                out.push_str(&line);
            }
        }
        out
    }
}

fn style_level(level: Level, text: &str) -> String {
    match level {
        Level::Trace | Level::Debug => text.dim().to_string(),
        Level::Info => text.green().to_string(),
        Level::Warning => text.yellow().to_string(),
        Level::Error => text.red().bold().to_string(),
        Level::Critical => text.red().bold().reverse().to_string(),
    }
}

fn style_field(field: Field, level: Level, text: &str) -> String {
    match field {
        Field::Timestamp => text.dim().to_string(),
        Field::Level => style_level(level, text),
        Field::Logger => text.cyan().to_string(),
        Field::Message if level.is_alert() => style_level(level, text),
        Field::Message => text.to_string(),
        Field::Context => text.dim().to_string(),
    }
}

/// Traceback block, with frame locations highlighted when colored
fn traceback_lines(exception: &ExceptionInfo, color_enabled: bool) -> Vec<String> {
    let lines = exception.lines();
    if !color_enabled {
        return lines;
    }
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| match i {
            0 => line.as_str().bold().to_string(),
            1 => line.as_str().red().bold().to_string(),
            _ if line.trim_start().starts_with("Caused by:") => line.as_str().yellow().to_string(),
            _ => highlight_frame(line),
        })
        .collect()
}

/// Highlight `at path/to/file.rs:12:5` locations inside a backtrace line
pub fn highlight_frame(line: &str) -> String {
    let trimmed = line.trim_start();
    if !trimmed.starts_with("at ") {
        return line.dim().to_string();
    }
    let (head, location) = line.split_at(line.len() - trimmed.len() + 3);
    let mut parts = location.rsplitn(3, ':');
    let last = parts.next().unwrap_or_default();
    let middle = parts.next();
    let rest = parts.next();

    let is_num = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    let styled_location = match (rest, middle) {
        (Some(path), Some(line_no)) if is_num(line_no) && is_num(last) => format!(
            "{}:{}:{}",
            path.magenta(),
            line_no.yellow().bold(),
            last.yellow()
        ),
        (None, Some(path)) if is_num(last) => {
            format!("{}:{}", path.magenta(), last.yellow().bold())
        }
        _ => location.magenta().to_string(),
    };
    format!("{}{}", head.dim(), styled_location)
}

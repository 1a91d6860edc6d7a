//! Configuration for the logger facade

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoggerError;
use crate::record::Level;

/// Ten mebibytes
pub const DEFAULT_ROTATION_SIZE: u64 = 10 * 1024 * 1024;

/// Number of archived files kept next to the active log file
pub const DEFAULT_ROTATION_COUNT: usize = 5;

/// Console timestamp format (local time)
pub const DEFAULT_CONSOLE_TIME_FORMAT: &str = "%H:%M:%S%.3f";

/// When the console sink emits ANSI styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color when the stream is a terminal and `NO_COLOR` is unset
    #[default]
    Auto,
    Always,
    Never,
}

/// Standard stream used by the console sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    #[default]
    Stderr,
    Stdout,
}

/// On-disk encoding of file sink records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Lines rendered from a template
    Text,
}

impl FileFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Json => "jsonl",
            FileFormat::Text => "log",
        }
    }
}

/// Options accepted by [`crate::LoggerFacade::configure`]
///
/// Every field except `app_name` has a default, so a TOML file can be as
/// small as `app_name = "demo"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggerOptions {
    /// Application name, used for the log directory and file name
    pub app_name: String,

    /// Minimum level for every sink unless overridden below (default: INFO)
    #[serde(default = "default_min_level")]
    pub min_level: Level,

    /// Console-only level override
    #[serde(default)]
    pub console_level: Option<Level>,

    /// File-only level override
    #[serde(default)]
    pub file_level: Option<Level>,

    /// Use this directory instead of the platform log directory
    #[serde(default)]
    pub log_dir_override: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub console_enabled: bool,

    #[serde(default = "default_true")]
    pub file_enabled: bool,

    /// Rotate once the active file would grow past this many bytes
    #[serde(default = "default_rotation_size")]
    pub rotation_size: u64,

    /// Also rotate once the active file is this old (seconds)
    #[serde(default)]
    pub rotation_age_secs: Option<u64>,

    /// Archived files kept; older ones are deleted
    #[serde(default = "default_rotation_count")]
    pub rotation_count: usize,

    /// Delete archives older than this many days
    #[serde(default)]
    pub retention_days: Option<u64>,

    #[serde(default)]
    pub color_mode: ColorMode,

    #[serde(default)]
    pub console_stream: ConsoleStream,

    /// chrono format string for console timestamps
    #[serde(default = "default_console_time_format")]
    pub console_time_format: String,

    #[serde(default)]
    pub file_format: FileFormat,

    /// Line template for text file output
    #[serde(default)]
    pub file_template: Option<String>,

    /// Keep this many recent records in memory (see [`crate::LogBuffer`])
    #[serde(default)]
    pub buffer_capacity: Option<usize>,

    /// Fail `configure` instead of degrading to console-only when no log
    /// directory can be established
    #[serde(default)]
    pub strict_paths: bool,

    /// Log panics at CRITICAL through the configured sinks
    #[serde(default)]
    pub panic_hook: bool,
}

fn default_min_level() -> Level {
    Level::Info
}

fn default_true() -> bool {
    true
}

fn default_rotation_size() -> u64 {
    DEFAULT_ROTATION_SIZE
}

fn default_rotation_count() -> usize {
    DEFAULT_ROTATION_COUNT
}

fn default_console_time_format() -> String {
    DEFAULT_CONSOLE_TIME_FORMAT.to_string()
}

impl LoggerOptions {
    /// Options with defaults for everything but the application name
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            min_level: default_min_level(),
            console_level: None,
            file_level: None,
            log_dir_override: None,
            console_enabled: true,
            file_enabled: true,
            rotation_size: default_rotation_size(),
            rotation_age_secs: None,
            rotation_count: default_rotation_count(),
            retention_days: None,
            color_mode: ColorMode::default(),
            console_stream: ConsoleStream::default(),
            console_time_format: default_console_time_format(),
            file_format: FileFormat::default(),
            file_template: None,
            buffer_capacity: None,
            strict_paths: false,
            panic_hook: false,
        }
    }

    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, LoggerError> {
        toml::from_str(content).map_err(|e| LoggerError::ConfigFile {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })
    }

    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self, LoggerError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoggerError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let options: Self = toml::from_str(&content).map_err(|e| LoggerError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), app = %options.app_name, "Loaded logger options");
        Ok(options)
    }

    /// Effective console threshold
    pub fn console_threshold(&self) -> Level {
        self.console_level.unwrap_or(self.min_level)
    }

    /// Effective file threshold
    pub fn file_threshold(&self) -> Level {
        self.file_level.unwrap_or(self.min_level)
    }

    // Builder-style setters for the common knobs

    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir_override = Some(dir.into());
        self
    }

    pub fn console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    pub fn file(mut self, enabled: bool) -> Self {
        self.file_enabled = enabled;
        self
    }

    pub fn rotation(mut self, size: u64, count: usize) -> Self {
        self.rotation_size = size;
        self.rotation_count = count;
        self
    }

    pub fn color(mut self, mode: ColorMode) -> Self {
        self.color_mode = mode;
        self
    }

    pub fn file_format(mut self, format: FileFormat) -> Self {
        self.file_format = format;
        self
    }

    pub fn buffer(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    pub fn panic_hook(mut self, enabled: bool) -> Self {
        self.panic_hook = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_options() {
        let options = LoggerOptions::new("demo");
        assert_eq!(options.min_level, Level::Info);
        assert!(options.console_enabled);
        assert!(options.file_enabled);
        assert_eq!(options.rotation_size, 10 * 1024 * 1024);
        assert_eq!(options.rotation_count, 5);
        assert_eq!(options.color_mode, ColorMode::Auto);
        assert_eq!(options.file_format, FileFormat::Json);
        assert!(!options.panic_hook);
    }

    #[test]
    fn test_minimal_toml() {
        let options = LoggerOptions::from_toml_str("app_name = \"demo\"").unwrap();
        assert_eq!(options, LoggerOptions::new("demo"));
    }

    #[test]
    fn test_full_toml() {
        let content = r#"
            app_name = "svc"
            min_level = "debug"
            file_level = "TRACE"
            console_enabled = false
            rotation_size = 2048
            rotation_count = 2
            rotation_age_secs = 3600
            color_mode = "never"
            console_stream = "stdout"
            file_format = "text"
            file_template = "{level} {message}"
            panic_hook = true
        "#;
        let options = LoggerOptions::from_toml_str(content).unwrap();
        assert_eq!(options.min_level, Level::Debug);
        assert_eq!(options.file_threshold(), Level::Trace);
        assert_eq!(options.console_threshold(), Level::Debug);
        assert!(!options.console_enabled);
        assert_eq!(options.rotation_size, 2048);
        assert_eq!(options.rotation_age_secs, Some(3600));
        assert_eq!(options.color_mode, ColorMode::Never);
        assert_eq!(options.console_stream, ConsoleStream::Stdout);
        assert_eq!(options.file_format, FileFormat::Text);
        assert!(options.panic_hook);
    }

    #[test]
    fn test_unknown_level_rejected() {
        let err = LoggerOptions::from_toml_str("app_name = \"x\"\nmin_level = \"loud\"");
        assert!(matches!(err, Err(LoggerError::ConfigFile { .. })));
    }

    #[test]
    fn test_missing_app_name_rejected() {
        assert!(LoggerOptions::from_toml_str("min_level = \"info\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logging.toml");
        let options = LoggerOptions::new("demo").min_level(Level::Warning);
        std::fs::write(&path, toml::to_string_pretty(&options).unwrap()).unwrap();

        let loaded = LoggerOptions::load(&path).unwrap();
        assert_eq!(loaded.min_level, Level::Warning);
    }

    #[test]
    fn test_load_missing_file() {
        let err = LoggerOptions::load(Path::new("/nonexistent/logging.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/logging.toml"));
    }
}

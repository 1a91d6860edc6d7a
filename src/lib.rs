//! standard_logger - Opinionated logging setup for applications
//!
//! Configure a [`LoggerFacade`] once at startup and log through cloneable
//! [`LoggerHandle`]s. Records go to a colorized console, a rotating JSON (or
//! text) file in the platform's log directory, and optionally an in-memory
//! [`LogBuffer`].

pub mod bridge;
pub mod config;
pub mod decor;
pub mod error;
pub mod facade;
pub mod paths;
pub mod progress;
pub mod record;
pub mod render;
pub mod sink;

pub use bridge::FacadeLayer;
pub use config::{ColorMode, ConsoleStream, FileFormat, LoggerOptions};
pub use decor::{Align, ProgressLayout};
pub use error::{
    DiskErrorKind, InvalidSinkConfigError, LoggerError, PathResolutionError, SinkWriteError,
};
pub use facade::{FacadeState, LoggerFacade, LoggerHandle};
pub use paths::{DirectorySource, LogDirectory};
pub use progress::Progress;
pub use record::{Context, ExceptionInfo, Level, LogRecord, ParseLevelError};
pub use render::{ConsoleRenderer, Render, Template};
pub use sink::{
    CaptureBuffer, ConsoleTarget, LogBuffer, RotationPolicy, Sink, SinkBuilder, SinkConfig,
    SinkHandle, SinkKind,
};

//! Rotating file sink
//!
//! Writes one record per line, as JSON or as a plain text template, and
//! rotates the active file by size and optionally by age.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::config::FileFormat;
use crate::error::SinkWriteError;
use crate::record::{Level, LogRecord};
use crate::render::{render_plain, Template, DEFAULT_FILE_TEMPLATE};

use super::rotation;
use super::{RotationPolicy, Sink};

struct RotationState {
    file: Option<File>,
    /// Bytes in the active file
    size: u64,
    opened_at: SystemTime,
    closed: bool,
}

/// Sink that appends records to a file in the log directory
pub struct FileSink {
    name: String,
    min_level: Level,
    path: PathBuf,
    format: FileFormat,
    template: Template,
    policy: RotationPolicy,
    state: Mutex<RotationState>,
}

fn open_append(path: &Path) -> io::Result<(File, u64, SystemTime)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let metadata = file.metadata()?;
    let opened_at = metadata
        .created()
        .or_else(|_| metadata.modified())
        .unwrap_or_else(|_| SystemTime::now());
    Ok((file, metadata.len(), opened_at))
}

impl FileSink {
    /// Open (or create) the active file in append mode
    ///
    /// Archives beyond the policy's `keep` and archives past retention are
    /// removed here as well.
    pub fn open(
        name: &str,
        min_level: Level,
        path: PathBuf,
        format: FileFormat,
        template: Option<Template>,
        policy: RotationPolicy,
    ) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let (file, size, opened_at) = open_append(&path)?;

        let _ = rotation::prune_excess(&path, policy.keep);
        if let Some(retention) = policy.retention {
            let _ = rotation::remove_expired(&path, retention);
        }

        let template = match template {
            Some(template) => template,
            None => Template::parse(DEFAULT_FILE_TEMPLATE).unwrap_or_default(),
        };

        Ok(Self {
            name: name.to_string(),
            min_level,
            path,
            format,
            template,
            policy,
            state: Mutex::new(RotationState {
                file: Some(file),
                size,
                opened_at,
                closed: false,
            }),
        })
    }

    /// Path of the active file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn format_line(&self, record: &LogRecord) -> String {
        let mut line = match self.format {
            FileFormat::Json => record.to_json_line(),
            FileFormat::Text => render_plain(&self.template, record),
        };
        line.push('\n');
        line
    }

    fn needs_rotation(&self, state: &RotationState, incoming: u64) -> bool {
        if state.size > 0 && state.size + incoming > self.policy.max_bytes {
            return true;
        }
        match self.policy.max_age {
            Some(max_age) if state.size > 0 => state
                .opened_at
                .elapsed()
                .map_or(false, |age| age >= max_age),
            _ => false,
        }
    }

    /// Rotate and reopen; on failure the active file is reopened as-is
    fn rotate(&self, state: &mut RotationState) -> Result<(), SinkWriteError> {
        state.file = None;
        let rotated = rotation::rotate(&self.path, self.policy.keep);
        if rotated.is_ok() {
            if let Some(retention) = self.policy.retention {
                let _ = rotation::remove_expired(&self.path, retention);
            }
        }

        let (file, size, opened_at) =
            open_append(&self.path).map_err(|e| SinkWriteError::io(&self.name, &e))?;
        state.file = Some(file);
        state.size = size;
        state.opened_at = if rotated.is_ok() {
            SystemTime::now()
        } else {
            opened_at
        };
        rotated.map_err(|e| SinkWriteError::io(&self.name, &e))
    }
}

impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkWriteError> {
        let line = self.format_line(record);
        let incoming = line.len() as u64;

        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkWriteError::internal(&self.name, "file lock poisoned"))?;
        if state.closed {
            return Err(SinkWriteError::internal(&self.name, "file sink is closed"));
        }

        // A rotation error is reported only after the record is written
        let mut deferred = None;
        if state.file.is_none() {
            let (file, size, opened_at) =
                open_append(&self.path).map_err(|e| SinkWriteError::io(&self.name, &e))?;
            state.file = Some(file);
            state.size = size;
            state.opened_at = opened_at;
        }
        if self.needs_rotation(&state, incoming) {
            if let Err(e) = self.rotate(&mut state) {
                if state.file.is_none() {
                    return Err(e);
                }
                deferred = Some(e);
            }
        }

        let write = match state.file.as_mut() {
            Some(file) => file.write_all(line.as_bytes()).and_then(|_| file.flush()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "active file missing")),
        };
        match write {
            Ok(()) => {
                state.size += incoming;
                deferred.map_or(Ok(()), Err)
            }
            Err(e) => {
                // Reopen on the next record
                state.file = None;
                Err(SinkWriteError::io(&self.name, &e))
            }
        }
    }

    fn flush(&self) -> Result<(), SinkWriteError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkWriteError::internal(&self.name, "file lock poisoned"))?;
        match state.file.as_mut() {
            Some(file) => file.flush().map_err(|e| SinkWriteError::io(&self.name, &e)),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<(), SinkWriteError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SinkWriteError::internal(&self.name, "file lock poisoned"))?;
        state.closed = true;
        match state.file.take() {
            Some(mut file) => file.flush().map_err(|e| SinkWriteError::io(&self.name, &e)),
            None => Ok(()),
        }
    }
}

//! In-memory log buffer for real-time viewing
//!
//! Provides a thread-safe ring buffer that keeps the most recent records so a
//! host UI can display them without reading log files back.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use crate::error::SinkWriteError;
use crate::record::{Level, LogRecord};

use super::Sink;

/// Thread-safe ring buffer for storing log records
#[derive(Debug)]
pub struct LogBuffer {
    /// All records (capped at max_entries)
    entries: RwLock<VecDeque<LogRecord>>,
    /// Warnings and worse only
    alerts: RwLock<VecDeque<LogRecord>>,
    max_entries: usize,
    max_alerts: usize,
}

impl LogBuffer {
    /// Create a new log buffer with specified capacities
    pub fn new(max_entries: usize, max_alerts: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries)),
            alerts: RwLock::new(VecDeque::with_capacity(max_alerts)),
            max_entries,
            max_alerts,
        }
    }

    /// Maximum number of records kept
    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    /// Push a new record to the buffer
    pub fn push(&self, record: LogRecord) {
        if record.level.is_alert() && self.max_alerts > 0 {
            if let Ok(mut alerts) = self.alerts.write() {
                if alerts.len() >= self.max_alerts {
                    alerts.pop_front();
                }
                alerts.push_back(record.clone());
            }
        }

        if self.max_entries == 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() >= self.max_entries {
                entries.pop_front();
            }
            entries.push_back(record);
        }
    }

    /// Get all records, oldest first
    pub fn all_entries(&self) -> Vec<LogRecord> {
        self.entries
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get pending alerts (warnings and worse)
    pub fn pending_alerts(&self) -> Vec<LogRecord> {
        self.alerts
            .read()
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().map(|a| a.len()).unwrap_or(0)
    }

    /// Clear all alerts (after they've been acknowledged)
    pub fn clear_alerts(&self) {
        if let Ok(mut alerts) = self.alerts.write() {
            alerts.clear();
        }
    }
}

/// Sink that appends records to a [`LogBuffer`]
pub struct BufferSink {
    name: String,
    min_level: Level,
    buffer: Arc<LogBuffer>,
}

impl BufferSink {
    pub fn new(name: &str, min_level: Level, buffer: Arc<LogBuffer>) -> Self {
        Self {
            name: name.to_string(),
            min_level,
            buffer,
        }
    }
}

impl Sink for BufferSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_level(&self) -> Level {
        self.min_level
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkWriteError> {
        self.buffer.push(record.clone());
        Ok(())
    }
}

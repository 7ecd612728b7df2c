//! Routing of user-facing messages produced while loading archives.
//!
//! Loaders report problems they recover from (an archive that can't be opened, a variant that isn't supported)
//!     to a [`Diagnostics`] handle they are given at construction, instead of a process-wide logger.
//! By default the messages go to `tracing`; a caller that wants to inspect what happened during a load
//!     passes a [`RecordingSink`] instead.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::Level;

pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, level: Level, message: &str);
}

impl<T: DiagnosticsSink + ?Sized> DiagnosticsSink for Arc<T> {
    fn report(&self, level: Level, message: &str) {
        T::report(self, level, message)
    }
}

/// Forwards every message to the `tracing` event of the same level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, level: Level, message: &str) {
        // the event macros need the level to be known statically
        if level == Level::ERROR {
            tracing::error!("{}", message);
        } else if level == Level::WARN {
            tracing::warn!("{}", message);
        } else if level == Level::INFO {
            tracing::info!("{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!("{}", message);
        } else {
            tracing::trace!("{}", message);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub message: String,
}

/// Keeps every reported message in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Record>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Returns the recorded messages, leaving the sink empty.
    pub fn take(&self) -> Vec<Record> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn has_errors(&self) -> bool {
        self.records.lock().iter().any(|r| r.level == Level::ERROR)
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report(&self, level: Level, message: &str) {
        self.records.lock().push(Record {
            level,
            message: message.to_string(),
        });
    }
}

/// A cheaply clonable handle to a [`DiagnosticsSink`].
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn DiagnosticsSink>,
}

impl Diagnostics {
    pub fn new(sink: impl DiagnosticsSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn from_arc(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { sink }
    }

    pub fn report(&self, level: Level, message: &str) {
        self.sink.report(level, message)
    }

    pub fn error(&self, message: &str) {
        self.report(Level::ERROR, message)
    }

    pub fn warn(&self, message: &str) {
        self.report(Level::WARN, message)
    }

    pub fn info(&self, message: &str) {
        self.report(Level::INFO, message)
    }

    pub fn debug(&self, message: &str) {
        self.report(Level::DEBUG, message)
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

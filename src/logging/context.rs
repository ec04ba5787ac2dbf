//! Logging context and logger handles
//!
//! A `LoggingContext` is created once at process start and shared as an
//! `Arc`. It owns the minimum level and the registered sinks; each sink has
//! its own level filter. Errors from a sink are reported here and never reach
//! the code that issued the log call.

use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::io::{self, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::exception::{self, ExceptionInfo};
use super::record::{Level, LogRecord};
use super::sink::{Sink, SinkError};

/// Called with the sink name, the error and the record that failed
pub type ErrorReporter = Box<dyn Fn(&str, &SinkError, &LogRecord) + Send + Sync>;

/// Print a failed emit to stderr and carry on
pub fn report_to_stderr(sink: &str, error: &SinkError, record: &LogRecord) {
    let mut report = format!("--- Logging error ---\nSink: {}\nError: {}", sink, error);
    let mut source = error.source();
    while let Some(err) = source {
        report.push_str("\nCaused by: ");
        report.push_str(&err.to_string());
        source = err.source();
    }
    report.push_str(&format!(
        "\nLogger: {}\nMessage: {:?}",
        record.logger_name, record.message
    ));

    let _ = writeln!(io::stderr().lock(), "{}", report);
}

struct SinkEntry {
    sink: Arc<dyn Sink>,
    level: Level,
}

/// Registry of sinks shared by every logger of a process
pub struct LoggingContext {
    level: RwLock<Level>,
    sinks: RwLock<Vec<SinkEntry>>,
    reporter: ErrorReporter,
}

impl LoggingContext {
    /// Context with no sinks, dropping records below `level`
    pub fn new(level: Level) -> Self {
        Self {
            level: RwLock::new(level),
            sinks: RwLock::new(Vec::new()),
            reporter: Box::new(report_to_stderr),
        }
    }

    /// Replace the stderr error report
    pub fn with_error_reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&str, &SinkError, &LogRecord) + Send + Sync + 'static,
    {
        self.reporter = Box::new(reporter);
        self
    }

    fn sinks(&self) -> RwLockReadGuard<'_, Vec<SinkEntry>> {
        self.sinks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sinks_mut(&self) -> RwLockWriteGuard<'_, Vec<SinkEntry>> {
        self.sinks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Minimum level a record needs to reach any sink
    pub fn level(&self) -> Level {
        *self.level.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Change the minimum level for subsequent records
    pub fn set_level(&self, level: Level) {
        *self
            .level
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = level;
    }

    pub fn is_enabled_for(&self, level: Level) -> bool {
        level >= self.level()
    }

    /// Register a sink that receives records at or above `level`
    pub fn add_sink(&self, sink: Arc<dyn Sink>, level: Level) {
        self.sinks_mut().push(SinkEntry { sink, level });
    }

    /// Remove every sink registered under `name`; returns whether any was found
    pub fn remove_sink(&self, name: &str) -> bool {
        let mut sinks = self.sinks_mut();
        let before = sinks.len();
        sinks.retain(|entry| entry.sink.name() != name);
        sinks.len() != before
    }

    /// Change the level filter of the sinks registered under `name`
    pub fn set_sink_level(&self, name: &str, level: Level) -> bool {
        let mut found = false;
        for entry in self.sinks_mut().iter_mut() {
            if entry.sink.name() == name {
                entry.level = level;
                found = true;
            }
        }
        found
    }

    /// Number of registered sinks
    pub fn sink_count(&self) -> usize {
        self.sinks().len()
    }

    /// Hand `record` to every sink whose level admits it
    ///
    /// Sinks run one after another in registration order. A failing sink is
    /// reported and skipped; the others still see the record.
    pub fn dispatch(&self, record: &LogRecord) {
        if !self.is_enabled_for(record.level) {
            return;
        }

        // Snapshot so a sink that logs does not re-enter the lock
        let targets: Vec<Arc<dyn Sink>> = self
            .sinks()
            .iter()
            .filter(|entry| record.level >= entry.level)
            .map(|entry| Arc::clone(&entry.sink))
            .collect();

        for sink in targets {
            if let Err(err) = sink.emit(record) {
                (self.reporter)(sink.name(), &err, record);
            }
        }
    }

    /// Flush every sink, reporting failures to stderr
    pub fn flush(&self) {
        let sinks: Vec<Arc<dyn Sink>> = self
            .sinks()
            .iter()
            .map(|entry| Arc::clone(&entry.sink))
            .collect();
        for sink in sinks {
            if let Err(err) = sink.flush() {
                let _ = writeln!(
                    io::stderr().lock(),
                    "--- Logging error ---\nSink: {}\nError: {} (during flush)",
                    sink.name(),
                    err
                );
            }
        }
    }

    /// Named logger dispatching through this context
    pub fn logger(self: &Arc<Self>, name: impl Into<String>) -> Logger {
        Logger {
            name: Arc::from(name.into()),
            context: Arc::clone(self),
        }
    }
}

/// Cheap, cloneable handle that stamps records with a logger name
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    context: Arc<LoggingContext>,
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<LoggingContext> {
        &self.context
    }

    pub fn is_enabled_for(&self, level: Level) -> bool {
        self.context.is_enabled_for(level)
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        if !self.is_enabled_for(level) {
            return;
        }
        self.context
            .dispatch(&LogRecord::new(level, self.name.as_ref(), message));
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }

    pub fn critical(&self, message: impl Into<String>) {
        self.log(Level::Critical, message);
    }

    /// Log at ERROR with `error` attached, treating it as the handled exception
    ///
    /// While the record is dispatched `error` is also the thread's current
    /// exception, so the task bridge reports its status code.
    pub fn exception(&self, error: impl Into<ExceptionInfo>, message: impl Into<String>) {
        if !self.is_enabled_for(Level::Error) {
            return;
        }
        let error = error.into();
        let _handling = exception::handling(error.clone());
        let record =
            LogRecord::new(Level::Error, self.name.as_ref(), message).with_exception(error);
        self.context.dispatch(&record);
    }

    /// Log with the caller's stack attached
    pub fn with_stack(&self, level: Level, message: impl Into<String>) {
        if !self.is_enabled_for(level) {
            return;
        }
        let record = LogRecord::new(level, self.name.as_ref(), message)
            .with_stack_info(Backtrace::force_capture().to_string());
        self.context.dispatch(&record);
    }
}

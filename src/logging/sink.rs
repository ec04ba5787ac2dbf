//! Sink trait and the errors a sink can report
//!
//! A sink never returns its errors to the code that issued the log call.
//! `LoggingContext` catches them and hands them to its error reporter.

use std::path::PathBuf;

use thiserror::Error;

use super::record::LogRecord;

/// Errors raised while a sink handles one record
#[derive(Debug, Error)]
pub enum SinkError {
    /// The path template contains a directive chrono cannot render
    #[error("invalid path template '{0}'")]
    Template(String),

    /// The record could not be rendered
    #[error("failed to format record")]
    Format(#[from] std::fmt::Error),

    /// The log directory could not be created and does not exist
    #[error("failed to create log directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The log file could not be opened
    #[error("failed to open log file {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or flushing the output failed
    #[error("failed to write log output")]
    Write(#[from] std::io::Error),

    /// The task-control channel rejected the message
    #[error("task channel error")]
    Channel(#[source] anyhow::Error),
}

/// Receives records and performs an external effect
pub trait Sink: Send + Sync {
    /// Short name used in error reports
    fn name(&self) -> &str;

    /// Handle one record
    fn emit(&self, record: &LogRecord) -> Result<(), SinkError>;

    /// Push any buffered output to its destination
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

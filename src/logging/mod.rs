//! Logging for tasks under the task-control system
//!
//! Records from a [`Logger`] (or from `tracing` macros through
//! [`ContextLayer`]) go through a [`LoggingContext`] to its sinks:
//!
//! - [`StrftimeFileSink`]: appends to a file whose path is a strftime template
//!   of the record time, rolling over whenever that path changes
//! - [`BridgeSink`]: forwards to the task's status or error channel by severity
//! - [`ConsoleSink`]: plain text to stderr
//!
//! ```ignore
//! use drama_log::logging::{self, StatusException};
//!
//! let (context, _sinks) = logging::setup(Some("MYTASK"), channel);
//! logging::install(context.clone())?;
//!
//! let log = context.logger("MYTASK");
//! log.info("task started");
//! log.exception(StatusException::new("no such action", 42), "obey failed");
//! ```

pub mod bridge;
pub mod console;
pub mod context;
pub mod exception;
pub mod format;
pub mod layer;
pub mod record;
pub mod setup;
pub mod sink;
pub mod strftime_sink;

pub use bridge::{BridgeSink, TaskChannel, DEFAULT_THRESHOLD};
pub use console::ConsoleSink;
pub use context::{report_to_stderr, ErrorReporter, Logger, LoggingContext};
pub use exception::{handling, ExceptionInfo, HandlingGuard, StatusException};
pub use format::{
    parse_line, ExceptionAwareFormatter, Formatter, Layout, ParsedLine, TextFormatter,
    DEFAULT_TIME_FORMAT,
};
pub use layer::{install, ContextLayer};
pub use record::{Level, LogRecord};
pub use setup::{setup, setup_with_config, SinkHandles};
pub use sink::{Sink, SinkError};
pub use strftime_sink::{resolve_path, StrftimeFileSink};

//! Log records and severity levels
//!
//! A `LogRecord` is built once per log call and handed read-only to every sink.

use std::cell::RefCell;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::exception::ExceptionInfo;

/// Ordered log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
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
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" | "FATAL" => Ok(Level::Critical),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = String;

    fn try_from(s: String) -> Result<Self, String> {
        s.parse()
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.as_str().to_string()
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

/// A single log record
#[derive(Debug)]
pub struct LogRecord {
    /// When the record was created
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: Level,
    /// Name of the logger that produced the record
    pub logger_name: String,
    /// Rendered message text
    pub message: String,
    /// Error attached to the log call, if any
    pub exception: Option<ExceptionInfo>,
    /// Stack captured at the call site, if requested
    pub stack_info: Option<String>,
    /// Exception text cached by the first formatter that rendered it
    exc_text: RefCell<Option<String>>,
}

impl LogRecord {
    /// Create a record stamped with the current time
    pub fn new(level: Level, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::at(Utc::now(), level, logger_name, message)
    }

    /// Create a record with an explicit timestamp
    pub fn at(
        timestamp: DateTime<Utc>,
        level: Level,
        logger_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            exception: None,
            stack_info: None,
            exc_text: RefCell::new(None),
        }
    }

    /// Attach an exception
    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Attach captured stack text
    pub fn with_stack_info(mut self, stack: impl Into<String>) -> Self {
        self.stack_info = Some(stack.into());
        self
    }

    /// Creation time as float seconds since the Unix epoch
    pub fn created(&self) -> f64 {
        self.timestamp.timestamp() as f64
            + f64::from(self.timestamp.timestamp_subsec_nanos()) / 1e9
    }

    /// Cached exception text, if a formatter has rendered it
    pub fn exc_text(&self) -> Option<String> {
        self.exc_text.borrow().clone()
    }

    pub(crate) fn set_exc_text(&self, text: String) {
        *self.exc_text.borrow_mut() = Some(text);
    }

    /// Drop the cached exception text so the next formatter renders its own
    pub fn clear_exc_text(&self) {
        self.exc_text.borrow_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
        assert!(Level::Error < Level::Critical);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("info".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("Warning".parse::<Level>().unwrap(), Level::Warning);
        assert_eq!("fatal".parse::<Level>().unwrap(), Level::Critical);
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(Level::from(tracing::Level::WARN), Level::Warning);
        assert_eq!(Level::from(tracing::Level::TRACE), Level::Trace);
    }

    #[test]
    fn test_created_keeps_subseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        let record = LogRecord::at(ts, Level::Info, "task", "hello");
        assert!((record.created() - 1_700_000_000.25).abs() < 1e-6);
    }

    #[test]
    fn test_exc_text_cache() {
        let record = LogRecord::new(Level::Error, "task", "boom");
        assert!(record.exc_text().is_none());

        record.set_exc_text("cached".to_string());
        assert_eq!(record.exc_text().as_deref(), Some("cached"));

        record.clear_exc_text();
        assert!(record.exc_text().is_none());
    }
}

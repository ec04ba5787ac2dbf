//! Record formatting
//!
//! A `Layout` renders the first line of a record from a pattern such as
//! `"{asctime} {levelname} {name}: {message}"`. A `Formatter` adds exception
//! and stack text below it. `ExceptionAwareFormatter` keeps that extra text
//! short for the task-control channels; full traces belong in the file sink.

use std::error::Error as StdError;
use std::fmt::{self, Write};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

use super::exception::ExceptionInfo;
use super::record::{Level, LogRecord};

/// Console and file layout
pub const DETAILED_PATTERN: &str = "{asctime} {levelname} {name}: {message}";

/// Task-control channel layout
pub const BRIEF_PATTERN: &str = "{levelname}:{message}";

/// Default `{asctime}` rendering, millisecond precision
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Errors found while parsing a layout pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unknown placeholder '{{{0}}}' in layout pattern")]
    UnknownPlaceholder(String),

    #[error("unclosed '{{' in layout pattern")]
    Unclosed,

    #[error("invalid time format '{0}'")]
    TimeFormat(String),
}

/// Check a strftime format string for directives chrono does not understand
pub fn is_valid_strftime(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    AscTime,
    Created,
    LevelName,
    Name,
    Message,
}

/// Pattern used to render the first line of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    tokens: Vec<Token>,
    time_format: String,
    utc: bool,
}

impl Layout {
    /// Parse a pattern; `{{` and `}}` are literal braces
    pub fn parse(pattern: &str) -> Result<Self, LayoutError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

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
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => return Err(LayoutError::Unclosed),
                        }
                    }
                    let token = match name.as_str() {
                        "asctime" => Token::AscTime,
                        "created" => Token::Created,
                        "levelname" => Token::LevelName,
                        "name" => Token::Name,
                        "message" => Token::Message,
                        _ => return Err(LayoutError::UnknownPlaceholder(name)),
                    };
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(token);
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            tokens,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            utc: false,
        })
    }

    /// `"{asctime} {levelname} {name}: {message}"`
    pub fn detailed() -> Self {
        Self {
            tokens: vec![
                Token::AscTime,
                Token::Literal(" ".to_string()),
                Token::LevelName,
                Token::Literal(" ".to_string()),
                Token::Name,
                Token::Literal(": ".to_string()),
                Token::Message,
            ],
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            utc: false,
        }
    }

    /// `"{levelname}:{message}"`
    pub fn brief() -> Self {
        Self {
            tokens: vec![
                Token::LevelName,
                Token::Literal(":".to_string()),
                Token::Message,
            ],
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            utc: false,
        }
    }

    /// Set the chrono format used for `{asctime}`
    pub fn with_time_format(mut self, format: impl Into<String>) -> Result<Self, LayoutError> {
        let format = format.into();
        if !is_valid_strftime(&format) {
            return Err(LayoutError::TimeFormat(format));
        }
        self.time_format = format;
        Ok(self)
    }

    /// Render `{asctime}` in UTC instead of local time
    pub fn with_utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }

    pub fn time_format(&self) -> &str {
        &self.time_format
    }

    /// Whether `{asctime}` is rendered in UTC
    pub fn is_utc(&self) -> bool {
        self.utc
    }

    /// Render the first line of `record`
    pub fn render(&self, record: &LogRecord) -> Result<String, fmt::Error> {
        let mut out = String::with_capacity(64 + record.message.len());
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::AscTime => self.write_time(&mut out, &record.timestamp)?,
                Token::Created => write!(out, "{:.6}", record.created())?,
                Token::LevelName => out.push_str(record.level.as_str()),
                Token::Name => out.push_str(&record.logger_name),
                Token::Message => out.push_str(&record.message),
            }
        }
        Ok(out)
    }

    fn write_time(&self, out: &mut String, timestamp: &DateTime<Utc>) -> fmt::Result {
        if self.utc {
            write!(out, "{}", timestamp.format(&self.time_format))
        } else {
            write!(
                out,
                "{}",
                timestamp.with_timezone(&Local).format(&self.time_format)
            )
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::detailed()
    }
}

/// `"<type>: <message>"` plus one `Caused by:` line per source
fn exception_summary(exception: &ExceptionInfo) -> String {
    let mut out = format!("{}: {}", exception.type_name(), exception.error());
    let mut source = exception.error().source();
    while let Some(err) = source {
        out.push_str("\nCaused by: ");
        out.push_str(&err.to_string());
        source = err.source();
    }
    out
}

/// Turns records into text
pub trait Formatter: Send + Sync {
    fn layout(&self) -> &Layout;

    /// Render an exception: backtrace (if captured) then the error chain
    fn format_exception(&self, exception: &ExceptionInfo) -> String {
        let mut out = String::new();
        if let Some(backtrace) = exception.backtrace() {
            out.push_str("stack backtrace:\n");
            out.push_str(backtrace.trim_end());
            out.push('\n');
        }
        out.push_str(&exception_summary(exception));
        out
    }

    fn format_stack(&self, stack: &str) -> String {
        stack.trim_end().to_string()
    }

    /// Render the layout line, then exception and stack text on following lines
    ///
    /// Exception text is cached on the record; later formatters reuse it
    /// unless the cache is cleared first.
    fn format(&self, record: &LogRecord) -> Result<String, fmt::Error> {
        let mut text = self.layout().render(record)?;

        if let Some(exception) = &record.exception {
            let exc_text = match record.exc_text() {
                Some(cached) => cached,
                None => {
                    let rendered = self.format_exception(exception);
                    record.set_exc_text(rendered.clone());
                    rendered
                }
            };
            if !exc_text.is_empty() {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&exc_text);
            }
        }

        if let Some(stack) = &record.stack_info {
            let stack_text = self.format_stack(stack);
            if !stack_text.is_empty() {
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&stack_text);
            }
        }

        Ok(text)
    }
}

/// Full-detail formatter for console and file sinks
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    layout: Layout,
}

impl TextFormatter {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }
}

impl Formatter for TextFormatter {
    fn layout(&self) -> &Layout {
        &self.layout
    }
}

/// Formatter for the task-control channels
///
/// A `StatusException` renders as its message alone. Other errors render as
/// their type and message chain without frames. Stack info is never rendered.
#[derive(Debug, Clone)]
pub struct ExceptionAwareFormatter {
    layout: Layout,
}

impl ExceptionAwareFormatter {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }
}

impl Default for ExceptionAwareFormatter {
    fn default() -> Self {
        Self::new(Layout::brief())
    }
}

impl Formatter for ExceptionAwareFormatter {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn format_exception(&self, exception: &ExceptionInfo) -> String {
        match exception.status_exception() {
            Some(status) => status.message.clone(),
            None => exception_summary(exception).trim().to_string(),
        }
    }

    fn format_stack(&self, _stack: &str) -> String {
        String::new()
    }
}

/// A detailed-layout line split back into its parts
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub logger_name: String,
    pub message: String,
}

const LEVELS: [Level; 6] = [
    Level::Trace,
    Level::Debug,
    Level::Info,
    Level::Warning,
    Level::Error,
    Level::Critical,
];

/// Parse the first line of a record rendered with the detailed layout
///
/// `time_format` and `utc` must match the layout that produced the line.
pub fn parse_line(line: &str, time_format: &str, utc: bool) -> Option<ParsedLine> {
    let line = line.lines().next()?;

    // Earliest " LEVEL " marks the end of the timestamp
    let (pos, level) = LEVELS
        .iter()
        .filter_map(|level| {
            line.find(&format!(" {} ", level.as_str()))
                .map(|pos| (pos, *level))
        })
        .min_by_key(|(pos, _)| *pos)?;

    let time_part = &line[..pos];
    let rest = &line[pos + level.as_str().len() + 2..];
    let (logger_name, message) = rest.split_once(": ")?;

    let naive = NaiveDateTime::parse_from_str(time_part, time_format).ok()?;
    let timestamp = if utc {
        Utc.from_utc_datetime(&naive)
    } else {
        Local
            .from_local_datetime(&naive)
            .single()?
            .with_timezone(&Utc)
    };

    Some(ParsedLine {
        timestamp,
        level,
        logger_name: logger_name.to_string(),
        message: message.to_string(),
    })
}

//! Plain text sink for stderr or any other writer

use std::io::{self, Write};
use std::sync::Mutex;

use super::format::{Formatter, TextFormatter};
use super::record::LogRecord;
use super::sink::{Sink, SinkError};

/// Writes one formatted record per line to a stream
pub struct ConsoleSink {
    writer: Mutex<Box<dyn Write + Send>>,
    formatter: Box<dyn Formatter>,
}

impl ConsoleSink {
    /// Sink writing to an arbitrary stream
    pub fn new(writer: Box<dyn Write + Send>, formatter: Box<dyn Formatter>) -> Self {
        Self {
            writer: Mutex::new(writer),
            formatter,
        }
    }

    /// Sink writing to the process's standard error
    pub fn stderr(formatter: Box<dyn Formatter>) -> Self {
        Self::new(Box::new(io::stderr()), formatter)
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::stderr(Box::new(TextFormatter::default()))
    }
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        let text = self.formatter.format(record)?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", text)?;
        writer.flush()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::format::{parse_line, Layout};
    use crate::logging::record::Level;
    use std::sync::Arc;

    /// Cloneable in-memory writer for capturing sink output
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_console_writes_one_line_per_record() {
        let buffer = SharedBuffer::default();
        let sink = ConsoleSink::new(
            Box::new(buffer.clone()),
            Box::new(TextFormatter::new(Layout::detailed().with_utc(true))),
        );

        sink.emit(&LogRecord::new(Level::Info, "TASK", "first")).unwrap();
        sink.emit(&LogRecord::new(Level::Warning, "TASK", "second")).unwrap();

        let output = buffer.contents();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed = parse_line(lines[1], Layout::detailed().time_format(), true).unwrap();
        assert_eq!(parsed.level, Level::Warning);
        assert_eq!(parsed.logger_name, "TASK");
        assert_eq!(parsed.message, "second");
    }
}

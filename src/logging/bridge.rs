//! Sink forwarding records to the task-control system
//!
//! Records below the threshold go out as status messages. Records at or above
//! it go out as error messages, tagged with the status code of the exception
//! currently being handled on this thread (0 if there is none).

use std::sync::Arc;

use anyhow::Result;

use super::exception;
use super::format::{ExceptionAwareFormatter, Formatter};
use super::record::{Level, LogRecord};
use super::sink::{Sink, SinkError};

/// Records below this level are status messages
pub const DEFAULT_THRESHOLD: Level = Level::Warning;

/// The two reporting calls of the task-control system
pub trait TaskChannel: Send + Sync {
    fn send_status_message(&self, text: &str) -> Result<()>;

    fn send_error_message(&self, text: &str, status: i64) -> Result<()>;
}

/// Routes formatted records to the status or error channel by severity
pub struct BridgeSink {
    channel: Arc<dyn TaskChannel>,
    formatter: Box<dyn Formatter>,
    threshold: Level,
}

impl BridgeSink {
    /// Bridge using the exception-aware brief formatter and the default threshold
    pub fn new(channel: Arc<dyn TaskChannel>) -> Self {
        Self {
            channel,
            formatter: Box::new(ExceptionAwareFormatter::default()),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    /// Replace the formatter used for both channels
    pub fn with_formatter(mut self, formatter: Box<dyn Formatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Records at or above `threshold` go to the error channel
    pub fn with_threshold(mut self, threshold: Level) -> Self {
        self.threshold = threshold;
        self
    }

    /// Current status/error split point
    pub fn threshold(&self) -> Level {
        self.threshold
    }
}

impl Sink for BridgeSink {
    fn name(&self) -> &str {
        "task-bridge"
    }

    fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
        // Render exceptions with our own formatter, and don't leave the short
        // form behind for sinks that run after us.
        record.clear_exc_text();
        let text = self.formatter.format(record);
        record.clear_exc_text();
        let text = text?;

        if record.level < self.threshold {
            self.channel
                .send_status_message(&text)
                .map_err(SinkError::Channel)
        } else {
            let status = exception::current_status().unwrap_or(0);
            self.channel
                .send_error_message(&text, status)
                .map_err(SinkError::Channel)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logging::exception::{handling, ExceptionInfo, StatusException};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Sent {
        Status(String),
        Error(String, i64),
    }

    /// Channel that remembers every call
    #[derive(Default)]
    pub(crate) struct RecordingChannel {
        pub(crate) sent: Mutex<Vec<Sent>>,
    }

    impl RecordingChannel {
        pub(crate) fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl TaskChannel for RecordingChannel {
        fn send_status_message(&self, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push(Sent::Status(text.to_string()));
            Ok(())
        }

        fn send_error_message(&self, text: &str, status: i64) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Error(text.to_string(), status));
            Ok(())
        }
    }

    /// Channel whose calls always fail
    pub(crate) struct DeadChannel;

    impl TaskChannel for DeadChannel {
        fn send_status_message(&self, _text: &str) -> Result<()> {
            anyhow::bail!("task not connected")
        }

        fn send_error_message(&self, _text: &str, _status: i64) -> Result<()> {
            anyhow::bail!("task not connected")
        }
    }

    fn bridge() -> (Arc<RecordingChannel>, BridgeSink) {
        let channel = Arc::new(RecordingChannel::default());
        let sink = BridgeSink::new(channel.clone());
        (channel, sink)
    }

    #[test]
    fn test_info_goes_to_status_channel() {
        let (channel, sink) = bridge();
        sink.emit(&LogRecord::new(Level::Info, "TASK", "GET TASK TIME"))
            .unwrap();
        assert_eq!(channel.sent(), vec![Sent::Status("INFO:GET TASK TIME".into())]);
    }

    #[test]
    fn test_error_without_active_exception_uses_zero() {
        let (channel, sink) = bridge();
        sink.emit(&LogRecord::new(Level::Error, "TASK", "unexpected msg"))
            .unwrap();
        assert_eq!(
            channel.sent(),
            vec![Sent::Error("ERROR:unexpected msg".into(), 0)]
        );
    }

    #[test]
    fn test_warning_is_at_threshold() {
        let (channel, sink) = bridge();
        sink.emit(&LogRecord::new(Level::Warning, "TASK", "slow reply"))
            .unwrap();
        assert_eq!(channel.sent(), vec![Sent::Error("WARNING:slow reply".into(), 0)]);
    }

    #[test]
    fn test_error_uses_status_of_handled_exception() {
        let (channel, sink) = bridge();
        let exc = ExceptionInfo::new(StatusException::new("bad state", 261_128_203));
        let _guard = handling(exc.clone());

        let record = LogRecord::new(Level::Error, "TASK", "GET exception").with_exception(exc);
        sink.emit(&record).unwrap();

        assert_eq!(
            channel.sent(),
            vec![Sent::Error("ERROR:GET exception\nbad state".into(), 261_128_203)]
        );
    }

    #[test]
    fn test_status_comes_from_handled_exception_not_record() {
        let (channel, sink) = bridge();

        // Record carries a status exception, but nothing is being handled
        let record = LogRecord::new(Level::Error, "TASK", "stale")
            .with_exception(ExceptionInfo::new(StatusException::new("old", 9)));
        sink.emit(&record).unwrap();

        // Something else is being handled while logging an unrelated record
        let _guard = handling(ExceptionInfo::new(StatusException::new("live", 17)));
        sink.emit(&LogRecord::new(Level::Critical, "TASK", "fresh"))
            .unwrap();

        assert_eq!(
            channel.sent(),
            vec![
                Sent::Error("ERROR:stale\nold".into(), 0),
                Sent::Error("CRITICAL:fresh".into(), 17),
            ]
        );
    }

    #[test]
    fn test_non_status_exception_uses_zero() {
        let (channel, sink) = bridge();
        let _guard = handling(ExceptionInfo::new(std::io::Error::other("reset")));
        sink.emit(&LogRecord::new(Level::Error, "TASK", "io")).unwrap();
        assert_eq!(channel.sent(), vec![Sent::Error("ERROR:io".into(), 0)]);
    }

    #[test]
    fn test_ignores_and_clears_cached_exception_text() {
        let (channel, sink) = bridge();
        let record = LogRecord::new(Level::Error, "TASK", "failed")
            .with_exception(ExceptionInfo::new(StatusException::new("bad state", 1)));
        record.set_exc_text("stack backtrace:\n   0: main\nfull trace".to_string());

        sink.emit(&record).unwrap();

        assert_eq!(channel.sent(), vec![Sent::Error("ERROR:failed\nbad state".into(), 0)]);
        assert!(record.exc_text().is_none());
    }

    #[test]
    fn test_custom_threshold() {
        let channel = Arc::new(RecordingChannel::default());
        let sink = BridgeSink::new(channel.clone()).with_threshold(Level::Error);
        sink.emit(&LogRecord::new(Level::Warning, "TASK", "w")).unwrap();
        assert_eq!(channel.sent(), vec![Sent::Status("WARNING:w".into())]);
    }

    #[test]
    fn test_channel_failure_is_reported_as_error() {
        let sink = BridgeSink::new(Arc::new(DeadChannel));
        let err = sink
            .emit(&LogRecord::new(Level::Info, "TASK", "lost"))
            .unwrap_err();
        assert!(matches!(err, SinkError::Channel(_)));
    }
}

//! `tracing` integration
//!
//! `ContextLayer` turns every `tracing` event into a `LogRecord` and hands it
//! to a `LoggingContext`, so code using `tracing::info!` and friends reaches
//! the same sinks as code using a `Logger`.
//!
//! The event target is the logger name unless the event has a `logger` field.
//! Other fields are appended to the message as `key=value`.

use std::fmt::Write as FmtWrite;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use super::context::LoggingContext;
use super::record::{Level, LogRecord};

/// Field that overrides the logger name of an event
const LOGGER_FIELD: &str = "logger";

/// A tracing Layer dispatching events through a `LoggingContext`
pub struct ContextLayer {
    context: Arc<LoggingContext>,
}

impl ContextLayer {
    pub fn new(context: Arc<LoggingContext>) -> Self {
        Self { context }
    }
}

impl<S> Layer<S> for ContextLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = Level::from(*metadata.level());
        if !self.context.is_enabled_for(level) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let logger_name = visitor
            .logger
            .take()
            .unwrap_or_else(|| metadata.target().to_string());
        let record = LogRecord::new(level, logger_name, visitor.into_message());
        self.context.dispatch(&record);
    }
}

/// Collects the message, the logger override and the remaining fields
#[derive(Default)]
struct MessageVisitor {
    message: String,
    logger: Option<String>,
    fields: String,
}

impl MessageVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            LOGGER_FIELD => self.logger = Some(value.to_string()),
            name => {
                let _ = write!(self.fields, " {}={}", name, value);
            }
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let _ = write!(self.fields, " {}={}", field.name(), value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{:?}", value),
            LOGGER_FIELD => self.logger = Some(format!("{:?}", value)),
            name => {
                let _ = write!(self.fields, " {}={:?}", name, value);
            }
        }
    }
}

/// Install `context` as the global `tracing` subscriber
///
/// `RUST_LOG` narrows which targets reach the context; the context's own
/// level still applies on top.
pub fn install(context: Arc<LoggingContext>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ContextLayer::new(context))
        .try_init()
        .context("Failed to install logging subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::sink::{Sink, SinkError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        seen: Mutex<Vec<(Level, String, String)>>,
    }

    impl Sink for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        fn emit(&self, record: &LogRecord) -> Result<(), SinkError> {
            self.seen.lock().unwrap().push((
                record.level,
                record.logger_name.clone(),
                record.message.clone(),
            ));
            Ok(())
        }
    }

    #[test]
    fn test_layer_dispatches_events() {
        let ctx = Arc::new(LoggingContext::new(Level::Info));
        let capture = Arc::new(Capture::default());
        ctx.add_sink(capture.clone(), Level::Trace);

        let subscriber = tracing_subscriber::registry().with(ContextLayer::new(ctx));
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("below context level");
            tracing::info!(target: "drama", "task started");
            tracing::warn!(logger = "PYGET_7", count = 3, "reply late");
        });

        let seen = capture.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (Level::Info, "drama".to_string(), "task started".to_string()),
                (
                    Level::Warning,
                    "PYGET_7".to_string(),
                    "reply late count=3".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_fields_without_message() {
        let mut visitor = MessageVisitor::default();
        visitor.fields.push_str(" a=1 b=2");
        assert_eq!(visitor.into_message(), "a=1 b=2");
    }
}

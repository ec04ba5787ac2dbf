//! Standard logging setup for a task
//!
//! - context level INFO
//! - console output to stderr
//! - INFO and above to the task-control system, below WARNING as status
//!   messages and WARNING and above as error messages
//! - with a task name, file output to `/jac_logs/<yyyymmdd>/<task>.log` (UTC)

use std::sync::Arc;

use anyhow::Result;

use crate::config::LoggingConfig;

use super::bridge::{BridgeSink, TaskChannel};
use super::console::ConsoleSink;
use super::context::LoggingContext;
use super::format::{ExceptionAwareFormatter, Layout, TextFormatter};
use super::record::Level;
use super::strftime_sink::StrftimeFileSink;

/// Sinks registered by [`setup`], for further customization
#[derive(Clone)]
pub struct SinkHandles {
    pub console: Arc<ConsoleSink>,
    pub bridge: Arc<BridgeSink>,
    pub file: Option<Arc<StrftimeFileSink>>,
}

/// Set up logging with the standard layouts and paths
///
/// Returns the context (loggers come from `context.logger(name)`) and the
/// registered sinks.
pub fn setup(
    task_name: Option<&str>,
    channel: Arc<dyn TaskChannel>,
) -> (Arc<LoggingContext>, SinkHandles) {
    let config = match task_name {
        Some(name) => LoggingConfig::for_task(name),
        None => LoggingConfig::default(),
    };
    build(&config, Layout::detailed(), Layout::brief(), channel)
}

/// Set up logging from a configuration
pub fn setup_with_config(
    config: &LoggingConfig,
    channel: Arc<dyn TaskChannel>,
) -> Result<(Arc<LoggingContext>, SinkHandles)> {
    config.validate()?;
    let console_layout = config.console_layout()?;
    let bridge_layout = config.bridge_layout()?;
    Ok(build(config, console_layout, bridge_layout, channel))
}

fn build(
    config: &LoggingConfig,
    console_layout: Layout,
    bridge_layout: Layout,
    channel: Arc<dyn TaskChannel>,
) -> (Arc<LoggingContext>, SinkHandles) {
    let context = Arc::new(LoggingContext::new(config.level));

    let file = config.file_template().map(|template| {
        let sink = StrftimeFileSink::new(
            template,
            Box::new(TextFormatter::new(console_layout.clone())),
        )
        .with_utc(config.file_utc)
        .with_dir_mode(config.dir_mode());
        Arc::new(sink)
    });
    if let Some(file) = &file {
        context.add_sink(file.clone(), Level::Trace);
    }

    let console = Arc::new(ConsoleSink::stderr(Box::new(TextFormatter::new(
        console_layout,
    ))));
    context.add_sink(console.clone(), Level::Trace);

    let bridge = Arc::new(
        BridgeSink::new(channel)
            .with_formatter(Box::new(ExceptionAwareFormatter::new(bridge_layout)))
            .with_threshold(config.bridge_threshold),
    );
    context.add_sink(bridge.clone(), config.bridge_level);

    tracing::debug!(
        file = ?config.file_template(),
        level = %config.level,
        "logging set up"
    );

    (
        context,
        SinkHandles {
            console,
            bridge,
            file,
        },
    )
}

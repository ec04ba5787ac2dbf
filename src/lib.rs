//! drama-log - logging bridge for DRAMA tasks
//!
//! Rolls log files over onto strftime-derived paths and forwards records to a
//! task's status and error channels.

pub mod config;
pub mod logging;

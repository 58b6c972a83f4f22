//! Log event records emitted by a loop execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::LoopType;

/// Semantic level of a loop log event. All levels are always emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    /// Matching level of the `log` facade.
    pub fn to_log_level(self) -> log::Level {
        match self {
            LogLevel::Info | LogLevel::Success => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a loop's event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    /// Node that emitted the event
    pub node_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: &str) -> Self {
        Self {
            level,
            message: message.to_string(),
            node_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_node(mut self, node_id: &str) -> Self {
        self.node_id = Some(node_id.to_string());
        self
    }
}

/// Decorate a log message with the loop type, the way the editor shows it.
///
/// Strategy start messages become "Starting <type> loop...", completion
/// messages get a `[<type>]` suffix and loop errors are prefixed with the
/// loop type. Everything else is returned unchanged.
pub fn format_log_message(loop_type: LoopType, level: LogLevel, message: &str) -> String {
    match level {
        LogLevel::Info if message.contains("Executing") => format!("Starting {} loop...", loop_type),
        LogLevel::Success if message.contains("Loop completed") => format!("{} [{}]", message, loop_type),
        LogLevel::Error if message.contains("Loop") && !message.starts_with(loop_type.as_str()) => {
            format!("{} loop error: {}", loop_type, message.replace("Loop execution failed: ", ""))
        }
        _ => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_new() {
        let event = LogEvent::new(LogLevel::Warning, "careful").for_node("loop-1");
        assert_eq!(event.level, LogLevel::Warning);
        assert_eq!(event.message, "careful");
        assert_eq!(event.node_id.as_deref(), Some("loop-1"));
    }

    #[test]
    fn test_level_serialization() {
        assert_eq!(serde_json::to_string(&LogLevel::Success).unwrap(), "\"success\"");
        assert_eq!(LogLevel::Warning.to_string(), "warning");
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(LogLevel::Success.to_log_level(), log::Level::Info);
        assert_eq!(LogLevel::Warning.to_log_level(), log::Level::Warn);
        assert_eq!(LogLevel::Error.to_log_level(), log::Level::Error);
    }

    #[test]
    fn test_format_completion_message() {
        assert_eq!(
            format_log_message(LoopType::ForEach, LogLevel::Success, "Loop completed after 3 iterations"),
            "Loop completed after 3 iterations [forEach]"
        );
    }

    #[test]
    fn test_format_start_message() {
        assert_eq!(
            format_log_message(LoopType::While, LogLevel::Info, "Executing loop node"),
            "Starting while loop..."
        );
    }

    #[test]
    fn test_format_error_message() {
        assert_eq!(
            format_log_message(LoopType::Count, LogLevel::Error, "Loop execution failed: boom"),
            "count loop error: boom"
        );
        assert_eq!(
            format_log_message(LoopType::Count, LogLevel::Error, "count loop error: Loop stopped"),
            "count loop error: Loop stopped"
        );
    }

    #[test]
    fn test_format_passthrough() {
        assert_eq!(
            format_log_message(LoopType::Count, LogLevel::Warning, "Loop reached maximum iterations limit (5)"),
            "Loop reached maximum iterations limit (5)"
        );
    }
}

//! Loop node configuration.
//!
//! `LoopConfig` is the immutable, normalized configuration applied to one
//! loop execution. Node settings coming from the editor are loosely typed
//! (numbers typed into text boxes arrive as strings), so `from_settings`
//! reads them leniently and falls back to the node defaults.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{LoopError, Result};
use crate::expr::Expression;

/// Default iteration count for Count loops.
pub const DEFAULT_COUNT: u64 = 5;

/// Default safety cap applied to every strategy.
pub const DEFAULT_MAX_ITERATIONS: u64 = 1000;

/// Default binding name for the current array item.
pub const DEFAULT_ITEM_NAME: &str = "item";

/// Default binding name for the iteration index.
pub const DEFAULT_INDEX_NAME: &str = "index";

/// Names that cannot be used as custom bindings.
const RESERVED_NAMES: &[&str] = &["input", "results", "true", "false", "null", "undefined"];

/// Iteration strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopType {
    /// Run a fixed number of times
    #[default]
    #[serde(rename = "count")]
    Count,
    /// Run once per element of an array
    #[serde(rename = "forEach")]
    ForEach,
    /// Run while a condition holds
    #[serde(rename = "while")]
    While,
}

impl LoopType {
    /// Parse the editor's loop type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "count" => Some(LoopType::Count),
            "forEach" => Some(LoopType::ForEach),
            "while" => Some(LoopType::While),
            _ => None,
        }
    }

    /// Editor name of this loop type.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopType::Count => "count",
            LoopType::ForEach => "forEach",
            LoopType::While => "while",
        }
    }
}

impl fmt::Display for LoopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized configuration for a loop node.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoopConfig {
    /// Iteration strategy.
    pub loop_type: LoopType,

    /// Iterations for Count loops.
    pub count: u64,

    /// Dotted path to the array for ForEach loops, relative to the input.
    pub array_path: String,

    /// Boolean expression for While loops.
    pub condition: String,

    /// Binding name exposing the current item.
    pub current_item_name: String,

    /// Binding name exposing the current index.
    pub index_name: String,

    /// Pause after each iteration, in milliseconds.
    #[serde(rename = "delay")]
    pub delay_ms: u64,

    /// Hard cap on iterations for every strategy.
    pub max_iterations: u64,

    /// Whether per-iteration outputs are aggregated into `results`.
    pub collect_results: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            loop_type: LoopType::Count,
            count: DEFAULT_COUNT,
            array_path: String::new(),
            condition: String::new(),
            current_item_name: DEFAULT_ITEM_NAME.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            delay_ms: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            collect_results: false,
        }
    }
}

impl LoopConfig {
    /// Count loop with `count` iterations.
    pub fn count(count: u64) -> Self {
        Self {
            loop_type: LoopType::Count,
            count: count.max(1),
            ..Default::default()
        }
    }

    /// ForEach loop over the array at `array_path` (empty for the input itself).
    pub fn for_each(array_path: &str) -> Self {
        Self {
            loop_type: LoopType::ForEach,
            array_path: array_path.to_string(),
            ..Default::default()
        }
    }

    /// While loop guarded by `condition`.
    pub fn while_condition(condition: &str) -> Self {
        Self {
            loop_type: LoopType::While,
            condition: condition.to_string(),
            ..Default::default()
        }
    }

    /// Set the safety cap.
    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Set the per-iteration delay.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Enable or disable result collection.
    pub fn with_collect_results(mut self, collect: bool) -> Self {
        self.collect_results = collect;
        self
    }

    /// Rename the index and item bindings.
    pub fn with_names(mut self, index_name: &str, current_item_name: &str) -> Self {
        self.index_name = index_name.to_string();
        self.current_item_name = current_item_name.to_string();
        self
    }

    /// Build a configuration from raw node settings.
    ///
    /// Mirrors how the editor reads settings: integers may be strings,
    /// zero or unparsable values fall back to the defaults, then
    /// `count` and `maxIterations` are clamped to at least 1.
    pub fn from_settings(settings: &Value) -> Result<Self> {
        let settings = match settings {
            Value::Object(map) => map,
            Value::Null => return Ok(Self::default()),
            other => {
                return Err(LoopError::InvalidSettings(format!(
                    "settings must be an object, got {}",
                    json_type_name(other)
                )));
            }
        };

        let loop_type = match settings.get("loopType") {
            None | Some(Value::Null) => LoopType::Count,
            Some(Value::String(s)) if s.is_empty() => LoopType::Count,
            Some(Value::String(s)) => LoopType::parse(s)
                .ok_or_else(|| LoopError::InvalidSettings(format!("unknown loop type '{}'", s)))?,
            Some(other) => {
                return Err(LoopError::InvalidSettings(format!(
                    "loopType must be a string, got {}",
                    json_type_name(other)
                )));
            }
        };

        let int_or = |key: &str, default: i64| -> i64 {
            match settings.get(key).and_then(lenient_int) {
                Some(0) | None => default,
                Some(n) => n,
            }
        };
        let string_or = |key: &str, default: &str| -> String {
            match settings.get(key) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                _ => default.to_string(),
            }
        };

        Ok(Self {
            loop_type,
            count: int_or("count", DEFAULT_COUNT as i64).max(1) as u64,
            array_path: string_or("arrayPath", ""),
            condition: string_or("condition", ""),
            current_item_name: string_or("currentItemName", DEFAULT_ITEM_NAME),
            index_name: string_or("indexName", DEFAULT_INDEX_NAME),
            delay_ms: int_or("delay", 0).max(0) as u64,
            max_iterations: int_or("maxIterations", DEFAULT_MAX_ITERATIONS as i64).max(1) as u64,
            collect_results: settings.get("collectResults").is_some_and(truthy),
        })
    }

    /// Static checks for a loop definition.
    ///
    /// `LoopEngine::execute` does not call this; strategies only enforce
    /// what they need at run time.
    pub fn validate(&self) -> eyre::Result<()> {
        for (field, name) in [
            ("indexName", &self.index_name),
            ("currentItemName", &self.current_item_name),
        ] {
            if !is_identifier(name) {
                eyre::bail!("{} '{}' is not a valid identifier", field, name);
            }
            if RESERVED_NAMES.contains(&name.as_str()) {
                eyre::bail!("{} '{}' is reserved", field, name);
            }
        }
        if self.index_name == self.current_item_name {
            eyre::bail!("indexName and currentItemName must differ");
        }
        if self.count == 0 {
            eyre::bail!("count must be > 0");
        }
        if self.max_iterations == 0 {
            eyre::bail!("maxIterations must be > 0");
        }
        if self.loop_type == LoopType::While {
            if self.condition.trim().is_empty() {
                eyre::bail!("while loops require a condition");
            }
            Expression::parse(&self.condition)
                .map_err(|e| eyre::eyre!("condition '{}' is invalid: {}", self.condition, e))?;
        }
        Ok(())
    }

    /// Iterations a Count loop will actually run.
    pub fn effective_count(&self) -> u64 {
        self.count.min(self.max_iterations)
    }
}

/// Read an integer the way `parseInt` does: numbers truncate, strings use
/// their leading integer prefix.
fn lenient_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim_start();
            let (sign, digits) = match s.strip_prefix('-') {
                Some(rest) => (-1, rest),
                None => (1, s.strip_prefix('+').unwrap_or(s)),
            };
            let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
            if end == 0 {
                return None;
            }
            // only overflow can fail here; saturate like a huge parsed value
            Some(sign * digits[..end].parse::<i64>().unwrap_or(i64::MAX))
        }
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_loop_config() {
        let config = LoopConfig::default();
        assert_eq!(config.loop_type, LoopType::Count);
        assert_eq!(config.count, 5);
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.index_name, "index");
        assert_eq!(config.current_item_name, "item");
        assert!(!config.collect_results);
    }

    #[test]
    fn test_from_settings_reads_strings() {
        let config = LoopConfig::from_settings(&json!({
            "loopType": "forEach",
            "count": "12",
            "arrayPath": "data.items",
            "delay": "250ms",
            "maxIterations": "50",
            "collectResults": true
        }))
        .unwrap();
        assert_eq!(config.loop_type, LoopType::ForEach);
        assert_eq!(config.count, 12);
        assert_eq!(config.array_path, "data.items");
        assert_eq!(config.delay_ms, 250);
        assert_eq!(config.max_iterations, 50);
        assert!(config.collect_results);
    }

    #[test]
    fn test_from_settings_zero_falls_back_to_default() {
        let config = LoopConfig::from_settings(&json!({"count": 0, "maxIterations": "0"})).unwrap();
        assert_eq!(config.count, 5);
        assert_eq!(config.max_iterations, 1000);
    }

    #[test]
    fn test_from_settings_clamps_negative_values() {
        let config = LoopConfig::from_settings(&json!({"count": -3, "delay": -10, "maxIterations": -1})).unwrap();
        assert_eq!(config.count, 1);
        assert_eq!(config.delay_ms, 0);
        assert_eq!(config.max_iterations, 1);
    }

    #[test]
    fn test_from_settings_saturates_oversized_strings() {
        let config = LoopConfig::from_settings(&json!({
            "maxIterations": "99999999999999999999",
            "count": "-99999999999999999999",
            "delay": "abc"
        }))
        .unwrap();
        assert_eq!(config.max_iterations, i64::MAX as u64);
        assert_eq!(config.count, 1);
        assert_eq!(config.delay_ms, 0);
    }

    #[test]
    fn test_from_settings_truncates_floats() {
        let config = LoopConfig::from_settings(&json!({"count": 2.9})).unwrap();
        assert_eq!(config.count, 2);
    }

    #[test]
    fn test_from_settings_empty_names_use_defaults() {
        let config = LoopConfig::from_settings(&json!({"indexName": "", "currentItemName": "row"})).unwrap();
        assert_eq!(config.index_name, "index");
        assert_eq!(config.current_item_name, "row");
    }

    #[test]
    fn test_from_settings_null_is_default() {
        assert_eq!(LoopConfig::from_settings(&Value::Null).unwrap(), LoopConfig::default());
    }

    #[test]
    fn test_from_settings_unknown_loop_type() {
        let result = LoopConfig::from_settings(&json!({"loopType": "until"}));
        assert!(matches!(result, Err(LoopError::InvalidSettings(_))));
    }

    #[test]
    fn test_from_settings_rejects_non_object() {
        assert!(LoopConfig::from_settings(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_serde_uses_editor_names() {
        let config = LoopConfig::while_condition("index < 3").with_delay_ms(10);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["loopType"], "while");
        assert_eq!(json["delay"], 10);
        assert_eq!(json["maxIterations"], 1000);
    }

    #[test]
    fn test_validation() {
        assert!(LoopConfig::default().validate().is_ok());
        assert!(LoopConfig::while_condition("index < 3").validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_names() {
        assert!(LoopConfig::default().with_names("1st", "item").validate().is_err());
        assert!(LoopConfig::default().with_names("i", "results").validate().is_err());
        assert!(LoopConfig::default().with_names("x", "x").validate().is_err());
    }

    #[test]
    fn test_validation_rejects_while_without_condition() {
        assert!(LoopConfig::while_condition("").validate().is_err());
        assert!(LoopConfig::while_condition("index <").validate().is_err());
    }

    #[test]
    fn test_effective_count() {
        assert_eq!(LoopConfig::count(10).with_max_iterations(3).effective_count(), 3);
        assert_eq!(LoopConfig::count(2).effective_count(), 2);
    }

    #[test]
    fn test_loop_type_display() {
        assert_eq!(LoopType::Count.to_string(), "count");
        assert_eq!(LoopType::ForEach.to_string(), "forEach");
        assert_eq!(LoopType::While.to_string(), "while");
        assert_eq!(LoopType::parse("forEach"), Some(LoopType::ForEach));
        assert_eq!(LoopType::parse("foreach"), None);
    }
}

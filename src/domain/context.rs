//! Mutable state of one loop execution.

use serde_json::{Map, Value};

use crate::config::LoopConfig;
use crate::expr::Bindings;

/// State threaded through a strategy for the duration of one `execute`.
///
/// The custom index/item bindings are not stored separately; they are
/// derived from `index` and `item` whenever a snapshot is taken, so they
/// can never drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopContext {
    /// Value passed into the loop node
    pub input: Value,
    /// 0-based iteration counter
    pub index: usize,
    /// Current array element (ForEach only)
    pub item: Value,
    /// Collected per-iteration outputs
    pub results: Vec<Value>,
    index_name: String,
    item_name: String,
}

impl LoopContext {
    pub fn new(input: Value, config: &LoopConfig) -> Self {
        Self {
            input,
            index: 0,
            item: Value::Null,
            results: Vec::new(),
            index_name: config.index_name.clone(),
            item_name: config.current_item_name.clone(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn item_name(&self) -> &str {
        &self.item_name
    }

    /// Owned JSON snapshot handed to downstream nodes.
    ///
    /// Custom names are written after the standard keys, except that
    /// `input` and `results` are never shadowed.
    pub fn snapshot(&self) -> Value {
        let mut map = Map::new();
        map.insert("input".to_string(), self.input.clone());
        map.insert("index".to_string(), Value::from(self.index));
        map.insert("item".to_string(), self.item.clone());
        for (name, value) in [
            (&self.index_name, Value::from(self.index)),
            (&self.item_name, self.item.clone()),
        ] {
            if name != "input" && name != "results" {
                map.insert(name.clone(), value);
            }
        }
        map.insert("results".to_string(), Value::Array(self.results.clone()));
        Value::Object(map)
    }

    /// Variables visible to a While condition.
    pub fn bindings(&self) -> Bindings {
        Bindings::new()
            .with("input", self.input.clone())
            .with("index", Value::from(self.index))
            .with("item", self.item.clone())
            .with(&self.index_name, Value::from(self.index))
            .with(&self.item_name, self.item.clone())
    }

    /// Resolve a binding name to its canonical variable (`index` or `item`).
    pub fn canonical_name<'a>(&self, name: &'a str) -> &'a str {
        if name == self.index_name {
            "index"
        } else if name == self.item_name {
            "item"
        } else {
            name
        }
    }

    /// Final output of the loop node.
    ///
    /// Without collection the input is returned unchanged. With collection
    /// the results are merged in: objects get a `results` key, `null`
    /// becomes `{results}`, and any other input is wrapped as
    /// `{value, results}`.
    pub fn output(&self, collect_results: bool) -> Value {
        if !collect_results {
            return self.input.clone();
        }
        let results = Value::Array(self.results.clone());
        match &self.input {
            Value::Object(map) => {
                let mut merged = map.clone();
                merged.insert("results".to_string(), results);
                Value::Object(merged)
            }
            Value::Null => serde_json::json!({ "results": results }),
            other => serde_json::json!({ "value": other, "results": results }),
        }
    }
}

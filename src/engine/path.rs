//! Dotted path lookup into JSON values.

use serde_json::Value;

/// Walk `path` (e.g. `data.items` or `rows.0.cells`) from `root`.
///
/// Object segments are keys and array segments are indices. Walking
/// through anything that is not an object or array yields `None`, as does
/// a missing key or out-of-range index.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

//! Canonical JSON serialization, used to derive deterministic cache keys.
//!
//! `canonical(key)` per §4.8: sorted object keys, no insignificant
//! whitespace, stable number formatting. `serde_json`'s compact writer
//! already gives stable whitespace/number output; the only thing left to do
//! is rebuild every object with a deterministic key order before writing.

use serde_json::Value;

/// Serialize `value` to its canonical JSON string form.
#[must_use]
pub fn canonical(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).expect("canonical values contain no non-finite floats")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (key, val) in map {
                sorted.insert(key.clone(), sort_keys(val));
            }
            let mut out = serde_json::Map::new();
            for (key, val) in sorted {
                out.insert(key, val);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

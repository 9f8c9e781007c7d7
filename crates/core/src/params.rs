// Variable substitution for task parameters

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Replace `$name` string values with `context[name]`.
///
/// Unknown names are left as-is. Objects are resolved recursively; inside
/// arrays only object elements are resolved, scalar elements pass through.
pub fn resolve_variables(
    parameters: &HashMap<String, Value>,
    context: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    parameters
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, context)))
        .collect()
}

fn resolve_value(value: &Value, context: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => match s.strip_prefix('$') {
            Some(name) => context.get(name).cloned().unwrap_or_else(|| value.clone()),
            None => value.clone(),
        },
        Value::Object(map) => Value::Object(resolve_object(map, context)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(resolve_object(map, context)),
                    other => other.clone(),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_object(map: &Map<String, Value>, context: &HashMap<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, context)))
        .collect()
}

//! Best-effort extraction of capability names from a `tools/list` result.
//!
//! Agents disagree on the shape of this result, so each known shape has its
//! own matcher. Matchers run in order and the first one that recognizes the
//! value wins; nothing recognized means no names.

use serde_json::Value;

type ShapeMatcher = fn(&Value) -> Option<Vec<String>>;

const MATCHERS: &[ShapeMatcher] = &[record_with_tools, list_of_records, opaque_sequence];

/// Capability names found in `value`, or an empty list for unknown shapes
pub fn parse_capability_names(value: &Value) -> Vec<String> {
    MATCHERS
        .iter()
        .find_map(|matcher| matcher(value))
        .unwrap_or_default()
}

/// `{"tools": [...]}`
fn record_with_tools(value: &Value) -> Option<Vec<String>> {
    let tools = value.as_object()?.get("tools")?;
    if !tools.is_array() {
        return Some(Vec::new());
    }
    Some(
        list_of_records(tools)
            .or_else(|| opaque_sequence(tools))
            .unwrap_or_default(),
    )
}

/// `[{"name": ...}, ...]`
fn list_of_records(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| record_name(item).map(str::to_string))
        .collect()
}

/// Any other sequence: strings and scalars are rendered as-is
fn opaque_sequence(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => record_name(item).map(str::to_string),
                other => Some(other.to_string()),
            })
            .collect(),
    )
}

fn record_name(item: &Value) -> Option<&str> {
    item.as_object()?.get("name")?.as_str()
}

use serde_json::Value;
use tracing::warn;

/// Coerces a value that should be a list of strings.
///
/// Arrays keep their string entries, strings are split into trimmed
/// non-empty lines, `null` yields `fallback` and anything else yields
/// `fallback` with a warning.
pub fn ensure_array(value: &Value, fallback: &[String]) -> Vec<String> {
    match value {
        Value::Array(items) => {
            let kept: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect();
            if kept.len() != items.len() {
                warn!(
                    dropped = items.len() - kept.len(),
                    "dropping non-string list entries"
                );
            }
            kept
        }
        Value::String(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Null => fallback.to_vec(),
        other => {
            warn!(kind = value_kind(other), "expected a string list, using fallback");
            fallback.to_vec()
        }
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
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
    fn arrays_pass_through() {
        let value = json!(["a", "b"]);
        assert_eq!(ensure_array(&value, &[]), vec!["a", "b"]);
    }

    #[test]
    fn strings_are_split_into_lines() {
        let value = json!("  spam \n\n eggs\r\n");
        assert_eq!(ensure_array(&value, &[]), vec!["spam", "eggs"]);
    }

    #[test]
    fn other_shapes_fall_back() {
        let fallback = vec!["keep".to_string()];
        assert_eq!(ensure_array(&json!({"a": 1}), &fallback), fallback);
        assert_eq!(ensure_array(&json!(42), &fallback), fallback);
        assert_eq!(ensure_array(&Value::Null, &fallback), fallback);
        assert!(ensure_array(&json!(true), &[]).is_empty());
    }

    #[test]
    fn non_string_entries_are_dropped() {
        let value = json!(["a", 1, null, "b"]);
        assert_eq!(ensure_array(&value, &[]), vec!["a", "b"]);
    }
}

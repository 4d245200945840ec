//! Merging of values where existing content takes precedence.

use serde_json::Value;

/// Unifies `incoming` into `existing`.
///
/// Objects merge key by key, recursing into keys present on both sides.
/// Lists of equal length merge element-wise. Anything else keeps `existing`,
/// except `null`, which is treated as absent.
pub fn unify(existing: &mut Value, incoming: Value) {
    if existing.is_null() {
        *existing = incoming;
        return;
    }
    match (existing, incoming) {
        (Value::Object(current), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match current.get_mut(&key) {
                    Some(slot) => unify(slot, value),
                    None => {
                        current.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(current), Value::Array(incoming)) if current.len() == incoming.len() => {
            for (slot, value) in current.iter_mut().zip(incoming) {
                unify(slot, value);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_existing_fields_win() {
        let mut node = json!({"key": "k", "nested": {"a": 1}});
        unify(
            &mut node,
            json!({"key": "other", "value": "v", "nested": {"a": 2, "b": 3}}),
        );
        assert_eq!(
            node,
            json!({"key": "k", "value": "v", "nested": {"a": 1, "b": 3}})
        );
    }

    #[test]
    fn test_lists_and_null() {
        let mut node = json!({"items": [{"a": 1}, {"b": 2}], "empty": null, "short": [1]});
        unify(
            &mut node,
            json!({"items": [{"x": 1}, {"y": 2}], "empty": "filled", "short": [1, 2]}),
        );
        assert_eq!(
            node,
            json!({"items": [{"a": 1, "x": 1}, {"b": 2, "y": 2}], "empty": "filled", "short": [1]})
        );
    }
}

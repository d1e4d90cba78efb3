//! Ordered-sequence normalization for list fields.
//!
//! List-valued fields can arrive from a serialization boundary in shapes that
//! are "array-like" without being arrays: a numeric-keyed object
//! (`{"0": a, "1": b}`, possibly with a trailing `"length"` key), a lone scalar,
//! or `null`. Every list field in the domain types is deserialized through
//! [`ordered`] so business logic only ever sees a proper `Vec`.

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::Deserialize;
use serde_json::Value;

/// Coerce any JSON value into an ordered list of values.
///
/// - `null` becomes an empty list
/// - arrays are returned as-is
/// - objects whose keys are all non-negative integers (ignoring `length`) are
///   ordered by numeric key
/// - any other value becomes a single-element list
pub fn normalize(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => {
            let numeric = !map.is_empty()
                && map
                    .keys()
                    .filter(|k| k.as_str() != "length")
                    .all(|k| k.parse::<usize>().is_ok())
                && map.keys().any(|k| k.as_str() != "length");
            if numeric {
                let mut entries: Vec<(usize, Value)> = map
                    .into_iter()
                    .filter_map(|(k, v)| k.parse::<usize>().ok().map(|idx| (idx, v)))
                    .collect();
                entries.sort_by_key(|(idx, _)| *idx);
                entries.into_iter().map(|(_, v)| v).collect()
            } else {
                vec![Value::Object(map)]
            }
        }
        other => vec![other],
    }
}

/// `deserialize_with` adapter that accepts any array-like payload for a `Vec<T>`.
pub fn ordered<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    normalize(value)
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(D::Error::custom))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "ordered")]
        items: Vec<String>,
    }

    #[test]
    fn test_array_passes_through() {
        let h: Holder = serde_json::from_value(json!({"items": ["a", "b"]})).unwrap();
        assert_eq!(h.items, vec!["a", "b"]);
    }

    #[test]
    fn test_numeric_keyed_object_is_ordered_by_key() {
        let h: Holder =
            serde_json::from_value(json!({"items": {"10": "c", "2": "b", "0": "a"}})).unwrap();
        assert_eq!(h.items, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_length_key_is_ignored() {
        let h: Holder =
            serde_json::from_value(json!({"items": {"0": "a", "1": "b", "length": 2}})).unwrap();
        assert_eq!(h.items, vec!["a", "b"]);
    }

    #[test]
    fn test_null_and_missing_become_empty() {
        let h: Holder = serde_json::from_value(json!({"items": null})).unwrap();
        assert!(h.items.is_empty());
        let h: Holder = serde_json::from_value(json!({})).unwrap();
        assert!(h.items.is_empty());
    }

    #[test]
    fn test_scalar_becomes_single_element() {
        let h: Holder = serde_json::from_value(json!({"items": "only"})).unwrap();
        assert_eq!(h.items, vec!["only"]);
    }

    #[test]
    fn test_plain_object_is_not_treated_as_sequence() {
        let values = normalize(json!({"name": "x"}));
        assert_eq!(values, vec![json!({"name": "x"})]);
    }

    #[test]
    fn test_wrong_element_type_is_an_error() {
        let result: Result<Holder, _> = serde_json::from_value(json!({"items": [1, 2]}));
        assert!(result.is_err());
    }
}

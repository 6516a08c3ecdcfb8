//! Serde adapters for the vendor's wire quirks.
//!
//! The API is PHP-shaped: empty collections arrive as `{}` or `[]`
//! interchangeably, maps are keyed by stringified integers, timestamps are
//! unix seconds that may come quoted, and linked entities switch between
//! `[{"id": ...}]` and `{"id": [...]}` depending on the endpoint. All of
//! that tolerance lives here so the models stay plain.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

pub(crate) fn bool_true() -> bool {
    true
}

/// Integer that may arrive as a number or a quoted number.
pub fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("not an integer: {}", n))),
        Value::String(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("not an integer: '{}'", s))),
        other => Err(D::Error::custom(format!("not an integer: {}", other))),
    }
}

/// Boolean that may arrive as a bool, 0/1, or "Y"/"N".
pub fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        Value::String(s) => Ok(matches!(s.as_str(), "1" | "true" | "Y" | "y")),
        other => Err(D::Error::custom(format!("not a boolean: {}", other))),
    }
}

/// Map keyed by stringified integers; an empty PHP array (`[]`) also
/// deserializes as empty. A non-empty array is accepted when its elements
/// carry their own `id`.
pub fn int_key_map<'de, D, T>(deserializer: D) -> Result<BTreeMap<i64, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| {
                let id = key
                    .parse::<i64>()
                    .map_err(|_| D::Error::custom(format!("non-integer map key '{}'", key)))?;
                let item = serde_json::from_value(value).map_err(D::Error::custom)?;
                Ok((id, item))
            })
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .map(|value| {
                let id = value
                    .get("id")
                    .and_then(crate::field_types::as_i64)
                    .ok_or_else(|| D::Error::custom("list element without id"))?;
                let item = serde_json::from_value(value).map_err(D::Error::custom)?;
                Ok((id, item))
            })
            .collect(),
        other => Err(D::Error::custom(format!("not a map: {}", other))),
    }
}

/// As [`int_key_map`], but empty input collapses to `None`.
pub fn opt_int_key_map<'de, D, T>(deserializer: D) -> Result<Option<BTreeMap<i64, T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let map: BTreeMap<i64, T> = int_key_map(deserializer)?;
    Ok(if map.is_empty() { None } else { Some(map) })
}

/// Unix-seconds timestamps, tolerant of quoting; serialized back as
/// integer seconds.
pub mod ts_opt {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_i64(at.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let secs = match Value::deserialize(deserializer)? {
            Value::Null => return Ok(None),
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| D::Error::custom(format!("not a timestamp: {}", n)))?,
            Value::String(s) => s
                .parse()
                .map_err(|_| D::Error::custom(format!("not a timestamp: '{}'", s)))?,
            other => return Err(D::Error::custom(format!("not a timestamp: {}", other))),
        };
        DateTime::from_timestamp(secs, 0)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {}", secs)))
    }
}

/// Tags arrive as `[{"id": ..., "name": ...}]` and are posted back as a
/// comma-joined string.
pub mod tags {
    use super::*;

    pub fn serialize<S: Serializer>(tags: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&tags.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) if map.is_empty() => Ok(Vec::new()),
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(mut tag) => match tag.remove("name") {
                        Some(Value::String(name)) => Some(name),
                        _ => None,
                    },
                    Value::String(name) => Some(name),
                    _ => None,
                })
                .collect()),
            other => Err(D::Error::custom(format!("not a tag list: {}", other))),
        }
    }
}

/// Linked-entity id lists: `[{"id": 1}, ...]`, `{"id": [1, ...]}`, a bare
/// id list, or an empty `{}`.
pub fn link_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<i64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Object(mut map) => match map.remove("id") {
            Some(Value::Array(ids)) => Ok(ids
                .iter()
                .filter_map(crate::field_types::as_i64)
                .collect()),
            Some(id) => Ok(crate::field_types::as_i64(&id).into_iter().collect()),
            None => Ok(Vec::new()),
        },
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => obj.get("id").and_then(crate::field_types::as_i64),
                other => crate::field_types::as_i64(other),
            })
            .collect()),
        other => Err(D::Error::custom(format!("not a link list: {}", other))),
    }
}

/// `{}` instead of a missing key means "nothing here".
pub fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Object(map) if map.is_empty() => Ok(None),
        Value::Array(items) if items.is_empty() => Ok(None),
        other => serde_json::from_value(other).map(Some).map_err(D::Error::custom),
    }
}

/// Human-readable rendering of a wire error message that may not be a
/// plain string.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        #[serde(default, deserialize_with = "tags::deserialize")]
        tags: Vec<String>,
        #[serde(default, deserialize_with = "link_ids")]
        contacts: Vec<i64>,
        #[serde(default, deserialize_with = "ts_opt::deserialize")]
        updated_at: Option<DateTime<Utc>>,
    }

    #[test]
    fn tags_decode_from_objects() {
        let w: Wrapper =
            serde_json::from_value(json!({"tags": [{"id": 1, "name": "x"}, {"name": "y"}]}))
                .unwrap();
        assert_eq!(w.tags, vec!["x", "y"]);
    }

    #[test]
    fn empty_php_object_means_no_tags() {
        let w: Wrapper = serde_json::from_value(json!({"tags": {}})).unwrap();
        assert!(w.tags.is_empty());
    }

    #[test]
    fn link_ids_accept_all_shapes() {
        for (raw, expect) in [
            (json!({"contacts": {"id": [3, 4]}}), vec![3, 4]),
            (json!({"contacts": [{"id": 5}, {"id": 6}]}), vec![5, 6]),
            (json!({"contacts": [7, 8]}), vec![7, 8]),
            (json!({"contacts": {}}), vec![]),
            (json!({}), vec![]),
        ] {
            let w: Wrapper = serde_json::from_value(raw).unwrap();
            assert_eq!(w.contacts, expect);
        }
    }

    #[test]
    fn timestamps_accept_quoted_seconds() {
        let w: Wrapper = serde_json::from_value(json!({"updated_at": "1500000000"})).unwrap();
        assert_eq!(w.updated_at.unwrap().timestamp(), 1_500_000_000);
        let w: Wrapper = serde_json::from_value(json!({"updated_at": 1500000001})).unwrap();
        assert_eq!(w.updated_at.unwrap().timestamp(), 1_500_000_001);
    }
}

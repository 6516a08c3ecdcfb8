//! Wire field types and their codecs.
//!
//! Every custom field value travels as a list envelope whose inner shape
//! depends on the field type: single-value types carry exactly one
//! `{"value": X}` element, multi-value types carry several, keyed types
//! carry `{"enum": id, "value": X}` pairs, and composites carry
//! subtype-coded parts. `decode` and `encode` are the only two entry
//! points; everything else in the crate works with [`FieldValue`].

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::custom_fields::CustomFieldMetadata;
use crate::errors::ApiError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Vendor field-type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text = 1,
    Numeric = 2,
    Checkbox = 3,
    Select = 4,
    MultiSelect = 5,
    Date = 6,
    Url = 7,
    MultiText = 8,
    TextArea = 9,
    RadioButton = 10,
    StreetAddress = 11,
    SmartAddress = 13,
    Birthday = 14,
    LegalEntity = 15,
    Items = 16,
}

impl FieldType {
    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            1 => FieldType::Text,
            2 => FieldType::Numeric,
            3 => FieldType::Checkbox,
            4 => FieldType::Select,
            5 => FieldType::MultiSelect,
            6 => FieldType::Date,
            7 => FieldType::Url,
            8 => FieldType::MultiText,
            9 => FieldType::TextArea,
            10 => FieldType::RadioButton,
            11 => FieldType::StreetAddress,
            13 => FieldType::SmartAddress,
            14 => FieldType::Birthday,
            15 => FieldType::LegalEntity,
            16 => FieldType::Items,
            _ => return None,
        })
    }

    pub const fn code(self) -> i64 {
        self as i64
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = crate::wire::lenient_i64(deserializer)?;
        FieldType::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("unknown field type code {}", code)))
    }
}

/// Street address assembled from subtype-coded parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmartAddress {
    pub line_1: Option<String>,
    pub line_2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

/// Legal entity record nested under a single `value` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kpp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_uid: Option<String>,
}

/// A decoded custom field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Numeric(i64),
    Checkbox(bool),
    Select(String),
    MultiSelect(Vec<String>),
    Date(NaiveDate),
    Url(String),
    /// Enum label to value, e.g. `{"WORK": "+1555..."}`.
    MultiText(BTreeMap<String, String>),
    TextArea(String),
    RadioButton(String),
    StreetAddress(String),
    SmartAddress(SmartAddress),
    Birthday(NaiveDate),
    LegalEntity(LegalEntity),
    /// Raw passthrough; the vendor contract leaves the inner shape open.
    Items(Vec<Value>),
}

/// Decodes a wire `values` list into a typed value.
///
/// An empty or missing wire value decodes to `None` regardless of type;
/// a present value of the wrong envelope shape is a `Format` error.
pub fn decode(
    field_type: FieldType,
    values: Option<&Value>,
    meta: &CustomFieldMetadata,
) -> Result<Option<FieldValue>, ApiError> {
    let entries = match values {
        None | Some(Value::Null) => return Ok(None),
        // PHP serializes empty arrays as {}
        Some(Value::Object(map)) if map.is_empty() => return Ok(None),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ApiError::Format(format!(
                "field {} ({:?}): values is not a list: {}",
                meta.id, field_type, other
            )))
        }
    };
    if entries.is_empty() {
        return Ok(None);
    }

    let value = match field_type {
        FieldType::Text => FieldValue::Text(single_string(entries, meta)?),
        FieldType::Url => FieldValue::Url(single_string(entries, meta)?),
        FieldType::TextArea => FieldValue::TextArea(single_string(entries, meta)?),
        FieldType::StreetAddress => FieldValue::StreetAddress(single_string(entries, meta)?),
        FieldType::Numeric => {
            let raw = single_value(entries, meta)?;
            FieldValue::Numeric(as_i64(raw).ok_or_else(|| {
                ApiError::Format(format!("field {}: non-numeric value {}", meta.id, raw))
            })?)
        }
        FieldType::Checkbox => {
            let raw = single_value(entries, meta)?;
            FieldValue::Checkbox(as_bool(raw).ok_or_else(|| {
                ApiError::Format(format!("field {}: non-boolean value {}", meta.id, raw))
            })?)
        }
        FieldType::Date => FieldValue::Date(single_date(entries, meta)?),
        FieldType::Birthday => FieldValue::Birthday(single_date(entries, meta)?),
        FieldType::Select => FieldValue::Select(single_label(entries, meta)?),
        FieldType::RadioButton => FieldValue::RadioButton(single_label(entries, meta)?),
        FieldType::MultiSelect => {
            let mut labels = Vec::with_capacity(entries.len());
            for entry in entries {
                let label = entry_string(entry, meta)?;
                check_label(&label, meta)?;
                labels.push(label);
            }
            FieldValue::MultiSelect(labels)
        }
        FieldType::MultiText => {
            // Duplicate labels collapse last-wins.
            let mut map = BTreeMap::new();
            for entry in entries {
                let enum_id = entry
                    .get("enum")
                    .and_then(as_i64)
                    .ok_or_else(|| {
                        ApiError::Format(format!("field {}: entry without enum key", meta.id))
                    })?;
                let label = meta.enum_label(enum_id).ok_or_else(|| {
                    ApiError::Format(format!("field {}: unknown enum id {}", meta.id, enum_id))
                })?;
                map.insert(label.to_string(), entry_string(entry, meta)?);
            }
            FieldValue::MultiText(map)
        }
        FieldType::SmartAddress => {
            let mut address = SmartAddress::default();
            for entry in entries {
                let part = entry_string(entry, meta)?;
                let slot = match entry.get("subtype").and_then(as_i64) {
                    Some(1) => &mut address.line_1,
                    Some(2) => &mut address.line_2,
                    Some(3) => &mut address.city,
                    Some(4) => &mut address.state,
                    Some(5) => &mut address.zip,
                    Some(6) => &mut address.country,
                    _ => continue,
                };
                *slot = Some(part);
            }
            FieldValue::SmartAddress(address)
        }
        FieldType::LegalEntity => {
            let raw = single_value(entries, meta)?;
            let entity: LegalEntity = serde_json::from_value(raw.clone()).map_err(|e| {
                ApiError::Format(format!("field {}: malformed legal entity: {}", meta.id, e))
            })?;
            FieldValue::LegalEntity(entity)
        }
        FieldType::Items => FieldValue::Items(entries.clone()),
    };
    Ok(Some(value))
}

/// Encodes a typed value into the wire `values` list for its field type.
pub fn encode(
    field_type: FieldType,
    value: &FieldValue,
    meta: &CustomFieldMetadata,
) -> Result<Value, ApiError> {
    let mismatch = || {
        ApiError::Format(format!(
            "field {} ({:?}): value {:?} does not match the field type",
            meta.id, field_type, value
        ))
    };

    Ok(match (field_type, value) {
        (FieldType::Text, FieldValue::Text(s))
        | (FieldType::Url, FieldValue::Url(s))
        | (FieldType::TextArea, FieldValue::TextArea(s))
        | (FieldType::StreetAddress, FieldValue::StreetAddress(s)) => json!([{ "value": s }]),
        (FieldType::Numeric, FieldValue::Numeric(n)) => json!([{ "value": n }]),
        (FieldType::Checkbox, FieldValue::Checkbox(b)) => json!([{ "value": b }]),
        (FieldType::Date, FieldValue::Date(d)) | (FieldType::Birthday, FieldValue::Birthday(d)) => {
            json!([{ "value": d.format(DATE_FORMAT).to_string() }])
        }
        (FieldType::Select, FieldValue::Select(label))
        | (FieldType::RadioButton, FieldValue::RadioButton(label)) => {
            check_label(label, meta)?;
            json!([{ "value": label }])
        }
        (FieldType::MultiSelect, FieldValue::MultiSelect(labels)) => {
            for label in labels {
                check_label(label, meta)?;
            }
            Value::Array(labels.iter().map(|l| json!({ "value": l })).collect())
        }
        (FieldType::MultiText, FieldValue::MultiText(map)) => {
            let mut entries = Vec::with_capacity(map.len());
            for (label, text) in map {
                let enum_id = meta.enum_id(label).ok_or_else(|| {
                    ApiError::Format(format!(
                        "field {}: unknown enum label '{}'",
                        meta.id, label
                    ))
                })?;
                entries.push(json!({ "enum": enum_id, "value": text }));
            }
            Value::Array(entries)
        }
        (FieldType::SmartAddress, FieldValue::SmartAddress(address)) => {
            let parts = [
                (1, &address.line_1),
                (2, &address.line_2),
                (3, &address.city),
                (4, &address.state),
                (5, &address.zip),
                (6, &address.country),
            ];
            Value::Array(
                parts
                    .iter()
                    .filter_map(|(subtype, part)| {
                        part.as_ref()
                            .map(|p| json!({ "value": p, "subtype": subtype }))
                    })
                    .collect(),
            )
        }
        (FieldType::LegalEntity, FieldValue::LegalEntity(entity)) => {
            let inner = serde_json::to_value(entity).map_err(|e| {
                ApiError::Format(format!("field {}: legal entity encode: {}", meta.id, e))
            })?;
            json!([{ "value": inner }])
        }
        (FieldType::Items, FieldValue::Items(items)) => Value::Array(items.clone()),
        _ => return Err(mismatch()),
    })
}

fn single_value<'a>(
    entries: &'a [Value],
    meta: &CustomFieldMetadata,
) -> Result<&'a Value, ApiError> {
    if entries.len() != 1 {
        return Err(ApiError::Format(format!(
            "field {}: expected a single value, got {}",
            meta.id,
            entries.len()
        )));
    }
    entries[0]
        .get("value")
        .ok_or_else(|| ApiError::Format(format!("field {}: entry without value key", meta.id)))
}

fn entry_string(entry: &Value, meta: &CustomFieldMetadata) -> Result<String, ApiError> {
    let raw = entry
        .get("value")
        .ok_or_else(|| ApiError::Format(format!("field {}: entry without value key", meta.id)))?;
    match raw {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ApiError::Format(format!(
            "field {}: expected string value, got {}",
            meta.id, other
        ))),
    }
}

fn single_string(entries: &[Value], meta: &CustomFieldMetadata) -> Result<String, ApiError> {
    single_value(entries, meta)?;
    entry_string(&entries[0], meta)
}

fn single_date(entries: &[Value], meta: &CustomFieldMetadata) -> Result<NaiveDate, ApiError> {
    let raw = single_string(entries, meta)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| ApiError::Format(format!("field {}: bad date '{}': {}", meta.id, raw, e)))
}

fn single_label(entries: &[Value], meta: &CustomFieldMetadata) -> Result<String, ApiError> {
    let label = single_string(entries, meta)?;
    check_label(&label, meta)?;
    Ok(label)
}

fn check_label(label: &str, meta: &CustomFieldMetadata) -> Result<(), ApiError> {
    if meta.enum_id(label).is_none() {
        return Err(ApiError::Format(format!(
            "field {}: '{}' is not among the known enum labels",
            meta.id, label
        )));
    }
    Ok(())
}

pub(crate) fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "0" | "false" | "N" => Some(false),
            "1" | "true" | "Y" => Some(true),
            _ => None,
        },
        _ => None,
    }
}

//! Two-phase custom field binding.
//!
//! Entity types declare their custom fields as descriptor data; nothing is
//! resolved at type-definition time because field metadata is per-account
//! and only available after an authenticated account-info fetch. At first
//! serialize or deserialize of a kind, [`BoundSchema::bind`] matches every
//! declared descriptor against the account's metadata, synthesizes bindings
//! for account fields no descriptor claimed, and freezes the id set into
//! the container lookup tables. A bound schema is immutable; a metadata
//! refresh produces a new one and retires the old registry entry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::custom_fields::{
    resolve, CustomFieldMetadata, CustomFieldsData, FieldTables,
};
use crate::errors::{ApiError, BindError};
use crate::field_types;
use crate::models::Model;

/// One account field after binding, with the accessor key when a declared
/// descriptor claimed it.
#[derive(Debug, Clone)]
pub struct BoundField {
    pub meta: CustomFieldMetadata,
    pub declared_key: Option<&'static str>,
}

/// Frozen binding of one entity kind against one account-info snapshot.
#[derive(Debug)]
pub struct BoundSchema {
    kind: &'static str,
    fields: BTreeMap<i64, BoundField>,
    declared: BTreeMap<&'static str, i64>,
    tables: Arc<FieldTables>,
}

impl BoundSchema {
    /// Binds a kind's declared descriptors against account metadata.
    ///
    /// Any descriptor that fails to resolve makes the whole kind unusable;
    /// a half-bound type is worse than a loud failure at bind time.
    /// Account fields with no descriptor are synthesized so their values
    /// still round-trip through the container.
    pub fn bind<M: Model>(
        metadata_by_id: &BTreeMap<i64, CustomFieldMetadata>,
    ) -> Result<Self, ApiError> {
        let mut fields: BTreeMap<i64, BoundField> = BTreeMap::new();
        let mut declared = BTreeMap::new();

        for descriptor in M::descriptors() {
            let meta = resolve(descriptor, metadata_by_id)?;
            if fields.contains_key(&meta.id) {
                return Err(BindError::Duplicate {
                    field: descriptor.key.to_string(),
                    id: meta.id,
                }
                .into());
            }
            tracing::debug!(
                "bound {}.{} to field {} '{}'",
                M::NAME,
                descriptor.key,
                meta.id,
                meta.name
            );
            declared.insert(descriptor.key, meta.id);
            fields.insert(
                meta.id,
                BoundField {
                    meta: meta.clone(),
                    declared_key: Some(descriptor.key),
                },
            );
        }

        for (id, meta) in metadata_by_id {
            if !fields.contains_key(id) {
                fields.insert(
                    *id,
                    BoundField {
                        meta: meta.clone(),
                        declared_key: None,
                    },
                );
            }
        }

        let tables = Arc::new(FieldTables::from_fields(
            fields.iter().map(|(id, field)| (*id, field.meta.name.clone())),
        ));

        Ok(Self {
            kind: M::NAME,
            fields,
            declared,
            tables,
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn field(&self, id: i64) -> Option<&BoundField> {
        self.fields.get(&id)
    }

    pub fn declared_id(&self, key: &str) -> Option<i64> {
        self.declared.get(key).copied()
    }

    /// Fresh value container backed by this schema's frozen tables.
    pub fn container(&self) -> CustomFieldsData {
        CustomFieldsData::new(self.tables.clone())
    }

    /// Splits raw wire entries between declared accessors and the
    /// container. Entries for fields the account no longer advertises are
    /// skipped; an undeclared field never produces a transliterated
    /// attribute name.
    pub fn decode_custom<M: Model>(&self, model: &mut M, raw: &Value) -> Result<(), ApiError> {
        let entries = match raw {
            Value::Null => return Ok(()),
            Value::Object(map) if map.is_empty() => return Ok(()),
            Value::Array(entries) => entries,
            other => {
                return Err(ApiError::Format(format!(
                    "{}: custom_fields is not a list: {}",
                    self.kind, other
                )))
            }
        };

        for entry in entries {
            let id = entry
                .get("id")
                .and_then(field_types::as_i64)
                .ok_or_else(|| {
                    ApiError::Format(format!("{}: custom field entry without id", self.kind))
                })?;
            let Some(bound) = self.fields.get(&id) else {
                tracing::warn!("{}: skipping unbound custom field {}", self.kind, id);
                continue;
            };
            let decoded =
                field_types::decode(bound.meta.field_type, entry.get("values"), &bound.meta)?;
            if let Some(value) = decoded {
                match bound.declared_key {
                    Some(key) => model.set_declared_value(key, value),
                    None => model.custom_fields_mut().insert_id(id, value),
                }
            }
        }
        Ok(())
    }

    /// Merges container values and declared accessor values into the
    /// outgoing custom-fields payload. Declared values win over a stale
    /// container value under the same id.
    pub fn encode_custom<M: Model>(&self, model: &M) -> Result<Option<Value>, ApiError> {
        let mut encoded: BTreeMap<i64, Value> = BTreeMap::new();

        for (id, value) in model.custom_fields().iter() {
            let bound = self.fields.get(&id).ok_or_else(|| {
                ApiError::UnknownField(format!(
                    "{}: container holds field {} unknown to the current binding",
                    self.kind, id
                ))
            })?;
            encoded.insert(id, field_types::encode(bound.meta.field_type, value, &bound.meta)?);
        }

        for descriptor in M::descriptors() {
            let Some(value) = model.declared_value(descriptor.key) else {
                continue;
            };
            let id = self.declared_id(descriptor.key).ok_or_else(|| {
                ApiError::UnknownField(format!(
                    "{}: declared field '{}' is not bound",
                    self.kind, descriptor.key
                ))
            })?;
            let bound = self.fields.get(&id).ok_or_else(|| {
                ApiError::UnknownField(format!("{}: field {} is not bound", self.kind, id))
            })?;
            encoded.insert(id, field_types::encode(bound.meta.field_type, &value, &bound.meta)?);
        }

        if encoded.is_empty() {
            return Ok(None);
        }
        Ok(Some(Value::Array(
            encoded
                .into_iter()
                .map(|(id, values)| serde_json::json!({ "id": id, "values": values }))
                .collect(),
        )))
    }
}

/// Deserializes one wire payload into an entity of the bound kind.
pub fn load_entity<M: Model>(mut raw: Value, schema: &BoundSchema) -> Result<M, ApiError> {
    let custom = raw
        .as_object_mut()
        .and_then(|obj| obj.remove("custom_fields"));
    let mut model: M = serde_json::from_value(raw)
        .map_err(|e| ApiError::Format(format!("malformed {} payload: {}", M::NAME, e)))?;
    *model.custom_fields_mut() = schema.container();
    if let Some(custom) = custom {
        schema.decode_custom(&mut model, &custom)?;
    }
    Ok(model)
}

/// Serializes an entity of the bound kind into its wire payload.
pub fn dump_entity<M: Model>(model: &M, schema: &BoundSchema) -> Result<Value, ApiError> {
    let mut raw = serde_json::to_value(model)
        .map_err(|e| ApiError::Format(format!("{} serialize: {}", M::NAME, e)))?;
    let Some(obj) = raw.as_object_mut() else {
        return Err(ApiError::Format(format!(
            "{} did not serialize to an object",
            M::NAME
        )));
    };
    if let Some(custom) = schema.encode_custom(model)? {
        obj.insert("custom_fields".to_string(), custom);
    }
    model.dump_extras(obj);
    Ok(raw)
}

//! Account-defined custom fields: metadata, binding descriptors, and the
//! per-entity value container.
//!
//! An account defines its own custom fields per entity kind. Field ids are
//! unique within that scope; names are not, so every name lookup has to
//! survive collisions. Entity types declare their custom fields as
//! [`CustomFieldDescriptor`] data and the schema binder matches each
//! descriptor against exactly one metadata record at first use.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::{ApiError, BindError};
use crate::field_types::{FieldType, FieldValue};
use crate::wire;

/// One account-defined field, as returned by account info.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomFieldMetadata {
    #[serde(deserialize_with = "wire::lenient_i64")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    pub field_type: FieldType,
    #[serde(default, deserialize_with = "wire::opt_int_key_map")]
    pub enums: Option<BTreeMap<i64, String>>,
    #[serde(default, deserialize_with = "wire::lenient_bool")]
    pub is_deletable: bool,
    #[serde(default = "wire::bool_true", deserialize_with = "wire::lenient_bool")]
    pub is_visible: bool,
    #[serde(default)]
    pub origin: Option<String>,
}

impl CustomFieldMetadata {
    pub fn enum_label(&self, enum_id: i64) -> Option<&str> {
        self.enums.as_ref()?.get(&enum_id).map(String::as_str)
    }

    pub fn enum_id(&self, label: &str) -> Option<i64> {
        self.enums
            .as_ref()?
            .iter()
            .find(|(_, l)| l.as_str() == label)
            .map(|(id, _)| *id)
    }
}

/// How a declared field identifies its account metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindBy {
    Id(i64),
    Code(&'static str),
    Name(&'static str),
}

/// A statically declared custom field, unresolved until first use.
#[derive(Debug, Clone, Copy)]
pub struct CustomFieldDescriptor {
    /// Accessor key on the entity type, e.g. `"position"`.
    pub key: &'static str,
    pub bind: BindBy,
    pub field_type: FieldType,
}

/// Matches a descriptor against exactly one metadata record.
///
/// By id the lookup is exact; by code or name it is a linear scan that must
/// hit exactly once. Name ambiguity is reported before type filtering, so
/// two same-named fields fail the bind even when only one has the declared
/// type. The matched record's type must then equal the declared one.
pub fn resolve<'m>(
    descriptor: &CustomFieldDescriptor,
    metadata_by_id: &'m BTreeMap<i64, CustomFieldMetadata>,
) -> Result<&'m CustomFieldMetadata, BindError> {
    let found = match descriptor.bind {
        BindBy::Id(id) => metadata_by_id.get(&id).ok_or_else(|| BindError::NoMatch {
            field: descriptor.key.to_string(),
        })?,
        BindBy::Code(code) => scan(descriptor, metadata_by_id, |m| {
            m.code.as_deref() == Some(code)
        })?,
        BindBy::Name(name) => scan(descriptor, metadata_by_id, |m| m.name == name)?,
    };
    if found.field_type != descriptor.field_type {
        return Err(BindError::TypeMismatch {
            field: descriptor.key.to_string(),
            expected: descriptor.field_type,
            actual: found.field_type,
        });
    }
    Ok(found)
}

fn scan<'m>(
    descriptor: &CustomFieldDescriptor,
    metadata_by_id: &'m BTreeMap<i64, CustomFieldMetadata>,
    matches: impl Fn(&CustomFieldMetadata) -> bool,
) -> Result<&'m CustomFieldMetadata, BindError> {
    let mut matched = metadata_by_id.values().filter(|m| matches(m));
    let first = matched.next().ok_or_else(|| BindError::NoMatch {
        field: descriptor.key.to_string(),
    })?;
    let rest = matched.count();
    if rest > 0 {
        return Err(BindError::Ambiguous {
            field: descriptor.key.to_string(),
            matched: rest + 1,
        });
    }
    Ok(first)
}

/// Frozen id/name lookup tables for one entity kind.
///
/// Built once per bind; containers hold an `Arc` to the snapshot, so a
/// rebind leaves stale containers pointing at the old tables instead of
/// silently changing resolution under them.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FieldTables {
    id_to_name: BTreeMap<i64, String>,
    name_to_ids: BTreeMap<String, BTreeSet<i64>>,
}

impl FieldTables {
    pub fn from_fields<I: IntoIterator<Item = (i64, String)>>(fields: I) -> Self {
        let mut tables = FieldTables::default();
        for (id, name) in fields {
            tables.name_to_ids.entry(name.clone()).or_default().insert(id);
            tables.id_to_name.insert(id, name);
        }
        tables
    }

    pub fn name_of(&self, id: i64) -> Option<&str> {
        self.id_to_name.get(&id).map(String::as_str)
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.id_to_name.contains_key(&id)
    }
}

/// Key accepted by the container: numeric field id or field name.
#[derive(Debug, Clone, Copy)]
pub enum FieldKey<'a> {
    Id(i64),
    Name(&'a str),
}

impl From<i64> for FieldKey<'static> {
    fn from(id: i64) -> Self {
        FieldKey::Id(id)
    }
}

impl<'a> From<&'a str> for FieldKey<'a> {
    fn from(name: &'a str) -> Self {
        FieldKey::Name(name)
    }
}

/// Per-entity custom field values, keyed internally by numeric id.
///
/// Addressable by id or by name. A name shared by several bound fields
/// is `AmbiguousField` (use the id instead); an id or name with no bound
/// field is `UnknownField`.
#[derive(Debug, Clone, Default)]
pub struct CustomFieldsData {
    tables: Arc<FieldTables>,
    values: BTreeMap<i64, FieldValue>,
}

impl CustomFieldsData {
    pub fn new(tables: Arc<FieldTables>) -> Self {
        Self {
            tables,
            values: BTreeMap::new(),
        }
    }

    fn resolve_key(&self, key: FieldKey<'_>) -> Result<i64, ApiError> {
        match key {
            FieldKey::Id(id) => {
                if !self.tables.contains_id(id) {
                    return Err(ApiError::UnknownField(format!("id {}", id)));
                }
                Ok(id)
            }
            FieldKey::Name(name) => {
                let ids = self
                    .tables
                    .name_to_ids
                    .get(name)
                    .filter(|ids| !ids.is_empty())
                    .ok_or_else(|| ApiError::UnknownField(format!("name '{}'", name)))?;
                if ids.len() > 1 {
                    return Err(ApiError::AmbiguousField(format!(
                        "'{}' is shared by fields {:?}",
                        name, ids
                    )));
                }
                Ok(*ids.iter().next().unwrap_or(&0))
            }
        }
    }

    pub fn get<'a, K: Into<FieldKey<'a>>>(&self, key: K) -> Result<Option<&FieldValue>, ApiError> {
        let id = self.resolve_key(key.into())?;
        Ok(self.values.get(&id))
    }

    pub fn set<'a, K: Into<FieldKey<'a>>>(
        &mut self,
        key: K,
        value: FieldValue,
    ) -> Result<(), ApiError> {
        let id = self.resolve_key(key.into())?;
        self.values.insert(id, value);
        Ok(())
    }

    pub fn unset<'a, K: Into<FieldKey<'a>>>(
        &mut self,
        key: K,
    ) -> Result<Option<FieldValue>, ApiError> {
        let id = self.resolve_key(key.into())?;
        Ok(self.values.remove(&id))
    }

    pub fn contains<'a, K: Into<FieldKey<'a>>>(&self, key: K) -> Result<bool, ApiError> {
        let id = self.resolve_key(key.into())?;
        Ok(self.values.contains_key(&id))
    }

    /// Stores by id without a table check; used on the decode path where
    /// ids come from the bound schema itself.
    pub(crate) fn insert_id(&mut self, id: i64, value: FieldValue) {
        self.values.insert(id, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &FieldValue)> {
        self.values.iter().map(|(id, v)| (*id, v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(entries: &[(i64, &str, FieldType)]) -> BTreeMap<i64, CustomFieldMetadata> {
        entries
            .iter()
            .map(|(id, name, field_type)| {
                (
                    *id,
                    CustomFieldMetadata {
                        id: *id,
                        name: name.to_string(),
                        code: None,
                        field_type: *field_type,
                        enums: None,
                        is_deletable: true,
                        is_visible: true,
                        origin: None,
                    },
                )
            })
            .collect()
    }

    fn descriptor(bind: BindBy, field_type: FieldType) -> CustomFieldDescriptor {
        CustomFieldDescriptor {
            key: "my_field",
            bind,
            field_type,
        }
    }

    #[test]
    fn resolve_by_id_checks_type() {
        let meta = metadata(&[(1, "Position", FieldType::Text)]);
        let d = descriptor(BindBy::Id(1), FieldType::Text);
        assert_eq!(resolve(&d, &meta).unwrap().id, 1);

        let d = descriptor(BindBy::Id(1), FieldType::Numeric);
        assert!(matches!(
            resolve(&d, &meta),
            Err(BindError::TypeMismatch { .. })
        ));

        let d = descriptor(BindBy::Id(7), FieldType::Text);
        assert!(matches!(resolve(&d, &meta), Err(BindError::NoMatch { .. })));
    }

    #[test]
    fn name_ambiguity_detected_before_type_filtering() {
        // Only one of the two records has the declared type; the shared
        // name must still fail the bind.
        let meta = metadata(&[
            (1, "Position", FieldType::Text),
            (2, "Position", FieldType::Numeric),
        ]);
        let d = descriptor(BindBy::Name("Position"), FieldType::Text);
        assert!(matches!(
            resolve(&d, &meta),
            Err(BindError::Ambiguous { matched: 2, .. })
        ));
    }

    #[test]
    fn resolve_is_idempotent() {
        let meta = metadata(&[(1, "Position", FieldType::Text)]);
        let d = descriptor(BindBy::Name("Position"), FieldType::Text);
        let first = resolve(&d, &meta).unwrap().id;
        let second = resolve(&d, &meta).unwrap().id;
        assert_eq!(first, second);
    }

    fn container(fields: &[(i64, &str)]) -> CustomFieldsData {
        CustomFieldsData::new(Arc::new(FieldTables::from_fields(
            fields.iter().map(|(id, name)| (*id, name.to_string())),
        )))
    }

    #[test]
    fn lookup_by_shared_name_is_ambiguous() {
        let mut data = container(&[(1, "Phone"), (2, "Phone"), (3, "Email")]);
        assert!(matches!(
            data.get("Phone"),
            Err(ApiError::AmbiguousField(_))
        ));
        assert!(matches!(
            data.set("Phone", FieldValue::Text("x".into())),
            Err(ApiError::AmbiguousField(_))
        ));
        // By id both are still reachable.
        data.set(1, FieldValue::Text("a".into())).unwrap();
        data.set(2, FieldValue::Text("b".into())).unwrap();
        assert_eq!(data.get(1).unwrap(), Some(&FieldValue::Text("a".into())));
    }

    #[test]
    fn lookup_by_unknown_key_fails() {
        let data = container(&[(1, "Phone")]);
        assert!(matches!(data.get("Fax"), Err(ApiError::UnknownField(_))));
        assert!(matches!(data.get(9), Err(ApiError::UnknownField(_))));
        assert!(matches!(data.contains(9), Err(ApiError::UnknownField(_))));
    }

    #[test]
    fn unique_name_resolves() {
        let mut data = container(&[(1, "Phone"), (3, "Email")]);
        data.set("Email", FieldValue::Text("a@b.c".into())).unwrap();
        assert!(data.contains("Email").unwrap());
        assert_eq!(
            data.get(3).unwrap(),
            Some(&FieldValue::Text("a@b.c".into()))
        );
        assert_eq!(data.unset("Email").unwrap(), Some(FieldValue::Text("a@b.c".into())));
        assert!(!data.contains(3).unwrap());
    }
}

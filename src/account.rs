//! Per-account snapshot returned by the account endpoint.
//!
//! Custom field metadata, users, groups, and pipelines all hang off this
//! one response. The client caches it and the schema binder reads per-kind
//! field metadata out of it; refreshing the snapshot invalidates every
//! bound schema.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::custom_fields::CustomFieldMetadata;
use crate::models::Pipeline;
use crate::wire;

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "wire::lenient_i64")]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default, deserialize_with = "wire::lenient_bool")]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    #[serde(deserialize_with = "wire::lenient_i64")]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountEmbedded {
    #[serde(default, deserialize_with = "wire::int_key_map")]
    pub users: BTreeMap<i64, User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Entity kind (plural) to field id to metadata. A kind with no
    /// custom fields arrives as an empty PHP array.
    #[serde(default, deserialize_with = "custom_fields_by_kind")]
    pub custom_fields: BTreeMap<String, BTreeMap<i64, CustomFieldMetadata>>,
    #[serde(default, deserialize_with = "wire::int_key_map")]
    pub pipelines: BTreeMap<i64, Pipeline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    #[serde(deserialize_with = "wire::lenient_i64")]
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub current_user: Option<i64>,
    #[serde(rename = "_embedded", default)]
    pub embedded: AccountEmbedded,
}

impl AccountInfo {
    /// Field metadata for one entity kind, by plural name.
    pub fn custom_fields(&self, kind_plural: &str) -> Option<&BTreeMap<i64, CustomFieldMetadata>> {
        self.embedded.custom_fields.get(kind_plural)
    }

    pub fn current_user(&self) -> Option<&User> {
        self.embedded.users.get(&self.current_user?)
    }
}

fn custom_fields_by_kind<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, BTreeMap<i64, CustomFieldMetadata>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Array(items) if items.is_empty() => Ok(BTreeMap::new()),
        Value::Object(map) => map
            .into_iter()
            .map(|(kind, fields)| {
                let by_id = match fields {
                    Value::Array(items) if items.is_empty() => BTreeMap::new(),
                    Value::Object(fields) => fields
                        .into_iter()
                        .map(|(_, raw)| {
                            let meta: CustomFieldMetadata =
                                serde_json::from_value(raw).map_err(D::Error::custom)?;
                            Ok((meta.id, meta))
                        })
                        .collect::<Result<_, D::Error>>()?,
                    other => {
                        return Err(D::Error::custom(format!(
                            "unexpected custom_fields shape for '{}': {}",
                            kind, other
                        )))
                    }
                };
                Ok((kind, by_id))
            })
            .collect(),
        other => Err(D::Error::custom(format!(
            "unexpected custom_fields shape: {}",
            other
        ))),
    }
}

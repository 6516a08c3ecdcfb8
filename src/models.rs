//! Domain entities and the [`Model`] trait that the client, binder, and
//! reconciler operate through.
//!
//! Static attributes are plain serde fields; custom fields live either in
//! declared typed slots (bound at first use against account metadata) or in
//! the per-instance [`CustomFieldsData`] container. `meta` stashes the
//! latest per-action mutation error so a batch with partial failures can be
//! inspected without exceptions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::custom_fields::{BindBy, CustomFieldDescriptor, CustomFieldsData};
use crate::field_types::{FieldType, FieldValue};
use crate::wire;

/// Meta keys written by the mutation reconciler.
pub const ADD_ERROR: &str = "add_error";
pub const UPDATE_ERROR: &str = "update_error";
pub const DELETE_ERROR: &str = "delete_error";

/// One entity kind of the remote API.
///
/// `NAME` keys the schema registry; `PLURAL` is the endpoint path segment.
/// The declared-field accessors (`declared_value` / `set_declared_value`)
/// are the dispatch table the schema binder proxies through instead of
/// injecting attributes at runtime.
pub trait Model: Serialize + DeserializeOwned + Default + 'static {
    const NAME: &'static str;
    const PLURAL: &'static str;

    /// Statically declared custom fields, unresolved until first use.
    fn descriptors() -> &'static [CustomFieldDescriptor] {
        &[]
    }

    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }
    fn set_updated_at(&mut self, _at: DateTime<Utc>) {}

    fn meta(&self) -> &BTreeMap<String, String>;
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String>;

    fn custom_fields(&self) -> &CustomFieldsData;
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData;

    /// Reads a declared custom field by its accessor key.
    fn declared_value(&self, _key: &str) -> Option<FieldValue> {
        None
    }

    /// Writes a declared custom field by its accessor key.
    fn set_declared_value(&mut self, _key: &str, _value: FieldValue) {}

    /// Hook for dump-only keys that have no load counterpart.
    fn dump_extras(&self, _out: &mut serde_json::Map<String, Value>) {}
}

/// Reference to another entity as embedded in a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLink {
    #[serde(deserialize_with = "wire::lenient_i64")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityLink {
    pub fn new(id: i64) -> Self {
        Self { id, name: None }
    }
}

/// Serializes a link as the bare `{"id": ...}` object some endpoints
/// require.
fn link_id_only<S: serde::Serializer>(
    link: &Option<EntityLink>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(1))?;
    if let Some(link) = link {
        map.serialize_entry("id", &link.id)?;
    }
    map.end()
}

// ---------------- Contact ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::tags", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub company: Option<EntityLink>,
    #[serde(default, deserialize_with = "wire::link_ids", skip_serializing)]
    pub leads: Vec<i64>,
    #[serde(default, deserialize_with = "wire::link_ids", skip_serializing)]
    pub customers: Vec<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub closest_task_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub custom_fields: CustomFieldsData,
    #[serde(skip)]
    pub meta: BTreeMap<String, String>,
}

impl Model for Contact {
    const NAME: &'static str = "contact";
    const PLURAL: &'static str = "contacts";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.custom_fields
    }
}

/// Contact with the custom fields every fresh account ships by default.
///
/// These fields are deletable account-side, so treat this type as an
/// example: an account that removed them cannot bind it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemContact {
    #[serde(flatten)]
    pub contact: Contact,
    #[serde(skip)]
    pub position: Option<String>,
    #[serde(skip)]
    pub phone: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub email: Option<BTreeMap<String, String>>,
    #[serde(skip)]
    pub im: Option<BTreeMap<String, String>>,
}

const SYSTEM_CONTACT_FIELDS: &[CustomFieldDescriptor] = &[
    CustomFieldDescriptor {
        key: "position",
        bind: BindBy::Code("POSITION"),
        field_type: FieldType::Text,
    },
    CustomFieldDescriptor {
        key: "phone",
        bind: BindBy::Code("PHONE"),
        field_type: FieldType::MultiText,
    },
    CustomFieldDescriptor {
        key: "email",
        bind: BindBy::Code("EMAIL"),
        field_type: FieldType::MultiText,
    },
    CustomFieldDescriptor {
        key: "im",
        bind: BindBy::Code("IM"),
        field_type: FieldType::MultiText,
    },
];

impl Model for SystemContact {
    const NAME: &'static str = "contact";
    const PLURAL: &'static str = "contacts";

    fn descriptors() -> &'static [CustomFieldDescriptor] {
        SYSTEM_CONTACT_FIELDS
    }

    fn id(&self) -> Option<i64> {
        self.contact.id
    }
    fn set_id(&mut self, id: i64) {
        self.contact.id = Some(id);
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.contact.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.contact.updated_at = Some(at);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.contact.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.contact.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.contact.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.contact.custom_fields
    }

    fn declared_value(&self, key: &str) -> Option<FieldValue> {
        match key {
            "position" => self.position.clone().map(FieldValue::Text),
            "phone" => self.phone.clone().map(FieldValue::MultiText),
            "email" => self.email.clone().map(FieldValue::MultiText),
            "im" => self.im.clone().map(FieldValue::MultiText),
            _ => None,
        }
    }

    fn set_declared_value(&mut self, key: &str, value: FieldValue) {
        match (key, value) {
            ("position", FieldValue::Text(s)) => self.position = Some(s),
            ("phone", FieldValue::MultiText(m)) => self.phone = Some(m),
            ("email", FieldValue::MultiText(m)) => self.email = Some(m),
            ("im", FieldValue::MultiText(m)) => self.im = Some(m),
            _ => {}
        }
    }
}

// ---------------- Lead ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::tags", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// The API ignores attempts to change this, so it never dumps.
    #[serde(default, deserialize_with = "wire::empty_as_none", skip_serializing)]
    pub main_contact: Option<EntityLink>,
    #[serde(default, deserialize_with = "wire::link_ids", skip_serializing)]
    pub contacts: Vec<i64>,
    #[serde(
        default,
        deserialize_with = "wire::empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub company: Option<EntityLink>,
    #[serde(
        default,
        deserialize_with = "wire::empty_as_none",
        serialize_with = "link_id_only",
        skip_serializing_if = "Option::is_none"
    )]
    pub pipeline: Option<EntityLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_id: Option<i64>,
    #[serde(default, deserialize_with = "wire::lenient_bool")]
    pub is_deleted: bool,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub closest_task_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sale: i64,
    #[serde(default)]
    pub loss_reason_id: i64,
    #[serde(skip)]
    pub custom_fields: CustomFieldsData,
    #[serde(skip)]
    pub meta: BTreeMap<String, String>,
}

impl Model for Lead {
    const NAME: &'static str = "lead";
    const PLURAL: &'static str = "leads";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.custom_fields
    }

    fn dump_extras(&self, out: &mut serde_json::Map<String, Value>) {
        // Contacts load embedded but post as a flat id list under a
        // different key.
        if !self.contacts.is_empty() {
            out.insert("contacts_id".to_string(), Value::from(self.contacts.clone()));
        }
    }
}

// ---------------- Company ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Company {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::tags", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "wire::link_ids", skip_serializing)]
    pub contacts: Vec<i64>,
    #[serde(skip)]
    pub custom_fields: CustomFieldsData,
    #[serde(skip)]
    pub meta: BTreeMap<String, String>,
}

impl Model for Company {
    const NAME: &'static str = "company";
    const PLURAL: &'static str = "companies";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.custom_fields
    }
}

// ---------------- Customer ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub next_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_price: Option<i64>,
    #[serde(default, with = "wire::tags", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip)]
    pub custom_fields: CustomFieldsData,
    #[serde(skip)]
    pub meta: BTreeMap<String, String>,
}

impl Model for Customer {
    const NAME: &'static str = "customer";
    const PLURAL: &'static str = "customers";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.custom_fields
    }
}

// ---------------- Transaction ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub custom_fields: CustomFieldsData,
    #[serde(skip)]
    pub meta: BTreeMap<String, String>,
}

impl Model for Transaction {
    const NAME: &'static str = "transaction";
    const PLURAL: &'static str = "transactions";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.custom_fields
    }
}

// ---------------- Task ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::lenient_bool")]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub complete_till_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip)]
    pub custom_fields: CustomFieldsData,
    #[serde(skip)]
    pub meta: BTreeMap<String, String>,
}

impl Model for Task {
    const NAME: &'static str = "task";
    const PLURAL: &'static str = "tasks";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.custom_fields
    }
}

// ---------------- Note ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Note {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<i64>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "wire::ts_opt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::lenient_bool")]
    pub is_editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip)]
    pub custom_fields: CustomFieldsData,
    #[serde(skip)]
    pub meta: BTreeMap<String, String>,
}

impl Model for Note {
    const NAME: &'static str = "note";
    const PLURAL: &'static str = "notes";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.custom_fields
    }
}

// ---------------- Pipeline ----------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    #[serde(deserialize_with = "wire::lenient_i64")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sort: i64,
    #[serde(default, deserialize_with = "wire::lenient_bool")]
    pub is_editable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub sort: i64,
    #[serde(default, deserialize_with = "wire::lenient_bool")]
    pub is_main: bool,
    #[serde(default, deserialize_with = "wire::int_key_map")]
    pub statuses: BTreeMap<i64, PipelineStatus>,
    #[serde(skip)]
    pub custom_fields: CustomFieldsData,
    #[serde(skip)]
    pub meta: BTreeMap<String, String>,
}

impl Model for Pipeline {
    const NAME: &'static str = "pipeline";
    const PLURAL: &'static str = "pipelines";

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.meta
    }
    fn custom_fields(&self) -> &CustomFieldsData {
        &self.custom_fields
    }
    fn custom_fields_mut(&mut self) -> &mut CustomFieldsData {
        &mut self.custom_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lead_decodes_embedded_link_shapes() {
        let lead: Lead = serde_json::from_value(json!({
            "id": 5,
            "name": "Deal",
            "main_contact": {"id": 11},
            "contacts": {"id": [11, 12]},
            "company": {},
            "pipeline": {"id": 77, "name": "Main"},
            "updated_at": 1500000000,
            "tags": [{"id": 1, "name": "hot"}],
        }))
        .unwrap();
        assert_eq!(lead.main_contact, Some(EntityLink { id: 11, name: None }));
        assert_eq!(lead.contacts, vec![11, 12]);
        assert_eq!(lead.company, None);
        assert_eq!(lead.pipeline.as_ref().map(|p| p.id), Some(77));
        assert_eq!(lead.tags, vec!["hot"]);
    }

    #[test]
    fn lead_dump_omits_load_only_fields() {
        let mut lead = Lead {
            id: Some(5),
            name: Some("Deal".to_string()),
            contacts: vec![1, 2],
            main_contact: Some(EntityLink::new(1)),
            pipeline: Some(EntityLink {
                id: 77,
                name: Some("Main".to_string()),
            }),
            ..Lead::default()
        };
        lead.tags = vec!["a".to_string(), "b".to_string()];
        let raw = serde_json::to_value(&lead).unwrap();
        assert!(raw.get("contacts").is_none());
        assert!(raw.get("main_contact").is_none());
        // Pipeline dumps id-only regardless of what was loaded.
        assert_eq!(raw["pipeline"], json!({"id": 77}));
        assert_eq!(raw["tags"], json!("a,b"));

        let mut extras = serde_json::Map::new();
        lead.dump_extras(&mut extras);
        assert_eq!(extras["contacts_id"], json!([1, 2]));
    }

    #[test]
    fn contact_tolerates_php_empty_objects() {
        let contact: Contact = serde_json::from_value(json!({
            "id": 1,
            "name": "Jane",
            "company": {},
            "customers": {},
            "leads": {"id": [3]},
            "tags": {},
        }))
        .unwrap();
        assert_eq!(contact.company, None);
        assert!(contact.customers.is_empty());
        assert_eq!(contact.leads, vec![3]);
        assert!(contact.tags.is_empty());
    }

    #[test]
    fn fresh_entity_has_no_id() {
        let contact = Contact::default();
        assert_eq!(contact.id, None);
        assert!(contact.meta.is_empty());
    }
}

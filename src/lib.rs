//! AmoCRM v2 API Client Library
//!
//! This library maps the vendor's REST interface onto a typed local object
//! model: entities with account-bound custom fields, batched mutations
//! reconciled back onto the submitted objects, and offset-paged iteration
//! over the list endpoints.
//!
//! # Modules
//!
//! - `account`: Per-account snapshot (users, groups, field metadata).
//! - `batch`: Batched mutations and response reconciliation.
//! - `client`: HTTP client, session auth, endpoints.
//! - `config`: Configuration management.
//! - `constants`: Fixed vendor enumerations.
//! - `cursor`: Offset-paged lazy iteration.
//! - `custom_fields`: Field metadata, binding descriptors, value container.
//! - `errors`: Error handling types.
//! - `field_types`: Wire field types and codecs.
//! - `models`: Domain entities.
//! - `schema`: Lazy per-kind custom field binding.
//! - `wire`: Serde adapters for the vendor's wire quirks.

pub mod account;
pub mod batch;
pub mod client;
pub mod config;
pub mod constants;
pub mod cursor;
pub mod custom_fields;
pub mod errors;
pub mod field_types;
pub mod models;
pub mod schema;
pub mod wire;

pub use batch::{BatchResult, MutationBatch, PostOptions, Touch};
pub use client::{AmocrmClient, CustomFieldDefinition, GetQuery};
pub use config::Config;
pub use custom_fields::{BindBy, CustomFieldDescriptor, CustomFieldMetadata, CustomFieldsData};
pub use errors::{ApiError, BatchErrors, BindError, PostError};
pub use field_types::{FieldType, FieldValue};
pub use models::{
    Company, Contact, Customer, EntityLink, Lead, Model, Note, Pipeline, SystemContact, Task,
    Transaction,
};

//! Client for the AmoCRM v2 API.
//!
//! Session-cookie authentication with a single re-login retry on expired
//! sessions, a cached account-info snapshot, the per-kind bound schema
//! registry, list fetches, and the batched mutation endpoint.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use url::Url;

use crate::account::AccountInfo;
use crate::batch::{
    apply_errors, normalize_errors, reconcile, trunc_seconds, BatchResult, MutationBatch,
    PostOptions, Touch,
};
use crate::config::Config;
use crate::constants::{ElementType, LeadTasksFilter, NoteType};
use crate::cursor::{CursorFetch, DEFAULT_PAGE_SIZE};
use crate::errors::{ApiError, PostError};
use crate::field_types::{as_i64, FieldType};
use crate::models::{Company, Contact, Customer, Lead, Model, Note, Pipeline, Task, Transaction};
use crate::schema::{dump_entity, load_entity, BoundSchema};

// Same auth code for a wrong hash and for an expired session; the only way
// to tell them apart is to re-login once.
const AUTH_CODE_SESSION: i64 = 110;

/// Filters shared by the list endpoints. Kind-specific filters ride along
/// in `extra`.
#[derive(Debug, Clone)]
pub struct GetQuery {
    pub ids: Vec<i64>,
    pub query: Option<String>,
    pub responsible_user_id: Option<i64>,
    pub modified_since: Option<DateTime<Utc>>,
    pub cursor: Option<usize>,
    pub cursor_count: usize,
    pub extra: Vec<(String, String)>,
}

impl Default for GetQuery {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            query: None,
            responsible_user_id: None,
            modified_since: None,
            cursor: None,
            cursor_count: DEFAULT_PAGE_SIZE,
            extra: Vec::new(),
        }
    }
}

impl GetQuery {
    pub fn ids(mut self, ids: &[i64]) -> Self {
        self.ids = ids.to_vec();
        self
    }

    pub fn query(mut self, text: impl Into<String>) -> Self {
        self.query = Some(text.into());
        self
    }

    pub fn responsible_user(mut self, user_id: i64) -> Self {
        self.responsible_user_id = Some(user_id);
        self
    }

    pub fn modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.modified_since = Some(since);
        self
    }

    pub fn cursor(mut self, offset: usize) -> Self {
        self.cursor = Some(offset);
        self
    }

    pub fn page_size(mut self, rows: usize) -> Self {
        self.cursor_count = rows;
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    /// Lead filter: restrict to pipeline statuses.
    pub fn lead_statuses(self, status_ids: &[i64]) -> Self {
        self.extra("status", join_ids(status_ids))
    }

    /// Lead filter: only active (open) leads.
    pub fn lead_active(self) -> Self {
        self.extra("filter[active]", "1")
    }

    /// Lead filter: by attached-task state.
    pub fn lead_tasks(self, filter: LeadTasksFilter) -> Self {
        self.extra("filter[tasks]", filter.code().to_string())
    }

    /// Task/note filter: parent element kind.
    pub fn element_type(self, element: ElementType) -> Self {
        self.extra("type", element.as_param())
    }

    /// Task/note filter: parent element ids.
    pub fn element_ids(self, ids: &[i64]) -> Self {
        self.extra("element_id", join_ids(ids))
    }

    pub fn note_type(self, note_type: NoteType) -> Self {
        self.extra("note_type", note_type.code().to_string())
    }

    /// Transaction filter: owning customers.
    pub fn customer_ids(self, ids: &[i64]) -> Self {
        self.extra("customer_id", join_ids(ids))
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// A custom field definition for the field-administration endpoint.
#[derive(Debug, Clone)]
pub struct CustomFieldDefinition {
    /// Assigned by the server on a successful add.
    pub id: Option<i64>,
    pub name: String,
    pub field_type: FieldType,
    pub element_type: ElementType,
    /// Defaults to the account subdomain when absent.
    pub origin: Option<String>,
    pub enums: Option<Vec<String>>,
    pub is_deletable: bool,
    pub is_visible: bool,
}

impl CustomFieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType, element_type: ElementType) -> Self {
        Self {
            id: None,
            name: name.into(),
            field_type,
            element_type,
            origin: None,
            enums: None,
            is_deletable: false,
            is_visible: true,
        }
    }
}

pub struct AmocrmClient {
    http: reqwest::Client,
    config: Config,
    base_url: Url,
    login_url: Url,
    authenticated: AtomicBool,
    account: RwLock<Option<Arc<AccountInfo>>>,
    schemas: RwLock<HashMap<TypeId, Arc<BoundSchema>>>,
}

impl AmocrmClient {
    pub fn new(config: Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to create HTTP client: {}", e)))?;

        let root = config.root_url();
        let base_url = Url::parse(&format!("{}/api/v2/", root))
            .map_err(|e| ApiError::Client(format!("invalid base URL '{}': {}", root, e)))?;
        let login_url = Url::parse(&format!("{}/private/api/auth.php?type=json", root))
            .map_err(|e| ApiError::Client(format!("invalid login URL '{}': {}", root, e)))?;

        Ok(Self {
            http,
            config,
            base_url,
            login_url,
            authenticated: AtomicBool::new(false),
            account: RwLock::new(None),
            schemas: RwLock::new(HashMap::new()),
        })
    }

    /// Login and subdomain, used to contextualize auth failures.
    pub fn auth_ident(&self) -> String {
        format!("{}:{}", self.config.login, self.config.subdomain)
    }

    /// Whether a session was established. The session expires server-side
    /// only, so this cannot be trusted beyond the next request.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Relaxed)
    }

    /// Logs in with the account API hash and stores the session cookie.
    pub async fn authenticate(&self) -> Result<(), ApiError> {
        let payload = json!({
            "USER_LOGIN": self.config.login,
            "USER_HASH": self.config.hash,
        });
        let response = self
            .http
            .post(self.login_url.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let has_session = response.cookies().any(|cookie| cookie.name() == "session_id");
        let body = read_body(response).await?;

        if !status.is_success() || !has_session {
            return Err(ApiError::Auth {
                ident: self.auth_ident(),
                message: response_error(&body)
                    .unwrap_or_else(|| format!("login rejected with status {}", status)),
            });
        }

        self.authenticated.store(true, Ordering::Relaxed);
        tracing::info!("authenticated as {}", self.auth_ident());
        Ok(())
    }

    async fn ensure_auth(&self) -> Result<(), ApiError> {
        if !self.is_authenticated() {
            self.authenticate().await?;
        }
        Ok(())
    }

    fn api_url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Client(format!("invalid path '{}': {}", path, e)))
    }

    /// Sends a request, re-authenticating once when the session expired.
    ///
    /// The vendor reuses one 401 code for both a wrong hash and an expired
    /// session, so a single re-login retry is the only disambiguation.
    /// Other 401s surface as `Auth`; every other failure status propagates
    /// unchanged as `Http`.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(u16, Value), ApiError> {
        let retry = builder.try_clone();
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = read_body(response).await?;

        if status == 401 {
            if response_error_code(&body) == Some(AUTH_CODE_SESSION) {
                if let Some(retry) = retry {
                    tracing::warn!("session expired for {}, re-authenticating", self.auth_ident());
                    self.authenticated.store(false, Ordering::Relaxed);
                    self.authenticate().await?;
                    let response = retry.send().await?;
                    let status = response.status().as_u16();
                    let body = read_body(response).await?;
                    if status == 401 {
                        return Err(ApiError::Auth {
                            ident: self.auth_ident(),
                            message: response_error(&body).unwrap_or_default(),
                        });
                    }
                    return check_status(status, body);
                }
            }
            return Err(ApiError::Auth {
                ident: self.auth_ident(),
                message: response_error(&body).unwrap_or_default(),
            });
        }
        check_status(status, body)
    }

    // ---------------- account info & schema registry ----------------

    async fn fetch_account_info(&self) -> Result<AccountInfo, ApiError> {
        self.ensure_auth().await?;
        let mut url = self.api_url("account")?;
        url.query_pairs_mut().append_pair(
            "with",
            "custom_fields,users,pipelines,groups,note_types,task_types",
        );
        let (_, body) = self.send(self.http.get(url)).await?;
        serde_json::from_value(body)
            .map_err(|e| ApiError::Format(format!("malformed account info: {}", e)))
    }

    /// Cached account snapshot, fetched on first use.
    pub async fn account_info(&self) -> Result<Arc<AccountInfo>, ApiError> {
        if let Some(info) = self.read_account().clone() {
            return Ok(info);
        }
        let info = Arc::new(self.fetch_account_info().await?);
        *self.write_account() = Some(info.clone());
        Ok(info)
    }

    /// Re-fetches account info and invalidates every bound schema, so the
    /// next use of each kind re-binds against the fresh metadata.
    pub async fn refresh_account_info(&self) -> Result<Arc<AccountInfo>, ApiError> {
        let info = Arc::new(self.fetch_account_info().await?);
        *self.write_account() = Some(info.clone());
        self.write_schemas().clear();
        tracing::info!("account info refreshed, custom field bindings invalidated");
        Ok(info)
    }

    /// Bound schema for one entity type, binding lazily on first use.
    ///
    /// Keyed by the Rust type, not the kind string, because two types (for
    /// instance a plain and an extended contact) can bind the same kind
    /// with different declared fields.
    pub async fn schema<M: Model>(&self) -> Result<Arc<BoundSchema>, ApiError> {
        if let Some(schema) = self.read_schemas().get(&TypeId::of::<M>()) {
            return Ok(schema.clone());
        }
        let info = self.account_info().await?;
        let empty = Default::default();
        let metadata = info.custom_fields(M::PLURAL).unwrap_or(&empty);
        let schema = Arc::new(BoundSchema::bind::<M>(metadata)?);
        self.write_schemas().insert(TypeId::of::<M>(), schema.clone());
        Ok(schema)
    }

    // ---------------- list fetches ----------------

    /// Fetches one page of entities with the given filters.
    pub async fn get_objects<M: Model>(&self, query: &GetQuery) -> Result<Vec<M>, ApiError> {
        self.ensure_auth().await?;
        let schema = self.schema::<M>().await?;

        let mut url = self.api_url(M::PLURAL)?;
        {
            let mut pairs = url.query_pairs_mut();
            if !query.ids.is_empty() {
                pairs.append_pair("id", &join_ids(&query.ids));
            }
            if let Some(offset) = query.cursor {
                pairs.append_pair("limit_offset", &offset.to_string());
            }
            if query.cursor_count > 0 {
                pairs.append_pair("limit_rows", &query.cursor_count.to_string());
            }
            if let Some(ref text) = query.query {
                pairs.append_pair("query", text);
            }
            if let Some(user_id) = query.responsible_user_id {
                pairs.append_pair("responsible_user_id", &user_id.to_string());
            }
            for (key, value) in &query.extra {
                pairs.append_pair(key, value);
            }
        }

        let mut request = self.http.get(url);
        if let Some(since) = query.modified_since {
            // Documentation insists on UTC here.
            request = request.header("If-Modified-Since", since.to_rfc2822());
        }

        let (status, body) = self.send(request).await?;
        // 204 on "not found"; no _embedded key when no object of the kind
        // exists at all, even unfiltered.
        if status == 204 {
            return Ok(Vec::new());
        }
        let Some(items) = body.pointer("/_embedded/items").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        items
            .iter()
            .map(|raw| load_entity(raw.clone(), &schema))
            .collect()
    }

    /// Lazy offset-paged iteration over a list endpoint.
    pub fn iterate<M: Model>(&self, query: GetQuery) -> CursorFetch<'_, M> {
        CursorFetch::new(self, query)
    }

    pub async fn get_contacts(&self, query: &GetQuery) -> Result<Vec<Contact>, ApiError> {
        self.get_objects(query).await
    }

    pub async fn get_leads(&self, query: &GetQuery) -> Result<Vec<Lead>, ApiError> {
        self.get_objects(query).await
    }

    pub async fn get_companies(&self, query: &GetQuery) -> Result<Vec<Company>, ApiError> {
        self.get_objects(query).await
    }

    pub async fn get_customers(&self, query: &GetQuery) -> Result<Vec<Customer>, ApiError> {
        self.get_objects(query).await
    }

    pub async fn get_transactions(&self, query: &GetQuery) -> Result<Vec<Transaction>, ApiError> {
        self.get_objects(query).await
    }

    pub async fn get_tasks(&self, query: &GetQuery) -> Result<Vec<Task>, ApiError> {
        self.get_objects(query).await
    }

    pub async fn get_notes(&self, query: &GetQuery) -> Result<Vec<Note>, ApiError> {
        self.get_objects(query).await
    }

    pub async fn get_pipelines(&self) -> Result<Vec<Pipeline>, ApiError> {
        // Pipelines ignore paging.
        self.get_objects(&GetQuery::default().page_size(0)).await
    }

    // ---------------- batched mutations ----------------

    /// Submits one kind's add/update/delete batch and reconciles the
    /// response back onto the borrowed objects.
    ///
    /// On success every added object carries its new id, every updated
    /// object the server's `updated_at`, and every object's `meta` has its
    /// per-action error set or cleared. A response whose item and error
    /// counts do not cover the batch is rejected before anything is
    /// applied.
    pub async fn post_batch<M: Model>(
        &self,
        mut batch: MutationBatch<'_, M>,
        options: &PostOptions,
    ) -> Result<BatchResult, ApiError> {
        if batch.is_empty() {
            return Ok(BatchResult::default());
        }
        self.ensure_auth().await?;
        let schema = self.schema::<M>().await?;

        if let Some(touch) = touch_time(options.touch) {
            for (_, object) in &mut batch.update {
                match object.updated_at() {
                    Some(current) if current > touch => {
                        // An older updated_at than the stored one makes the
                        // backend reject the update.
                        tracing::warn!(
                            "skipping updated_at set: {} already has newer {} > {}",
                            M::NAME,
                            current,
                            touch
                        );
                    }
                    _ => object.set_updated_at(touch),
                }
            }
        }

        let add_payload: Vec<Value> = batch
            .add
            .iter()
            .map(|object| dump_entity(&**object, &schema))
            .collect::<Result<_, _>>()?;
        let update_payload: Vec<Value> = batch
            .update
            .iter()
            .map(|(_, object)| dump_entity(&**object, &schema))
            .collect::<Result<_, _>>()?;
        let delete_ids: Vec<i64> = batch.delete.iter().map(|(id, _)| *id).collect();

        let payload = json!({
            "add": add_payload,
            "update": update_payload,
            "delete": delete_ids,
        });

        let url = self.api_url(M::PLURAL)?;
        let (_, body) = self.send(self.http.post(url).json(&payload)).await?;

        let errors = normalize_errors(body.pointer("/_embedded/errors"), batch.add.len());
        let items: Vec<Value> = body
            .pointer("/_embedded/items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // The response must account for every submitted object before any
        // of it is applied.
        if items.len() + errors.total() != batch.len() {
            return Err(ApiError::Client("response items count not matched".to_string()));
        }

        reconcile(&mut batch, &items, &errors)?;
        apply_errors(&mut batch, &errors);

        let result = BatchResult {
            posted: items.len(),
            errors,
        };
        if options.raise_on_errors && !result.errors.is_empty() {
            return Err(ApiError::Post(PostError {
                model: M::NAME,
                message: format!(
                    "{} of {} objects failed",
                    result.errors.total(),
                    batch.len()
                ),
                errors: result.errors,
            }));
        }
        Ok(result)
    }

    /// Adds or updates a single object, failing loudly on any error.
    pub async fn save<M: Model>(&self, object: &mut M) -> Result<(), ApiError> {
        let mut batch = MutationBatch::new();
        batch.save(object)?;
        self.post_batch(batch, &PostOptions::raising()).await?;
        Ok(())
    }

    /// Deletes a single object, failing loudly on any error.
    pub async fn delete<M: Model>(&self, object: &mut M) -> Result<(), ApiError> {
        let mut batch = MutationBatch::new();
        batch.delete(object)?;
        self.post_batch(batch, &PostOptions::raising()).await?;
        Ok(())
    }

    // ---------------- field administration ----------------

    /// Creates and deletes account custom fields.
    ///
    /// The endpoint fails the whole call even when only one field is bad,
    /// and a failed add means the deletes were not processed either. New
    /// field ids are written back onto the added definitions; remember to
    /// refresh account info afterwards so bindings pick them up.
    pub async fn post_custom_fields(
        &self,
        add: &mut [CustomFieldDefinition],
        delete: &[CustomFieldDefinition],
    ) -> Result<(), ApiError> {
        self.ensure_auth().await?;

        let mut add_payload = Vec::with_capacity(add.len());
        for field in add.iter() {
            add_payload.push(json!({
                "name": field.name,
                "field_type": field.field_type.code(),
                "element_type": field.element_type.code(),
                "origin": field.origin.clone().unwrap_or_else(|| self.config.subdomain.clone()),
                "enums": field.enums,
                "is_deletable": field.is_deletable,
                "is_visible": field.is_visible,
            }));
        }
        let mut delete_payload = Vec::with_capacity(delete.len());
        for field in delete {
            let id = field.id.ok_or_else(|| {
                ApiError::Client(format!("cannot delete field '{}' without id", field.name))
            })?;
            delete_payload.push(json!({
                "id": id,
                "origin": field.origin.clone().unwrap_or_else(|| self.config.subdomain.clone()),
            }));
        }

        let url = self.api_url("fields")?;
        let payload = json!({ "add": add_payload, "delete": delete_payload });
        let body = match self.send(self.http.post(url).json(&payload)).await {
            Ok((_, body)) => body,
            Err(ApiError::Http { body, .. }) => {
                let detail = serde_json::from_str::<Value>(&body)
                    .ok()
                    .and_then(|v| v.get("detail").map(crate::wire::value_to_string))
                    .unwrap_or_else(|| "UNKNOWN ERROR".to_string());
                return Err(ApiError::Post(PostError {
                    model: "custom_field",
                    message: detail,
                    errors: Default::default(),
                }));
            }
            Err(other) => return Err(other),
        };

        let items: Vec<Value> = body
            .pointer("/_embedded/items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if items.len() != add.len() {
            return Err(ApiError::Client("response fields count not matched".to_string()));
        }
        for (field, item) in add.iter_mut().zip(&items) {
            field.id = item.get("id").and_then(as_i64);
        }
        Ok(())
    }

    // ---------------- lock plumbing ----------------

    fn read_account(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<AccountInfo>>> {
        self.account.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_account(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<AccountInfo>>> {
        self.account.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_schemas(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TypeId, Arc<BoundSchema>>> {
        self.schemas.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_schemas(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TypeId, Arc<BoundSchema>>> {
        self.schemas.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn touch_time(touch: Touch) -> Option<DateTime<Utc>> {
    match touch {
        Touch::Now => Some(trunc_seconds(Utc::now())),
        Touch::At(at) => Some(trunc_seconds(at)),
        Touch::Skip => None,
    }
}

async fn read_body(response: reqwest::Response) -> Result<Value, ApiError> {
    let text = response.text().await?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

fn check_status(status: u16, body: Value) -> Result<(u16, Value), ApiError> {
    // 304 is how conditional fetches say "nothing changed".
    if (200..300).contains(&status) || status == 304 {
        return Ok((status, body));
    }
    Err(ApiError::Http {
        status,
        body: crate::wire::value_to_string(&body),
    })
}

fn response_error(body: &Value) -> Option<String> {
    body.pointer("/response/error")
        .map(crate::wire::value_to_string)
}

fn response_error_code(body: &Value) -> Option<i64> {
    body.pointer("/response/error_code").and_then(as_i64)
}

//! Batched add/update/delete submission and response reconciliation.
//!
//! The vendor returns one `_embedded.items` list plus an error structure
//! whose shape varies per endpoint: errors may be keyed by request index,
//! arrive as a plain list, or be missing entirely. Everything is normalized
//! into [`BatchErrors`] at the boundary before any object is touched, the
//! response is gated on an item/error count check, and only then are new
//! ids, server timestamps, and per-object error state applied back onto the
//! originating objects.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::{ApiError, BatchErrors};
use crate::field_types::as_i64;
use crate::models::{Model, ADD_ERROR, DELETE_ERROR, UPDATE_ERROR};
use crate::wire::value_to_string;

/// One entity kind's worth of pending mutations, borrowing the objects so
/// reconciliation can write ids and error state back in place.
#[derive(Debug, Default)]
pub struct MutationBatch<'a, M: Model> {
    pub(crate) add: Vec<&'a mut M>,
    pub(crate) update: Vec<(i64, &'a mut M)>,
    pub(crate) delete: Vec<(i64, &'a mut M)>,
}

impl<'a, M: Model> MutationBatch<'a, M> {
    pub fn new() -> Self {
        Self {
            add: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
        }
    }

    /// Queues an object for add (no id yet) or update (id present).
    pub fn save(&mut self, object: &'a mut M) -> Result<(), ApiError> {
        match object.id() {
            Some(id) => {
                if self.update.iter().any(|(other, _)| *other == id) {
                    return Err(ApiError::Client(format!("duplicated id: {}", id)));
                }
                self.update.push((id, object));
            }
            None => self.add.push(object),
        }
        Ok(())
    }

    /// Queues a persisted object for deletion.
    pub fn delete(&mut self, object: &'a mut M) -> Result<(), ApiError> {
        let id = object
            .id()
            .ok_or_else(|| ApiError::Client("cannot delete an object without id".to_string()))?;
        if self.delete.iter().any(|(other, _)| *other == id) {
            return Err(ApiError::Client(format!("duplicated id: {}", id)));
        }
        self.delete.push((id, object));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + self.delete.len()
    }
}

/// How to advance `updated_at` on updates before submission.
#[derive(Debug, Clone, Copy, Default)]
pub enum Touch {
    /// Stamp now (whole seconds) unless the object already carries a newer
    /// value.
    #[default]
    Now,
    /// Stamp a caller-chosen time under the same newer-wins rule.
    At(DateTime<Utc>),
    /// Leave `updated_at` alone.
    Skip,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostOptions {
    pub touch: Touch,
    /// Raise [`ApiError::Post`] when any object failed, after partial
    /// results were applied.
    pub raise_on_errors: bool,
}

impl PostOptions {
    pub fn raising() -> Self {
        Self {
            raise_on_errors: true,
            ..Self::default()
        }
    }
}

/// Outcome of one batch call: how many items the server returned and the
/// normalized error breakdown.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub posted: usize,
    pub errors: BatchErrors,
}

/// Truncates to whole seconds; the wire carries unix seconds, so anything
/// finer only produces spurious mismatch warnings.
pub(crate) fn trunc_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

/// Normalizes the response error structure into one index/id keyed map per
/// action.
///
/// Accepted shapes: a proper object keyed `add`/`update`/`delete`, the same
/// object with `"0"` standing in for `add`, a PHP list wrapping the add
/// errors, or nothing at all. Add errors themselves may be an index-keyed
/// object or a plain list; a list whose length does not match the add batch
/// cannot be attributed, so every add is marked failed with the raw
/// messages as context.
pub(crate) fn normalize_errors(raw: Option<&Value>, add_len: usize) -> BatchErrors {
    let mut add_raw = None;
    let mut update_raw = None;
    let mut delete_raw = None;

    match raw {
        None | Some(Value::Null) => {}
        Some(Value::Array(list)) => {
            add_raw = list.first().cloned();
        }
        Some(Value::Object(map)) => {
            let mut map = map.clone();
            add_raw = map.remove("0").or_else(|| map.remove("add"));
            update_raw = map.remove("update");
            delete_raw = map.remove("delete");
        }
        Some(_) => {}
    }

    let mut errors = BatchErrors::default();

    match add_raw {
        Some(Value::Object(map)) => {
            for (key, message) in &map {
                if let Ok(index) = key.parse::<usize>() {
                    errors.add.insert(index, value_to_string(message));
                }
            }
        }
        Some(Value::Array(list)) if !list.is_empty() => {
            if list.len() == add_len {
                for (index, message) in list.iter().enumerate() {
                    errors.add.insert(index, value_to_string(message));
                }
            } else {
                // The endpoint reported add errors without attribution and
                // the counts disagree, so no object can be singled out.
                // Write every add off with the raw messages as context.
                let mut messages: Vec<String> = list.iter().map(value_to_string).collect();
                messages.sort();
                messages.dedup();
                let message = format!("Maybe not added (possible errors {:?})", messages);
                for index in 0..add_len {
                    errors.add.insert(index, message.clone());
                }
            }
        }
        _ => {}
    }

    for (raw, target) in [
        (update_raw, &mut errors.update),
        (delete_raw, &mut errors.delete),
    ] {
        if let Some(Value::Object(map)) = raw {
            for (key, message) in &map {
                if let Ok(id) = key.parse::<i64>() {
                    target.insert(id, value_to_string(message));
                }
            }
        }
    }

    errors
}

/// Attributes returned items back to the submitted objects.
///
/// Items without `updated_at` are adds: they are matched, in submission
/// order, to the next add that did not error, and carry the new id. Items
/// with `updated_at` are updates, matched by id; the server's timestamp is
/// authoritative, a disagreement with the local value only logs a warning.
pub(crate) fn reconcile<M: Model>(
    batch: &mut MutationBatch<'_, M>,
    items: &[Value],
    errors: &BatchErrors,
) -> Result<(), ApiError> {
    let mut pending_adds: VecDeque<usize> = (0..batch.add.len())
        .filter(|index| !errors.add.contains_key(index))
        .collect();

    for item in items {
        let updated_at = item.get("updated_at").filter(|v| !v.is_null());
        if updated_at.is_none() {
            let Some(index) = pending_adds.pop_front() else {
                // Every add was already written off (unattributable error
                // list); the echoed item cannot be assigned to anything.
                tracing::warn!("{}: unattributable response item: {}", M::NAME, item);
                continue;
            };
            let id = item.get("id").and_then(as_i64).ok_or_else(|| {
                ApiError::Client(format!("{}: response item without id: {}", M::NAME, item))
            })?;
            batch.add[index].set_id(id);
        } else {
            let id = item.get("id").and_then(as_i64).ok_or_else(|| {
                ApiError::Client(format!("{}: response item without id: {}", M::NAME, item))
            })?;
            let Some((_, object)) = batch.update.iter_mut().find(|(other, _)| *other == id)
            else {
                return Err(ApiError::Client(format!(
                    "{}: response item {} matches no submitted update",
                    M::NAME,
                    id
                )));
            };
            let seconds = updated_at.and_then(as_i64).ok_or_else(|| {
                ApiError::Format(format!("{}: bad updated_at in response item {}", M::NAME, id))
            })?;
            let Some(server) = DateTime::from_timestamp(seconds, 0) else {
                return Err(ApiError::Format(format!(
                    "{}: updated_at out of range in response item {}",
                    M::NAME,
                    id
                )));
            };
            if let Some(local) = object.updated_at() {
                if local.timestamp() != server.timestamp() {
                    tracing::warn!(
                        "updated_at mismatch: {} != {}",
                        server,
                        trunc_seconds(local)
                    );
                }
            }
            object.set_updated_at(server);
        }
    }
    Ok(())
}

/// Sets or clears each object's per-action error in `meta`.
///
/// Runs over every submitted object, not just the failed ones, so a retry
/// that succeeds drops the stale message from the previous attempt.
pub(crate) fn apply_errors<M: Model>(batch: &mut MutationBatch<'_, M>, errors: &BatchErrors) {
    for (index, object) in batch.add.iter_mut().enumerate() {
        stamp(&mut **object, "add", ADD_ERROR, errors.add.get(&index));
    }
    for (id, object) in &mut batch.update {
        stamp(&mut **object, "update", UPDATE_ERROR, errors.update.get(id));
    }
    for (id, object) in &mut batch.delete {
        stamp(&mut **object, "delete", DELETE_ERROR, errors.delete.get(id));
    }
}

fn stamp<M: Model>(object: &mut M, action: &str, key: &str, error: Option<&String>) {
    match error {
        Some(message) => {
            tracing::error!("{} failed: \"{}\" for {:?}", action, message, object.id());
            object.meta_mut().insert(key.to_string(), message.clone());
        }
        None => {
            object.meta_mut().remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_errors_normalize_to_empty() {
        let errors = normalize_errors(None, 3);
        assert!(errors.is_empty());
        let errors = normalize_errors(Some(&json!(null)), 3);
        assert!(errors.is_empty());
    }

    #[test]
    fn indexed_object_form() {
        let raw = json!({"add": {"1": "bad phone"}, "update": {"5": "gone"}});
        let errors = normalize_errors(Some(&raw), 2);
        assert_eq!(errors.add[&1], "bad phone");
        assert_eq!(errors.update[&5], "gone");
        assert!(errors.delete.is_empty());
    }

    #[test]
    fn zero_key_stands_in_for_add() {
        let raw = json!({"0": {"0": "nope"}});
        let errors = normalize_errors(Some(&raw), 1);
        assert_eq!(errors.add[&0], "nope");
    }

    #[test]
    fn php_list_wrapper() {
        let raw = json!([{"0": "nope"}]);
        let errors = normalize_errors(Some(&raw), 1);
        assert_eq!(errors.add[&0], "nope");
    }

    #[test]
    fn matching_length_list_maps_by_position() {
        let raw = json!({"add": ["first bad", "second bad"]});
        let errors = normalize_errors(Some(&raw), 2);
        assert_eq!(errors.add[&0], "first bad");
        assert_eq!(errors.add[&1], "second bad");
    }

    #[test]
    fn mismatched_length_list_fails_every_add() {
        let raw = json!({"add": ["some error"]});
        let errors = normalize_errors(Some(&raw), 3);
        assert_eq!(errors.add.len(), 3);
        for index in 0..3 {
            assert!(errors.add[&index].contains("Maybe not added"));
            assert!(errors.add[&index].contains("some error"));
        }
    }

    #[test]
    fn trunc_drops_subsecond_precision() {
        let at = DateTime::from_timestamp(1_500_000_000, 500_000_000).unwrap();
        assert_eq!(trunc_seconds(at).timestamp_subsec_nanos(), 0);
        assert_eq!(trunc_seconds(at).timestamp(), 1_500_000_000);
    }
}

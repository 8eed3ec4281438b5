use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use moon_types::Normalized;

use crate::error::{CacheError, CacheResult};
use crate::key::QueryKey;
use crate::normalize::{
    find_entity, map_entities, merge_patch, remove_entities, restore_item, RemovedItem,
};
use crate::queries::Query;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    Updated,
    Removed,
}

/// Published after every committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEvent {
    pub key: QueryKey,
    pub revision: u64,
    pub kind: CacheEventKind,
}

/// One element taken out of a cached array by [`QueryCache::remove_normalized`].
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    pub key: QueryKey,
    pub array_pointer: String,
    pub index: usize,
    pub value: Value,
}

struct CacheEntry {
    value: Arc<Value>,
    revision: u64,
}

#[derive(Default)]
struct CacheState {
    entries: BTreeMap<QueryKey, CacheEntry>,
    revision: u64,
}

impl CacheState {
    fn store(&mut self, key: QueryKey, value: Value) -> CacheEvent {
        self.revision += 1;
        let revision = self.revision;
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value: Arc::new(value),
                revision,
            },
        );
        CacheEvent {
            key,
            revision,
            kind: CacheEventKind::Updated,
        }
    }

    fn drop_entry(&mut self, key: &QueryKey) -> Option<CacheEvent> {
        self.entries.remove(key)?;
        self.revision += 1;
        Some(CacheEvent {
            key: key.clone(),
            revision: self.revision,
            kind: CacheEventKind::Removed,
        })
    }

    /// Rewrites every entry holding the entity. Entries without a match are
    /// left untouched, so their `Arc` stays shared with earlier readers.
    fn rewrite_entity(
        &mut self,
        type_name: &str,
        id: &str,
        f: &mut dyn FnMut(&mut Value),
    ) -> (usize, Vec<CacheEvent>) {
        let touched: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| find_entity(&entry.value, type_name, id).is_some())
            .map(|(key, _)| key.clone())
            .collect();

        let mut occurrences = 0;
        let mut events = Vec::with_capacity(touched.len());
        for key in touched {
            let Some(entry) = self.entries.get(&key) else {
                continue;
            };
            let mut value = Value::clone(&entry.value);
            occurrences += map_entities(&mut value, type_name, id, f);
            events.push(self.store(key, value));
        }
        (occurrences, events)
    }
}

/// Process-wide store of server responses keyed by [`QueryKey`].
///
/// Values are held as JSON so an entity can be found and patched wherever it
/// appears, independent of the response shape that carried it. Typed access
/// goes through [`Query`] descriptors.
///
/// Closures passed to the update methods run under the write lock and must
/// not call back into the same cache.
#[derive(Clone)]
pub struct QueryCache {
    state: Arc<RwLock<CacheState>>,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Global revision; bumps on every committed write.
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    pub fn entry_revision(&self, key: &QueryKey) -> Option<u64> {
        self.state.read().entries.get(key).map(|entry| entry.revision)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.state.read().entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.state.read().entries.keys().cloned().collect()
    }

    pub fn get_raw(&self, key: &QueryKey) -> Option<Arc<Value>> {
        self.state.read().entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn get<Q: Query>(&self, query: &Q) -> CacheResult<Option<Q::Data>> {
        let key = query.key();
        let Some(value) = self.get_raw(&key) else {
            return Ok(None);
        };
        Q::Data::deserialize(value.as_ref())
            .map(Some)
            .map_err(|source| CacheError::Decode { key, source })
    }

    pub fn set<Q: Query>(&self, query: &Q, data: &Q::Data) -> CacheResult<()> {
        let value = serde_json::to_value(data).map_err(CacheError::Encode)?;
        let event = self.state.write().store(query.key(), value);
        self.publish(vec![event]);
        Ok(())
    }

    /// Read-modify-write of one query. The updater receives `None` when the
    /// query is not cached and returns `None` to leave the cache unchanged.
    /// Returns whether a value was written.
    pub fn update<Q, F>(&self, query: &Q, f: F) -> CacheResult<bool>
    where
        Q: Query,
        F: FnOnce(Option<Q::Data>) -> Option<Q::Data>,
    {
        let key = query.key();
        let event = {
            let mut state = self.state.write();
            let current = match state.entries.get(&key) {
                Some(entry) => Some(
                    Q::Data::deserialize(entry.value.as_ref()).map_err(|source| {
                        CacheError::Decode {
                            key: key.clone(),
                            source,
                        }
                    })?,
                ),
                None => None,
            };
            let Some(next) = f(current) else {
                return Ok(false);
            };
            let value = serde_json::to_value(&next).map_err(CacheError::Encode)?;
            state.store(key, value)
        };
        self.publish(vec![event]);
        Ok(true)
    }

    /// Applies `f` to every cached query under `prefix` whose value decodes
    /// as `D`. Entries of another shape are skipped. Returns how many entries
    /// were written.
    pub fn update_matching<D, F>(&self, prefix: &QueryKey, mut f: F) -> CacheResult<usize>
    where
        D: Serialize + DeserializeOwned,
        F: FnMut(&QueryKey, D) -> Option<D>,
    {
        let events = {
            let mut state = self.state.write();
            let candidates: Vec<(QueryKey, Arc<Value>)> = state
                .entries
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(prefix))
                .map(|(key, entry)| (key.clone(), entry.value.clone()))
                .collect();

            let mut events = Vec::new();
            for (key, value) in candidates {
                let current = match D::deserialize(value.as_ref()) {
                    Ok(current) => current,
                    Err(err) => {
                        debug!(key = %key, error = %err, "skipping cache entry of another shape");
                        continue;
                    }
                };
                if let Some(next) = f(&key, current) {
                    let value = serde_json::to_value(&next).map_err(CacheError::Encode)?;
                    events.push(state.store(key, value));
                }
            }
            events
        };
        let written = events.len();
        self.publish(events);
        Ok(written)
    }

    pub fn remove(&self, key: &QueryKey) -> bool {
        let event = self.state.write().drop_entry(key);
        let removed = event.is_some();
        self.publish(event.into_iter().collect());
        removed
    }

    pub fn remove_matching(&self, prefix: &QueryKey) -> usize {
        let events: Vec<CacheEvent> = {
            let mut state = self.state.write();
            let keys: Vec<QueryKey> = state
                .entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.iter().filter_map(|key| state.drop_entry(key)).collect()
        };
        let removed = events.len();
        self.publish(events);
        removed
    }

    /// First occurrence of the entity, in key order.
    pub fn get_normalized<E>(&self, id: &str) -> CacheResult<Option<E>>
    where
        E: Normalized + DeserializeOwned,
    {
        let state = self.state.read();
        for (key, entry) in &state.entries {
            if let Some(found) = find_entity(&entry.value, E::TYPE_NAME, id) {
                return E::deserialize(found)
                    .map(Some)
                    .map_err(|source| CacheError::Decode {
                        key: key.clone(),
                        source,
                    });
            }
        }
        Ok(None)
    }

    /// Updates an entity everywhere it is cached.
    ///
    /// `f` runs once against the first occurrence; the fields it changed are
    /// then merged into every occurrence, so list items that carry fewer
    /// fields than the full record keep their shape. Returns the number of
    /// occurrences patched.
    pub fn set_normalized<E, F>(&self, id: &str, f: F) -> CacheResult<usize>
    where
        E: Normalized + Serialize + DeserializeOwned,
        F: FnOnce(E) -> E,
    {
        let (occurrences, events) = {
            let mut state = self.state.write();
            let mut first = None;
            for (key, entry) in &state.entries {
                if let Some(found) = find_entity(&entry.value, E::TYPE_NAME, id) {
                    first = Some((key.clone(), found.clone()));
                    break;
                }
            }
            let Some((key, before)) = first else {
                return Ok(0);
            };
            let current =
                E::deserialize(&before).map_err(|source| CacheError::Decode { key, source })?;
            let after = serde_json::to_value(f(current)).map_err(CacheError::Encode)?;
            let Some(patch) = diff_patch(&before, &after) else {
                return Ok(0);
            };
            state.rewrite_entity(E::TYPE_NAME, id, &mut |value: &mut Value| merge_patch(value, &patch))
        };
        self.publish(events);
        Ok(occurrences)
    }

    /// Merges a raw JSON patch into every occurrence of `type_name`/`id`.
    pub fn patch_normalized(&self, type_name: &str, id: &str, patch: &Value) -> usize {
        let (occurrences, events) = self
            .state
            .write()
            .rewrite_entity(type_name, id, &mut |value: &mut Value| {
                merge_patch(value, patch)
            });
        self.publish(events);
        occurrences
    }

    /// Swaps every occurrence of the entity for `replacement`. The
    /// replacement may carry a different id.
    pub fn replace_normalized<E>(&self, id: &str, replacement: &E) -> CacheResult<usize>
    where
        E: Normalized + Serialize,
    {
        let next = serde_json::to_value(replacement).map_err(CacheError::Encode)?;
        let (occurrences, events) = self
            .state
            .write()
            .rewrite_entity(E::TYPE_NAME, id, &mut |value: &mut Value| {
                *value = next.clone()
            });
        self.publish(events);
        Ok(occurrences)
    }

    /// Takes the entity out of every cached array it appears in. The returned
    /// records put it back with [`QueryCache::restore_removals`].
    pub fn remove_normalized<E: Normalized>(&self, id: &str) -> Vec<Removal> {
        let (removals, events) = {
            let mut state = self.state.write();
            let keys: Vec<QueryKey> = state
                .entries
                .iter()
                .filter(|(_, entry)| find_entity(&entry.value, E::TYPE_NAME, id).is_some())
                .map(|(key, _)| key.clone())
                .collect();

            let mut removals = Vec::new();
            let mut events = Vec::new();
            for key in keys {
                let Some(entry) = state.entries.get(&key) else {
                    continue;
                };
                let mut value = Value::clone(&entry.value);
                let mut removed: Vec<RemovedItem> = Vec::new();
                remove_entities(&mut value, E::TYPE_NAME, id, "", &mut removed);
                if removed.is_empty() {
                    continue;
                }
                removals.extend(removed.into_iter().map(|item| Removal {
                    key: key.clone(),
                    array_pointer: item.array_pointer,
                    index: item.index,
                    value: item.value,
                }));
                events.push(state.store(key, value));
            }
            (removals, events)
        };
        self.publish(events);
        removals
    }

    /// Re-inserts removed elements at their recorded positions, clamped to
    /// the current array length. Elements already present again are skipped.
    pub fn restore_removals(&self, removals: &[Removal]) -> usize {
        let (restored, events) = {
            let mut state = self.state.write();
            let mut staged: BTreeMap<QueryKey, Value> = BTreeMap::new();
            let mut restored = 0;
            for removal in removals.iter().rev() {
                if !staged.contains_key(&removal.key) {
                    let Some(entry) = state.entries.get(&removal.key) else {
                        continue;
                    };
                    staged.insert(removal.key.clone(), Value::clone(&entry.value));
                }
                let Some(value) = staged.get_mut(&removal.key) else {
                    continue;
                };
                let item = RemovedItem {
                    array_pointer: removal.array_pointer.clone(),
                    index: removal.index,
                    value: removal.value.clone(),
                };
                if restore_item(value, &item) {
                    restored += 1;
                }
            }
            let events: Vec<CacheEvent> = staged
                .into_iter()
                .map(|(key, value)| state.store(key, value))
                .collect();
            (restored, events)
        };
        self.publish(events);
        restored
    }

    fn publish(&self, events: Vec<CacheEvent>) {
        for event in events {
            let _ = self.events.send(event);
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("QueryCache")
            .field("entries", &state.entries.len())
            .field("revision", &state.revision)
            .finish()
    }
}

/// Fields of `after` that differ from `before`. Keys missing from `before`
/// are only carried when `after` gives them a non-empty value, so fields a
/// list item never had are not overwritten elsewhere with defaults.
fn diff_patch(before: &Value, after: &Value) -> Option<Value> {
    let (Value::Object(before), Value::Object(after)) = (before, after) else {
        return (before != after).then(|| after.clone());
    };
    let mut patch = serde_json::Map::new();
    for (key, next) in after {
        match before.get(key) {
            Some(prev) if prev == next => {}
            Some(prev) if prev.is_object() && next.is_object() => {
                if let Some(nested) = diff_patch(prev, next) {
                    patch.insert(key.clone(), nested);
                }
            }
            Some(_) => {
                patch.insert(key.clone(), next.clone());
            }
            None if is_blank(next) => {}
            None => {
                patch.insert(key.clone(), next.clone());
            }
        }
    }
    (!patch.is_empty()).then_some(Value::Object(patch))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_patch_skips_unchanged_and_blank_new_fields() {
        let before = json!({ "id": "c1", "body_html": "a", "author": { "name": "x", "id": "u" } });
        let after = json!({
            "id": "c1",
            "body_html": "b",
            "author": { "name": "y", "id": "u" },
            "replies": [],
            "resolved_at": null
        });
        let patch = diff_patch(&before, &after).unwrap();
        assert_eq!(patch, json!({ "body_html": "b", "author": { "name": "y" } }));
    }

    #[test]
    fn diff_patch_keeps_explicit_nulls_on_known_fields() {
        let before = json!({ "resolved_at": "2024-01-01T00:00:00Z" });
        let after = json!({ "resolved_at": null });
        assert_eq!(diff_patch(&before, &after), Some(json!({ "resolved_at": null })));
        assert_eq!(diff_patch(&after, &after), None);
    }
}

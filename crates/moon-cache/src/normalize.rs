//! Walkers over cached JSON that locate entities by `(type_name, id)`.

use serde_json::Value;

pub(crate) fn is_entity(value: &Value, type_name: &str, id: &str) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    map.get("type_name").and_then(Value::as_str) == Some(type_name)
        && map.get("id").and_then(Value::as_str) == Some(id)
}

pub(crate) fn find_entity<'a>(value: &'a Value, type_name: &str, id: &str) -> Option<&'a Value> {
    if is_entity(value, type_name, id) {
        return Some(value);
    }
    match value {
        Value::Object(map) => map.values().find_map(|v| find_entity(v, type_name, id)),
        Value::Array(items) => items.iter().find_map(|v| find_entity(v, type_name, id)),
        _ => None,
    }
}

/// Applies `f` to every occurrence, without descending into a match.
pub(crate) fn map_entities(
    value: &mut Value,
    type_name: &str,
    id: &str,
    f: &mut dyn FnMut(&mut Value),
) -> usize {
    if is_entity(value, type_name, id) {
        f(value);
        return 1;
    }
    let mut count = 0;
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                count += map_entities(v, type_name, id, f);
            }
        }
        Value::Array(items) => {
            for v in items.iter_mut() {
                count += map_entities(v, type_name, id, f);
            }
        }
        _ => {}
    }
    count
}

/// Position an entity occupied inside an array before it was removed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RemovedItem {
    pub array_pointer: String,
    pub index: usize,
    pub value: Value,
}

/// Removes every array element matching the entity. Records are ordered so
/// that replaying them in reverse restores the original layout.
pub(crate) fn remove_entities(
    value: &mut Value,
    type_name: &str,
    id: &str,
    pointer: &str,
    out: &mut Vec<RemovedItem>,
) {
    match value {
        Value::Array(items) => {
            let matches: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(_, item)| is_entity(item, type_name, id))
                .map(|(idx, _)| idx)
                .collect();
            for idx in matches.into_iter().rev() {
                let removed = items.remove(idx);
                out.push(RemovedItem {
                    array_pointer: pointer.to_string(),
                    index: idx,
                    value: removed,
                });
            }
            for (idx, item) in items.iter_mut().enumerate() {
                let child = format!("{pointer}/{idx}");
                remove_entities(item, type_name, id, &child, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                let child = format!("{pointer}/{}", escape_pointer_token(key));
                remove_entities(item, type_name, id, &child, out);
            }
        }
        _ => {}
    }
}

/// Puts a removed element back unless an element with the same identity is
/// already present. Returns whether it was inserted.
pub(crate) fn restore_item(root: &mut Value, item: &RemovedItem) -> bool {
    let Some(Value::Array(items)) = root.pointer_mut(&item.array_pointer) else {
        return false;
    };
    let identity = (
        item.value.get("type_name").and_then(Value::as_str),
        item.value.get("id").and_then(Value::as_str),
    );
    if let (Some(type_name), Some(id)) = identity {
        if items.iter().any(|v| is_entity(v, type_name, id)) {
            return false;
        }
    }
    let index = item.index.min(items.len());
    items.insert(index, item.value.clone());
    true
}

/// Field-level merge: objects merge recursively, everything else (arrays and
/// nulls included) overwrites.
pub(crate) fn merge_patch(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_patch(existing, value)
                    }
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, patch_value) => {
            *base_value = patch_value.clone();
        }
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

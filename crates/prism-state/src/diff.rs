//! Deterministic structural differ over JSON-shaped values.
//!
//! [`diff`] serializes both inputs through `serde_json` and walks the
//! resulting trees, emitting an RFC 6902 patch. Output is byte-identical
//! for structurally equal inputs: object keys are visited in sorted order
//! and array handling is fixed by the configured [`ArrayStrategy`].

use crate::{pointer, Patch, PatchOp, PrismResult, Value};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// How arrays are diffed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ArrayStrategy {
    /// Replace the entire array when anything differs (default).
    #[default]
    Replace,
    /// Compare element-by-element at matching indices.
    ByIndex,
    /// Match elements by a key field. Does not track order changes.
    ByKey,
}

/// Array diff configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArrayConfig {
    /// The strategy to use for array values.
    pub strategy: ArrayStrategy,
    /// Field name elements are matched on under [`ArrayStrategy::ByKey`].
    pub key_field: String,
}

impl ArrayConfig {
    /// Replace-whole-array configuration.
    #[inline]
    pub fn replace() -> Self {
        Self::default()
    }

    /// Positional comparison configuration.
    #[inline]
    pub fn by_index() -> Self {
        Self {
            strategy: ArrayStrategy::ByIndex,
            key_field: String::new(),
        }
    }

    /// Key-field matching configuration.
    #[inline]
    pub fn by_key(key_field: impl Into<String>) -> Self {
        Self {
            strategy: ArrayStrategy::ByKey,
            key_field: key_field.into(),
        }
    }
}

/// Compute the patch that transforms `old` into `new`.
///
/// Both values are normalized through JSON serialization first, so any two
/// values of the same serializable type diff cleanly.
///
/// # Examples
///
/// ```
/// use prism_state::{diff, ArrayConfig};
/// use serde_json::json;
///
/// let old = json!({"value": 1, "name": "a"});
/// let new = json!({"value": 2, "name": "a"});
///
/// let patch = diff(&old, &new, &ArrayConfig::default()).unwrap();
/// assert_eq!(
///     patch.to_bytes().unwrap(),
///     br#"[{"op":"replace","path":"/value","value":2}]"#
/// );
/// ```
pub fn diff<T: Serialize>(old: &T, new: &T, cfg: &ArrayConfig) -> PrismResult<Patch> {
    let old = serde_json::to_value(old)?;
    let new = serde_json::to_value(new)?;

    let mut ops = Vec::new();
    diff_value("", &old, &new, cfg, &mut ops);
    Ok(Patch::with_ops(ops))
}

fn diff_value(path: &str, old: &Value, new: &Value, cfg: &ArrayConfig, out: &mut Vec<PatchOp>) {
    if old == new {
        return;
    }

    match (old, new) {
        (Value::Object(o), Value::Object(n)) => diff_object(path, o, n, cfg, out),
        (Value::Array(o), Value::Array(n)) => diff_array(path, o, n, cfg, out),
        // Kind mismatch or unequal primitive: a single replace either way.
        _ => out.push(PatchOp::replace(path, new.clone())),
    }
}

fn diff_object(
    path: &str,
    old: &serde_json::Map<String, Value>,
    new: &serde_json::Map<String, Value>,
    cfg: &ArrayConfig,
    out: &mut Vec<PatchOp>,
) {
    // Sort keys explicitly: map iteration order is a serde_json feature flag
    // away from changing, and patches must be stable across hosts.
    let mut old_keys: Vec<&String> = old.keys().collect();
    old_keys.sort_unstable();

    // Removed and changed keys first, in sorted order.
    for k in old_keys {
        let key_path = format!("{path}/{}", pointer::escape(k));
        match new.get(k) {
            None => out.push(PatchOp::remove(key_path)),
            Some(new_value) => diff_value(&key_path, &old[k], new_value, cfg, out),
        }
    }

    // Then added keys, in sorted order.
    let mut new_keys: Vec<&String> = new.keys().collect();
    new_keys.sort_unstable();

    for k in new_keys {
        if !old.contains_key(k) {
            let key_path = format!("{path}/{}", pointer::escape(k));
            out.push(PatchOp::add(key_path, new[k].clone()));
        }
    }
}

fn diff_array(path: &str, old: &[Value], new: &[Value], cfg: &ArrayConfig, out: &mut Vec<PatchOp>) {
    match cfg.strategy {
        ArrayStrategy::ByIndex => diff_array_by_index(path, old, new, cfg, out),
        ArrayStrategy::ByKey => diff_array_by_key(path, old, new, cfg, out),
        // Arrays are known unequal here (diff_value checked), so Replace
        // always emits.
        ArrayStrategy::Replace => out.push(PatchOp::replace(path, Value::Array(new.to_vec()))),
    }
}

fn diff_array_by_index(
    path: &str,
    old: &[Value],
    new: &[Value],
    cfg: &ArrayConfig,
    out: &mut Vec<PatchOp>,
) {
    let min_len = old.len().min(new.len());

    // Compare overlapping positions.
    for i in 0..min_len {
        diff_value(&format!("{path}/{i}"), &old[i], &new[i], cfg, out);
    }

    // Trailing removals from highest index down, so earlier ops in the
    // emitted sequence never shift the index a later op targets.
    for i in (min_len..old.len()).rev() {
        out.push(PatchOp::remove(format!("{path}/{i}")));
    }

    // Trailing additions append in order.
    for item in &new[min_len..] {
        out.push(PatchOp::add(format!("{path}/-"), item.clone()));
    }
}

fn diff_array_by_key(
    path: &str,
    old: &[Value],
    new: &[Value],
    cfg: &ArrayConfig,
    out: &mut Vec<PatchOp>,
) {
    if cfg.key_field.is_empty() {
        out.push(PatchOp::replace(path, Value::Array(new.to_vec())));
        return;
    }

    let old_index: HashMap<String, usize> = old
        .iter()
        .enumerate()
        .filter_map(|(i, v)| key_of(v, &cfg.key_field).map(|k| (k, i)))
        .collect();
    let new_keys: HashSet<String> = new
        .iter()
        .filter_map(|v| key_of(v, &cfg.key_field))
        .collect();

    // Removals in descending index order. JSON Patch applies sequentially;
    // removing a low index first would shift every later index.
    let mut removed: Vec<usize> = old_index
        .iter()
        .filter(|(k, _)| !new_keys.contains(k.as_str()))
        .map(|(_, &i)| i)
        .collect();
    removed.sort_unstable_by(|a, b| b.cmp(a));
    for i in removed {
        out.push(PatchOp::remove(format!("{path}/{i}")));
    }

    // Iterate the new array (not the key map) so emission order is stable.
    // Elements without the key field are skipped entirely.
    for (ni, v) in new.iter().enumerate() {
        let Some(k) = key_of(v, &cfg.key_field) else {
            continue;
        };

        match old_index.get(&k) {
            // New element: append at the end.
            None => out.push(PatchOp::add(format!("{path}/-"), v.clone())),
            // Surviving element: the path uses the NEW index, which is where
            // the element sits once the removals above have been applied.
            Some(&oi) => diff_value(&format!("{path}/{ni}"), &old[oi], v, cfg, out),
        }
    }
}

/// Stringified key of an array element, if it is an object carrying the
/// key field.
fn key_of(v: &Value, field: &str) -> Option<String> {
    match v.as_object()?.get(field)? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

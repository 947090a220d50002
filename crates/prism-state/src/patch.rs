//! RFC 6902-compatible patch model.
//!
//! A [`Patch`] is an ordered list of `add`/`remove`/`replace` operations
//! with JSON Pointer paths. Applied sequentially to the old value, a patch
//! produced by the differ yields the new value.

use crate::{PrismResult, Value};
use serde::{Deserialize, Serialize};

/// The operation kinds a patch may contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Insert a value at a path that does not exist yet.
    Add,
    /// Delete the value at a path.
    Remove,
    /// Overwrite the value at a path.
    Replace,
}

/// A single patch operation.
///
/// `remove` operations carry no value and omit the field on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    /// The operation kind.
    pub op: OpKind,
    /// RFC 6901 JSON Pointer to the target location.
    pub path: String,
    /// The new value, for `add` and `replace`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOp {
    /// Create an `add` operation.
    #[inline]
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Create a `remove` operation.
    #[inline]
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: OpKind::Remove,
            path: path.into(),
            value: None,
        }
    }

    /// Create a `replace` operation.
    #[inline]
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpKind::Replace,
            path: path.into(),
            value: Some(value),
        }
    }
}

/// An ordered sequence of patch operations.
///
/// Serializes transparently as a JSON array; an empty patch is the literal
/// two-byte document `[]`.
///
/// # Examples
///
/// ```
/// use prism_state::{Patch, PatchOp};
/// use serde_json::json;
///
/// let patch = Patch::with_ops(vec![
///     PatchOp::replace("/value", json!(2)),
///     PatchOp::remove("/stale"),
/// ]);
///
/// assert_eq!(patch.len(), 2);
/// let wire = patch.to_bytes().unwrap();
/// assert!(wire.starts_with(b"[{"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    /// Create an empty patch.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a patch with the given operations.
    #[inline]
    pub fn with_ops(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }

    /// Push an operation onto this patch.
    #[inline]
    pub fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    /// Get the operations in this patch.
    #[inline]
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    /// Consume this patch and return the operations.
    #[inline]
    pub fn into_ops(self) -> Vec<PatchOp> {
        self.ops
    }

    /// Check if this patch is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Get the number of operations in this patch.
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Iterate over the operations.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PatchOp> {
        self.ops.iter()
    }

    /// Serialize to the RFC 6902 wire form (a JSON array).
    pub fn to_bytes(&self) -> PrismResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.ops)?)
    }
}

impl FromIterator<PatchOp> for Patch {
    fn from_iter<I: IntoIterator<Item = PatchOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Patch {
    type Item = PatchOp;
    type IntoIter = std::vec::IntoIter<PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

impl Extend<PatchOp> for Patch {
    fn extend<I: IntoIterator<Item = PatchOp>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

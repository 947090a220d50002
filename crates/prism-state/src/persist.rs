//! Snapshot persistence: save, load, and restore.
//!
//! A snapshot is a single JSON document holding the base state, effect
//! metadata, a save timestamp, and opaque application extras. Effects
//! themselves are closures and cannot be serialized; instead each one is
//! saved as an [`EffectMeta`] record and reconstructed on restore by a
//! caller-provided factory.

use crate::effect::Effect;
use crate::error::{BoxError, EffectRestoreError, PrismError, PrismResult};
use crate::state::{Config, State};
use crate::Value;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

/// Serializable description of one active effect.
///
/// `kind` is an application-defined type tag the restore factory dispatches
/// on; `params` is whatever the application needs to rebuild the effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectMeta {
    /// The effect's stable ID.
    pub id: String,
    /// Application-defined type tag (serialized as `type`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque reconstruction parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl EffectMeta {
    /// Create a parameterless effect record.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            params: None,
        }
    }

    /// Create an effect record, serializing `params` to JSON.
    pub fn with_params(
        id: impl Into<String>,
        kind: impl Into<String>,
        params: &impl Serialize,
    ) -> PrismResult<Self> {
        Ok(Self {
            id: id.into(),
            kind: kind.into(),
            params: Some(serde_json::to_value(params)?),
        })
    }

    /// Deserialize the stored params. Absent params yield `P::default()`.
    pub fn parse_params<P: DeserializeOwned + Default>(&self) -> PrismResult<P> {
        match &self.params {
            Some(params) => Ok(serde_json::from_value(params.clone())?),
            None => Ok(P::default()),
        }
    }
}

/// The on-disk snapshot record.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot<T> {
    /// The base state (effects are never baked in).
    pub state: T,
    /// Metadata for the effects that were active at save time.
    #[serde(default)]
    pub effects: Vec<EffectMeta>,
    /// When the snapshot was written.
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
    /// Opaque application data carried alongside the state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Factory reconstructing an effect from its saved metadata.
///
/// Returning `Ok(None)` skips the entry silently; an error is recorded in
/// [`Restored::effect_errors`] without aborting the restore.
pub type EffectFactory<T, A> =
    dyn Fn(&EffectMeta) -> Result<Option<Arc<dyn Effect<T, A>>>, BoxError>;

/// The outcome of a successful [`restore`].
pub struct Restored<T, A> {
    /// The reconstructed state with all restorable effects attached.
    pub state: State<T, A>,
    /// When the loaded snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// Opaque application data from the snapshot.
    pub extra: Option<Value>,
    /// Per-effect failures; empty when every entry restored cleanly.
    pub effect_errors: Vec<EffectRestoreError>,
}

/// Write a snapshot of the state's base value to `path`, atomically.
///
/// The document is written to a sibling temp file first and renamed into
/// place, so a crash mid-write never leaves a torn snapshot behind.
pub fn save<T, A>(
    path: impl AsRef<FsPath>,
    state: &State<T, A>,
    effects: Vec<EffectMeta>,
    extra: Option<Value>,
) -> PrismResult<()>
where
    T: Serialize + DeserializeOwned,
{
    let snapshot = Snapshot {
        state: state.get_base(),
        effects,
        saved_at: Utc::now(),
        extra,
    };
    write_atomic(path.as_ref(), &serde_json::to_vec_pretty(&snapshot)?)
}

/// Load a snapshot from `path`.
///
/// A missing file is not an error: returns `Ok(None)` so first-boot flows
/// need no special casing.
pub fn load<T: DeserializeOwned>(path: impl AsRef<FsPath>) -> PrismResult<Option<Snapshot<T>>> {
    let bytes = match fs::read(path.as_ref()) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Load a snapshot and rebuild a [`State`] from it.
///
/// Construction problems (invalid config, unserializable state) are hard
/// errors. Per-effect problems are not: factory failures and duplicate IDs
/// accumulate into [`Restored::effect_errors`] so one bad entry cannot sink
/// the rest of the snapshot. With no factory, effect reconstruction is
/// skipped entirely.
pub fn restore<T, A>(
    path: impl AsRef<FsPath>,
    config: Config<T>,
    factory: Option<&EffectFactory<T, A>>,
) -> PrismResult<Option<Restored<T, A>>>
where
    T: Serialize + DeserializeOwned,
{
    let snapshot: Option<Snapshot<T>> = load(path.as_ref())?;
    let Some(snapshot) = snapshot else {
        return Ok(None);
    };

    let state = State::new(snapshot.state, config)?;

    let mut effect_errors = Vec::new();
    if let Some(factory) = factory {
        for meta in &snapshot.effects {
            match factory(meta) {
                Err(err) => effect_errors.push(EffectRestoreError {
                    id: meta.id.clone(),
                    source: PrismError::EffectFactory(err),
                }),
                Ok(None) => {}
                Ok(Some(effect)) => {
                    let activator = effect.activator();
                    if let Err(err) = state.add_effect(effect, activator) {
                        effect_errors.push(EffectRestoreError {
                            id: meta.id.clone(),
                            source: err,
                        });
                    }
                }
            }
        }
    }

    // A freshly restored state has nothing to broadcast yet; adding the
    // effects above must not leave a pending snapshot behind.
    state.clear_previous();

    tracing::debug!(
        effects = snapshot.effects.len(),
        errors = effect_errors.len(),
        "restored state snapshot"
    );

    Ok(Some(Restored {
        state,
        saved_at: snapshot.saved_at,
        extra: snapshot.extra,
        effect_errors,
    }))
}

fn write_atomic(path: &FsPath, bytes: &[u8]) -> PrismResult<()> {
    let tmp = sibling_tmp_path(path);
    fs::write(&tmp, bytes)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    tracing::debug!(path = %path.display(), "saved state snapshot");
    Ok(())
}

fn sibling_tmp_path(path: &FsPath) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effect_meta_wire_names() {
        let meta = EffectMeta::with_params("buff", "multiply", &json!({"factor": 2})).unwrap();
        let wire = serde_json::to_string(&meta).unwrap();
        assert_eq!(
            wire,
            r#"{"id":"buff","type":"multiply","params":{"factor":2}}"#
        );
    }

    #[test]
    fn test_effect_meta_omits_missing_params() {
        let wire = serde_json::to_string(&EffectMeta::new("buff", "multiply")).unwrap();
        assert_eq!(wire, r#"{"id":"buff","type":"multiply"}"#);
    }

    #[test]
    fn test_parse_params() {
        #[derive(Default, Deserialize)]
        struct Params {
            factor: i64,
        }

        let meta = EffectMeta::with_params("buff", "multiply", &json!({"factor": 2})).unwrap();
        assert_eq!(meta.parse_params::<Params>().unwrap().factor, 2);

        // Absent params fall back to the default.
        let meta = EffectMeta::new("buff", "multiply");
        assert_eq!(meta.parse_params::<Params>().unwrap().factor, 0);
    }

    #[test]
    fn test_tmp_path_is_sibling() {
        let tmp = sibling_tmp_path(FsPath::new("/data/save/game.json"));
        assert_eq!(tmp.parent(), Some(FsPath::new("/data/save")));
        let name = tmp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".game.json."));
        assert!(name.ends_with(".tmp"));
    }
}

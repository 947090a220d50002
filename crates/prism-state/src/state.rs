//! The authoritative state container.
//!
//! [`State`] owns the base value, the ordered effect chain, and the
//! previous-derived snapshot that drives diff calculation. All access is
//! mediated through it: writers mutate through [`update`](State::update)
//! and [`set`](State::set); readers always see the derived state (base plus
//! effects), recomputed on every read.

use crate::diff::{diff, ArrayConfig, ArrayStrategy};
use crate::effect::Effect;
use crate::{Patch, PrismError, PrismResult};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A shareable deep-clone hook for the state type.
///
/// The default JSON round-trip clone is universal but slow; a hand-written
/// (or generated) cloner is purely an optimization and must produce a value
/// equal to its argument under JSON serialization.
pub type Cloner<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// A viewer-specific filter applied to the derived state before diffing.
///
/// Projections receive their own deep copy and may mutate it freely.
pub type Projection<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Construction options for [`State`].
pub struct Config<T> {
    /// Deep-copy hook. `None` uses the JSON round-trip.
    pub cloner: Option<Cloner<T>>,
    /// How array values are diffed.
    pub array_strategy: ArrayStrategy,
    /// Field name for [`ArrayStrategy::ByKey`]; required and non-empty.
    pub array_key_field: String,
}

impl<T> Config<T> {
    /// Default configuration: JSON cloning, whole-array replacement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom deep-clone hook.
    pub fn with_cloner(mut self, cloner: impl Fn(&T) -> T + Send + Sync + 'static) -> Self {
        self.cloner = Some(Arc::new(cloner));
        self
    }

    /// Set the array diff strategy.
    pub fn with_array_strategy(mut self, strategy: ArrayStrategy) -> Self {
        self.array_strategy = strategy;
        self
    }

    /// Set the key field used by [`ArrayStrategy::ByKey`].
    pub fn with_array_key_field(mut self, field: impl Into<String>) -> Self {
        self.array_key_field = field.into();
        self
    }
}

impl<T> Default for Config<T> {
    fn default() -> Self {
        Self {
            cloner: None,
            array_strategy: ArrayStrategy::default(),
            array_key_field: String::new(),
        }
    }
}

impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Self {
            cloner: self.cloner.clone(),
            array_strategy: self.array_strategy,
            array_key_field: self.array_key_field.clone(),
        }
    }
}

impl<T> fmt::Debug for Config<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("cloner", &self.cloner.as_ref().map(|_| "<custom>"))
            .field("array_strategy", &self.array_strategy)
            .field("array_key_field", &self.array_key_field)
            .finish()
    }
}

/// The state container. Thread-safe for concurrent access.
///
/// `T` is the application state type, `A` the activator type effects carry.
///
/// # Examples
///
/// ```
/// use prism_state::{Config, State};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Game {
///     value: i64,
///     name: String,
/// }
///
/// let state: State<Game, String> = State::new(
///     Game { value: 1, name: "a".into() },
///     Config::default(),
/// ).unwrap();
///
/// state.update(|g| g.value = 2);
///
/// let patch = state.diff(None).unwrap().unwrap();
/// assert_eq!(
///     patch.to_bytes().unwrap(),
///     br#"[{"op":"replace","path":"/value","value":2}]"#
/// );
/// ```
pub struct State<T, A> {
    inner: RwLock<Inner<T, A>>,
    cloner: Option<Cloner<T>>,
    array_cfg: ArrayConfig,
}

impl<T, A> fmt::Debug for State<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").finish_non_exhaustive()
    }
}

struct Inner<T, A> {
    current: T,
    /// Derived state captured just before the last observable mutation.
    /// `Some` is the `hasPrevious` flag: it drives the next diff and is
    /// cleared after broadcasting.
    previous: Option<T>,
    effects: Vec<Arc<dyn Effect<T, A>>>,
}

impl<T, A> State<T, A>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a new state with the given initial value.
    ///
    /// Fails when the configuration is invalid or, absent a custom cloner,
    /// when the state type does not survive a JSON round-trip.
    pub fn new(initial: T, config: Config<T>) -> PrismResult<Self> {
        if config.array_strategy == ArrayStrategy::ByKey && config.array_key_field.is_empty() {
            return Err(PrismError::MissingKeyField);
        }

        // The default cloner relies on JSON round-tripping; surface a shape
        // problem now rather than panicking on a later clone.
        if config.cloner.is_none() {
            let data = serde_json::to_value(&initial)?;
            let _: T = serde_json::from_value(data)?;
        }

        Ok(Self {
            inner: RwLock::new(Inner {
                current: initial,
                previous: None,
                effects: Vec::new(),
            }),
            cloner: config.cloner,
            array_cfg: ArrayConfig {
                strategy: config.array_strategy,
                key_field: config.array_key_field,
            },
        })
    }

    /// The array diff configuration this state was built with.
    #[inline]
    pub fn array_config(&self) -> &ArrayConfig {
        &self.array_cfg
    }

    /// Current state with effects applied.
    pub fn get(&self) -> T {
        let inner = self.inner.read();
        self.derive_locked(&inner)
    }

    /// Current base state, without effects.
    pub fn get_base(&self) -> T {
        let inner = self.inner.read();
        self.clone_value(&inner.current)
    }

    /// Mutate the base state in place, capturing the previous derived state
    /// for the next diff.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut inner = self.inner.write();
        let previous = self.derive_locked(&inner);
        inner.previous = Some(previous);
        f(&mut inner.current);
    }

    /// Replace the entire base state, capturing the previous derived state.
    pub fn set(&self, value: T) {
        let mut inner = self.inner.write();
        let previous = self.derive_locked(&inner);
        inner.previous = Some(previous);
        inner.current = self.clone_value(&value);
    }

    /// Register an effect under the given activator.
    ///
    /// Fails with [`PrismError::DuplicateEffect`] when an effect with the
    /// same ID is already registered; the effect list is left unchanged.
    pub fn add_effect(&self, effect: Arc<dyn Effect<T, A>>, activator: Option<A>) -> PrismResult<()> {
        let mut inner = self.inner.write();
        if inner.effects.iter().any(|e| e.id() == effect.id()) {
            return Err(PrismError::duplicate_effect(effect.id()));
        }

        let previous = self.derive_locked(&inner);
        inner.previous = Some(previous);
        effect.set_activator(activator);
        inner.effects.push(effect);
        Ok(())
    }

    /// Remove an effect by ID, cancelling any pending expiration timer.
    /// Returns whether the effect was present.
    pub fn remove_effect(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(index) = inner.effects.iter().position(|e| e.id() == id) else {
            return false;
        };

        let previous = self.derive_locked(&inner);
        inner.previous = Some(previous);
        let effect = inner.effects.remove(index);
        if let Some(sched) = effect.schedulable() {
            sched.cancel_scheduled_expiration();
        }
        true
    }

    /// Whether an effect with the given ID is registered.
    pub fn has_effect(&self, id: &str) -> bool {
        self.inner.read().effects.iter().any(|e| e.id() == id)
    }

    /// Fetch a registered effect by ID.
    pub fn get_effect(&self, id: &str) -> Option<Arc<dyn Effect<T, A>>> {
        self.inner
            .read()
            .effects
            .iter()
            .find(|e| e.id() == id)
            .cloned()
    }

    /// A copy of the registered effect list, in application order.
    pub fn effects(&self) -> Vec<Arc<dyn Effect<T, A>>> {
        self.inner.read().effects.clone()
    }

    /// Remove all effects. Captures the previous derived state only when
    /// there was something to remove.
    pub fn clear_effects(&self) {
        let mut inner = self.inner.write();
        if inner.effects.is_empty() {
            return;
        }

        let previous = self.derive_locked(&inner);
        inner.previous = Some(previous);
        for effect in inner.effects.drain(..) {
            if let Some(sched) = effect.schedulable() {
                sched.cancel_scheduled_expiration();
            }
        }
    }

    /// Remove every expired effect, returning how many were removed.
    ///
    /// Does NOT overwrite an existing previous-derived snapshot: if an
    /// `update` already captured one this cycle, reaping must not wipe out
    /// that pending delta.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.write();
        if inner.effects.is_empty() {
            return 0;
        }
        if !inner.effects.iter().any(|e| e.expired()) {
            return 0;
        }

        if inner.previous.is_none() {
            let previous = self.derive_locked(&inner);
            inner.previous = Some(previous);
        }

        let before = inner.effects.len();
        inner.effects.retain(|effect| {
            if effect.expired() {
                if let Some(sched) = effect.schedulable() {
                    sched.cancel_scheduled_expiration();
                }
                false
            } else {
                true
            }
        });

        let removed = before - inner.effects.len();
        tracing::debug!(removed, "reaped expired effects");
        removed
    }

    /// Diff between the captured previous derived state and the current
    /// derived state, as one viewer sees them.
    ///
    /// Returns `Ok(None)` when no previous snapshot exists; the caller
    /// should send a full state instead.
    pub fn diff(&self, projection: Option<&Projection<T>>) -> PrismResult<Option<Patch>> {
        let inner = self.inner.read();
        let Some(previous) = &inner.previous else {
            return Ok(None);
        };

        let current = self.derive_locked(&inner);
        let patch = match projection {
            Some(project) => {
                let old = (project.as_ref())(self.clone_value(previous));
                let new = (project.as_ref())(current);
                diff(&old, &new, &self.array_cfg)?
            }
            None => diff(previous, &current, &self.array_cfg)?,
        };
        Ok(Some(patch))
    }

    /// The complete derived state as one viewer sees it (initial sync).
    pub fn full_state(&self, projection: Option<&Projection<T>>) -> T {
        let inner = self.inner.read();
        let current = self.derive_locked(&inner);
        match projection {
            Some(project) => (project.as_ref())(current),
            None => current,
        }
    }

    /// Drop the previous-derived snapshot. Call after broadcasting.
    pub fn clear_previous(&self) {
        self.inner.write().previous = None;
    }

    /// Whether there is a pending snapshot to diff against.
    pub fn has_changes(&self) -> bool {
        self.inner.read().previous.is_some()
    }

    /// Derived state: clone the base, then fold the effect chain over it in
    /// insertion order. Caller holds the state lock.
    fn derive_locked(&self, inner: &Inner<T, A>) -> T {
        let mut result = self.clone_value(&inner.current);
        for effect in &inner.effects {
            let activator = effect.activator();
            result = effect.apply(result, activator.as_ref());
        }
        result
    }

    /// Deep-copy through the configured hook, or the JSON round-trip.
    ///
    /// The round-trip was validated at construction; failing here means the
    /// state type changed shape afterwards, which is a program bug, so this
    /// panics rather than silently corrupting diffs.
    fn clone_value(&self, value: &T) -> T {
        if let Some(cloner) = &self.cloner {
            return (cloner.as_ref())(value);
        }

        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(err) => panic!(
                "prism-state: clone serialize failed (state type changed after construction?): {err}"
            ),
        };
        match serde_json::from_value(data) {
            Ok(clone) => clone,
            Err(err) => panic!("prism-state: clone deserialize failed: {err}"),
        }
    }
}
